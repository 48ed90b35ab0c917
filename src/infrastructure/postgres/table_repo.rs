use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{debug, info, error};
use crate::domain::{
    error::IngestionError,
    models::{HeaderSet, SanitizedRow},
    ports::TableRepository,
};

/// PostgreSQL caps a single statement at this many bind parameters.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).max(1)
}

pub fn create_table_sql(table: &str, columns: &HeaderSet) -> String {
    let data_columns: String = columns
        .columns()
        .iter()
        .map(|c| format!("{} TEXT, ", quote_ident(c)))
        .collect();
    format!(
        "CREATE TABLE {} (id BIGSERIAL PRIMARY KEY, {}import_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        quote_ident(table),
        data_columns
    )
}

pub fn create_index_sql(table: &str) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (id)",
        quote_ident(&format!("idx_{}_id", table)),
        quote_ident(table)
    )
}

pub(crate) async fn connect(options: &PgConnectOptions) -> Result<PgConnection, IngestionError> {
    PgConnection::connect_with(options).await.map_err(|e| {
        error!("Failed to connect to PostgreSQL: {}", e);
        IngestionError::Database(e.to_string())
    })
}

/// Opens a fresh connection per call; nothing is pooled between chunks.
pub struct PgTableRepository {
    options: PgConnectOptions,
}

impl PgTableRepository {
    pub fn new(options: PgConnectOptions) -> Self {
        debug!("Initializing PostgreSQL table repository");
        Self { options }
    }

    async fn execute_ddl(&self, statements: &[String]) -> Result<(), IngestionError> {
        let mut conn = connect(&self.options).await?;
        let mut tx = conn.begin().await?;
        for sql in statements {
            debug!("Executing: {}", sql);
            if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
                error!("Statement failed: {}", e);
                tx.rollback().await?;
                conn.close().await?;
                return Err(e.into());
            }
        }
        tx.commit().await?;
        conn.close().await?;
        Ok(())
    }
}

#[async_trait]
impl TableRepository for PgTableRepository {
    async fn recreate_table(&self, table: &str, columns: &HeaderSet) -> Result<(), IngestionError> {
        debug!("Recreating table {} with {} columns", table, columns.len());
        self.execute_ddl(&[
            format!("DROP TABLE IF EXISTS {}", quote_ident(table)),
            create_table_sql(table, columns),
        ])
        .await?;
        info!("✅ Table {} created with {} columns", table, columns.len());
        Ok(())
    }

    async fn insert_chunk(&self, table: &str, columns: &HeaderSet, rows: &[SanitizedRow]) -> Result<u64, IngestionError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = columns
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let prefix = format!("INSERT INTO {} ({}) ", quote_ident(table), column_list);
        let batch_rows = rows_per_statement(columns.len());

        let mut conn = connect(&self.options).await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0u64;

        for batch in rows.chunks(batch_rows) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(prefix.as_str());
            qb.push_values(batch.iter(), |mut b, row| {
                for cell in row {
                    b.push_bind(cell.as_deref());
                }
            });

            match qb.build().persistent(false).execute(&mut *tx).await {
                Ok(result) => inserted += result.rows_affected(),
                Err(e) => {
                    error!("Insert into {} failed after {} rows: {}", table, inserted, e);
                    tx.rollback().await?;
                    conn.close().await?;
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        conn.close().await?;
        debug!("Inserted {} rows into {}", inserted, table);
        Ok(inserted)
    }

    async fn create_id_index(&self, table: &str) -> Result<(), IngestionError> {
        self.execute_ddl(&[create_index_sql(table)]).await
    }
}
