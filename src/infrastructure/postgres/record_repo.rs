use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, Postgres, QueryBuilder};
use tracing::{debug, info, error};
use crate::domain::{error::IngestionError, models::CleanedRecord, ports::RecordRepository};
use super::table_repo::{connect, quote_ident, rows_per_statement};

pub const RECORD_COLUMNS: [&str; 8] = [
    "circle_name",
    "circuit_id",
    "nss_id",
    "vlan",
    "service_type_c",
    "optics_router_hostname",
    "router_ip",
    "site_status",
];

pub struct PgRecordRepository {
    options: PgConnectOptions,
    table: String,
}

impl PgRecordRepository {
    pub fn new(options: PgConnectOptions, table: String) -> Self {
        debug!("Initializing PostgreSQL record repository for table: {}", table);
        Self { options, table }
    }
}

#[async_trait]
impl RecordRepository for PgRecordRepository {
    async fn insert_records(&self, records: &[CleanedRecord]) -> Result<u64, IngestionError> {
        debug!("Inserting {} records into {}", records.len(), self.table);

        if records.is_empty() {
            info!("No records to insert into {}", self.table);
            return Ok(0);
        }

        let prefix = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(&self.table),
            RECORD_COLUMNS.join(", ")
        );

        let mut conn = connect(&self.options).await?;
        let mut tx = conn.begin().await?;
        let mut inserted = 0u64;

        for batch in records.chunks(rows_per_statement(RECORD_COLUMNS.len())) {
            let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(prefix.as_str());
            qb.push_values(batch.iter(), |mut b, r| {
                b.push_bind(r.circle_name.as_str())
                    .push_bind(r.circuit_id.as_deref())
                    .push_bind(r.nss_id.as_str())
                    .push_bind(r.vlan.as_str())
                    .push_bind(r.service_type_c.as_str())
                    .push_bind(r.optics_router_hostname.as_str())
                    .push_bind(r.router_ip.as_str())
                    .push_bind(r.site_status.as_str());
            });

            match qb.build().execute(&mut *tx).await {
                Ok(result) => inserted += result.rows_affected(),
                Err(e) => {
                    error!("Failed to insert records into {}: {}", self.table, e);
                    tx.rollback().await?;
                    conn.close().await?;
                    return Err(e.into());
                }
            }
        }

        tx.commit().await?;
        conn.close().await?;
        info!("✅ Successfully inserted {} records into {}", inserted, self.table);
        Ok(inserted)
    }
}
