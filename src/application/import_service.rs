use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use tracing::{info, debug, error, warn};
use uuid::Uuid;
use crate::config::ImportConfig;
use crate::domain::{
    error::IngestionError,
    headers::normalize_headers,
    models::{Chunk, ChunkFailurePolicy, ChunkOutcome, ChunkReport, HeaderSet, ImportSummary, Row},
    ports::TableRepository,
};
use crate::infrastructure::parsers::csv_parser::{detect_layout, file_size, RowReader};

/// Columns every import table carries besides the CSV data.
pub const SYSTEM_COLUMNS: [&str; 2] = ["id", "import_time"];

pub struct ImportService {
    table_repo: Arc<dyn TableRepository>,
}

/// Where the chunk loop writes to and how it reacts to failures.
pub struct ChunkTarget<'a> {
    pub table: &'a str,
    pub headers: &'a HeaderSet,
    pub chunk_size: usize,
    pub policy: ChunkFailurePolicy,
}

impl ImportService {
    pub fn new(table_repo: Arc<dyn TableRepository>) -> Self {
        Self { table_repo }
    }

    pub async fn run(&self, config: &ImportConfig) -> Result<ImportSummary, IngestionError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Starting chunked import {} of {}", run_id, config.csv_path.display());

        // Step 1: file info and header layout; both are fatal before any DB work
        let size = file_size(&config.csv_path)?;
        let layout = detect_layout(&config.csv_path)?;

        // Step 2: normalize headers and recreate the target table
        let headers = table_columns(&normalize_headers(&layout.headers));
        debug!("Table columns: {:?}", headers.columns());
        self.table_repo.recreate_table(&config.table_name, &headers).await
            .map_err(|e| {
                error!("Failed to create table {}: {}", config.table_name, e);
                e
            })?;

        // Step 3: stream the file through the chunk loop
        info!("Processing file in chunks of {} rows", config.chunk_size);
        let rows = RowReader::open(&config.csv_path, &layout)?;
        let target = ChunkTarget {
            table: &config.table_name,
            headers: &headers,
            chunk_size: config.chunk_size,
            policy: config.on_chunk_failure,
        };
        let chunks = self.import_rows(&target, rows, started).await?;
        let total_rows = chunks.last().map(|c| c.running_total).unwrap_or(0);

        let mut summary = ImportSummary {
            run_id,
            started_at,
            table: config.table_name.clone(),
            columns: headers.len(),
            file_size: size,
            total_rows,
            chunks,
            elapsed_secs: started.elapsed().as_secs_f64(),
            index_created: false,
        };
        log_summary(&summary);

        // Step 4: index on the primary key; failure does not fail the import
        info!("Creating index...");
        match self.table_repo.create_id_index(&config.table_name).await {
            Ok(()) => {
                info!("✅ Index created");
                summary.index_created = true;
            }
            Err(e) => warn!("Index creation failed: {}", e),
        }

        Ok(summary)
    }

    /// Groups `rows` into chunks of `target.chunk_size`, submitting each in
    /// order. The trailing partial chunk is reported with `is_final` set.
    pub async fn import_rows<I>(
        &self,
        target: &ChunkTarget<'_>,
        rows: I,
        started: Instant,
    ) -> Result<Vec<ChunkReport>, IngestionError>
    where
        I: IntoIterator<Item = Result<Row, IngestionError>>,
    {
        let chunk_size = target.chunk_size.max(1);
        let mut chunk = Chunk::new(1, chunk_size);
        let mut reports = Vec::new();
        let mut total = 0u64;

        for row in rows {
            chunk.rows.push(row?);
            if chunk.len() >= chunk_size {
                let next = Chunk::new(chunk.sequence + 1, chunk_size);
                let full = std::mem::replace(&mut chunk, next);
                let report = self.submit(target, &full, total, started, false).await?;
                total = report.running_total;
                reports.push(report);
            }
        }

        if !chunk.is_empty() {
            let report = self.submit(target, &chunk, total, started, true).await?;
            reports.push(report);
        }

        Ok(reports)
    }

    async fn submit(
        &self,
        target: &ChunkTarget<'_>,
        chunk: &Chunk,
        total_before: u64,
        started: Instant,
        is_final: bool,
    ) -> Result<ChunkReport, IngestionError> {
        let rows = chunk.sanitize(target.headers.len());
        let outcome = match self.table_repo.insert_chunk(target.table, target.headers, &rows).await {
            Ok(rows) => ChunkOutcome::Inserted { rows },
            Err(e) => {
                error!("✗ Chunk {} failed: {}", chunk.sequence, e);
                ChunkOutcome::Failed { reason: e.to_string() }
            }
        };

        let running_total = total_before + outcome.rows_inserted();
        let elapsed = started.elapsed().as_secs_f64();
        let rows_per_sec = if elapsed > 0.0 { running_total as f64 / elapsed } else { 0.0 };

        if is_final {
            info!("Chunk {:3}: {:6} rows | Total: {:8} | FINAL",
                chunk.sequence, outcome.rows_inserted(), running_total);
        } else {
            info!("Chunk {:3}: {:6} rows | Total: {:8} | Rate: {:6.0} rows/sec",
                chunk.sequence, outcome.rows_inserted(), running_total, rows_per_sec);
        }

        if let (ChunkOutcome::Failed { reason }, ChunkFailurePolicy::Abort) = (&outcome, target.policy) {
            return Err(IngestionError::ChunkAborted {
                sequence: chunk.sequence,
                reason: reason.clone(),
            });
        }

        Ok(ChunkReport {
            sequence: chunk.sequence,
            outcome,
            running_total,
            rows_per_sec,
            is_final,
        })
    }
}

/// Suffixes data columns that would clash with `SYSTEM_COLUMNS` in the DDL.
pub fn table_columns(headers: &HeaderSet) -> HeaderSet {
    let mut taken: HashSet<String> = SYSTEM_COLUMNS.iter().map(|c| c.to_string()).collect();
    taken.extend(headers.columns().iter().cloned());

    let columns = headers
        .columns()
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if !SYSTEM_COLUMNS.contains(&name.as_str()) {
                return name.clone();
            }
            let mut renamed = name.clone();
            while taken.contains(&renamed) {
                renamed = format!("{}_{}", renamed, i);
            }
            warn!("Column '{}' clashes with a system column, using '{}'", name, renamed);
            taken.insert(renamed.clone());
            renamed
        })
        .collect();

    HeaderSet::from_normalized(columns)
}

fn log_summary(summary: &ImportSummary) {
    info!("IMPORT COMPLETED: run {} started at {}", summary.run_id, summary.started_at.to_rfc3339());
    info!("Total rows imported: {}", summary.total_rows);
    info!("Chunks submitted: {} ({} failed)", summary.chunks.len(), summary.failed_chunks());
    info!("Total time: {:.1} seconds", summary.elapsed_secs);
    info!("Average rate: {:.0} rows/second", summary.average_rate());
    info!("Data size processed: {:.1} MB", summary.file_size as f64 / 1024.0 / 1024.0);
}
