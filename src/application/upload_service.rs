use std::sync::Arc;
use tracing::{info, debug, error, warn};
use crate::domain::{
    circuit::{build_record, check_validity},
    error::IngestionError,
    models::{Row, RowRejection, TransformOutcome, UploadOutcome},
    ports::RecordRepository,
};
use crate::infrastructure::parsers::csv_parser::parse_upload;

pub const CSV_EXTENSION: &str = ".csv";
pub const STATUS_SUCCESS: &str = "success";

pub struct UploadService {
    record_repo: Option<Arc<dyn RecordRepository>>,
}

impl UploadService {
    /// With `record_repo` unset, valid records are counted but not stored.
    pub fn new(record_repo: Option<Arc<dyn RecordRepository>>) -> Self {
        Self { record_repo }
    }

    pub async fn handle(&self, filename: &str, bytes: &[u8]) -> Result<UploadOutcome, IngestionError> {
        info!("Received upload {} ({} bytes)", filename, bytes.len());
        check_filename(filename)?;

        let rows = parse_upload(bytes)?;
        let outcome = transform_rows(&rows);
        log_rejections(&outcome.rejections);
        info!("Derived {} valid records from {} rows", outcome.records.len(), rows.len());

        let inserted_rows = match &self.record_repo {
            Some(repo) => repo.insert_records(&outcome.records).await
                .map_err(|e| {
                    error!("Failed to store records from {}: {}", filename, e);
                    e
                })?,
            None => {
                debug!("Persistence disabled, skipping insert of {} records", outcome.records.len());
                outcome.records.len() as u64
            }
        };

        Ok(UploadOutcome {
            status: STATUS_SUCCESS.to_string(),
            inserted_rows,
        })
    }
}

pub fn check_filename(filename: &str) -> Result<(), IngestionError> {
    if filename.ends_with(CSV_EXTENSION) {
        Ok(())
    } else {
        warn!("Rejected upload with non-CSV name: {}", filename);
        Err(IngestionError::InvalidUpload("Please upload a .csv file".to_string()))
    }
}

/// Derives a record per row and keeps the ones with all fields present.
pub fn transform_rows(rows: &[Row]) -> TransformOutcome {
    let mut outcome = TransformOutcome::default();
    for (i, row) in rows.iter().enumerate() {
        let record = build_record(row);
        match check_validity(&record) {
            Ok(()) => outcome.records.push(record),
            Err(reason) => outcome.rejections.push(RowRejection { line: i + 2, reason }),
        }
    }
    outcome
}

fn log_rejections(rejections: &[RowRejection]) {
    if rejections.is_empty() {
        return;
    }
    for r in rejections {
        debug!("Dropped row at line {}: {}", r.line, r.reason);
    }
    warn!("Dropped {} rows that failed validation", rejections.len());
}
