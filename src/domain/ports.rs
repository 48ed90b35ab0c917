use async_trait::async_trait;
use crate::domain::{
    error::IngestionError,
    models::{CleanedRecord, HeaderSet, SanitizedRow},
};

#[async_trait]
pub trait TableRepository: Send + Sync {
    /// Drops `table` if present and recreates it with one TEXT column per header.
    async fn recreate_table(&self, table: &str, columns: &HeaderSet) -> Result<(), IngestionError>;

    /// Inserts one chunk atomically and returns the number of rows written.
    async fn insert_chunk(&self, table: &str, columns: &HeaderSet, rows: &[SanitizedRow]) -> Result<u64, IngestionError>;

    async fn create_id_index(&self, table: &str) -> Result<(), IngestionError>;
}

#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn insert_records(&self, records: &[CleanedRecord]) -> Result<u64, IngestionError>;
}
