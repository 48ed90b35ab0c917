use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not read CSV headers with any encoding: {0}")]
    HeaderDetection(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database Error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidUpload(String),

    #[error("Chunk {sequence} failed: {reason}")]
    ChunkAborted { sequence: usize, reason: String },
}

impl From<csv::Error> for IngestionError {
    fn from(e: csv::Error) -> Self {
        IngestionError::Parse(e.to_string())
    }
}

impl From<sqlx::Error> for IngestionError {
    fn from(e: sqlx::Error) -> Self {
        IngestionError::Database(e.to_string())
    }
}
