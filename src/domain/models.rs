use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One source record, positionally indexed.
pub type Row = Vec<String>;

/// A row padded or truncated to the header width, with empty markers as `None`.
pub type SanitizedRow = Vec<Option<String>>;

/// Cell values that are stored as NULL.
pub const EMPTY_MARKERS: [&str; 4] = ["", "NULL", "NA", "N/A"];

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

pub fn is_empty_marker(value: &str) -> bool {
    EMPTY_MARKERS.contains(&value)
}

/// Database-safe, unique column names in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    columns: Vec<String>,
}

impl HeaderSet {
    pub(crate) fn from_normalized(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A bounded batch of rows submitted as one insert.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub sequence: usize,
    pub rows: Vec<Row>,
}

impl Chunk {
    pub fn new(sequence: usize, capacity: usize) -> Self {
        Self {
            sequence,
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Trims every cell, maps empty markers to `None` and fits each row to `width`.
    pub fn sanitize(&self, width: usize) -> Vec<SanitizedRow> {
        self.rows
            .iter()
            .map(|row| {
                (0..width)
                    .map(|i| {
                        row.get(i).and_then(|cell| {
                            let value = cell.trim();
                            if is_empty_marker(value) {
                                None
                            } else {
                                Some(value.to_string())
                            }
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

/// What happened to a single submitted chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChunkOutcome {
    Inserted { rows: u64 },
    Failed { reason: String },
}

impl ChunkOutcome {
    pub fn rows_inserted(&self) -> u64 {
        match self {
            ChunkOutcome::Inserted { rows } => *rows,
            ChunkOutcome::Failed { .. } => 0,
        }
    }
}

/// Decides whether the import carries on after a chunk fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFailurePolicy {
    /// Log the failure, count the chunk as zero rows, move on.
    #[default]
    Continue,
    /// Stop the import at the first failed chunk.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkReport {
    pub sequence: usize,
    pub outcome: ChunkOutcome,
    pub running_total: u64,
    pub rows_per_sec: f64,
    pub is_final: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub table: String,
    pub columns: usize,
    pub file_size: u64,
    pub total_rows: u64,
    pub chunks: Vec<ChunkReport>,
    pub elapsed_secs: f64,
    pub index_created: bool,
}

impl ImportSummary {
    pub fn failed_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| matches!(c.outcome, ChunkOutcome::Failed { .. }))
            .count()
    }

    pub fn average_rate(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.total_rows as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Link technology and interface type pair that carries a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    TwoGAbis,
    TwoGOam,
    FourGOam,
    FourGS1C,
    FourGS1U,
    FiveGOam,
    FiveGS1C,
    FiveGS1U,
}

impl ServiceType {
    pub const ALL: [ServiceType; 8] = [
        ServiceType::TwoGAbis,
        ServiceType::TwoGOam,
        ServiceType::FourGOam,
        ServiceType::FourGS1C,
        ServiceType::FourGS1U,
        ServiceType::FiveGOam,
        ServiceType::FiveGS1C,
        ServiceType::FiveGS1U,
    ];

    pub fn code(self) -> &'static str {
        match self {
            ServiceType::TwoGAbis => "2G_ABIS",
            ServiceType::TwoGOam => "2G_OAM",
            ServiceType::FourGOam => "4G_OAM",
            ServiceType::FourGS1C => "4G_S1_C",
            // The upstream report writes this one with a hyphen.
            ServiceType::FourGS1U => "4G_S1-U",
            ServiceType::FiveGOam => "5G_OAM",
            ServiceType::FiveGS1C => "5G_S1_C",
            ServiceType::FiveGS1U => "5G_S1_U",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            ServiceType::TwoGAbis => "_2GSX",
            ServiceType::TwoGOam => "_2GMX",
            ServiceType::FourGOam => "_4GMX",
            ServiceType::FourGS1C => "_4GCX",
            ServiceType::FourGS1U => "_4GUX",
            ServiceType::FiveGOam => "_5GMX",
            ServiceType::FiveGS1C => "_5GCX",
            ServiceType::FiveGS1U => "_5GUX",
        }
    }

    /// Exact, case-sensitive lookup.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

pub const SITE_STATUS_LIVE: &str = "live";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub circle_name: String,
    pub circuit_id: Option<String>,
    pub nss_id: String,
    pub vlan: String,
    pub service_type_c: String,
    pub optics_router_hostname: String,
    pub router_ip: String,
    pub site_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    UnknownServiceType(String),
    ShortNssId,
    MissingField(&'static str),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::UnknownServiceType(code) => write!(f, "unknown service type '{}'", code),
            RejectReason::ShortNssId => write!(f, "nss_id shorter than 2 characters"),
            RejectReason::MissingField(name) => write!(f, "missing {}", name),
        }
    }
}

/// A data row dropped during upload validation. `line` is 1-based and counts the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    pub line: usize,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub records: Vec<CleanedRecord>,
    pub rejections: Vec<RowRejection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub status: String,
    pub inserted_rows: u64,
}
