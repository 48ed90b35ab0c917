use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use csv_ingestion::application::import_service::{ChunkTarget, ImportService};
use csv_ingestion::config::ImportConfig;
use csv_ingestion::domain::error::IngestionError;
use csv_ingestion::domain::headers::normalize_headers;
use csv_ingestion::domain::models::{ChunkFailurePolicy, ChunkOutcome, HeaderSet, Row, SanitizedRow};
use csv_ingestion::domain::ports::TableRepository;
use tempfile::NamedTempFile;

#[derive(Default)]
struct MemoryTable {
    created: Mutex<Option<(String, Vec<String>)>>,
    chunks: Mutex<Vec<Vec<SanitizedRow>>>,
    calls: Mutex<usize>,
    fail_on_call: Option<usize>,
    fail_index: bool,
    indexed: Mutex<bool>,
}

impl MemoryTable {
    fn failing_on(call: usize) -> Self {
        Self { fail_on_call: Some(call), ..Self::default() }
    }

    fn stored_rows(&self) -> Vec<SanitizedRow> {
        self.chunks.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl TableRepository for MemoryTable {
    async fn recreate_table(&self, table: &str, columns: &HeaderSet) -> Result<(), IngestionError> {
        *self.created.lock().unwrap() = Some((table.to_string(), columns.columns().to_vec()));
        self.chunks.lock().unwrap().clear();
        Ok(())
    }

    async fn insert_chunk(&self, _table: &str, columns: &HeaderSet, rows: &[SanitizedRow]) -> Result<u64, IngestionError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if self.fail_on_call == Some(call) {
            return Err(IngestionError::Database("value too long".to_string()));
        }
        assert!(rows.iter().all(|r| r.len() == columns.len()));
        self.chunks.lock().unwrap().push(rows.to_vec());
        Ok(rows.len() as u64)
    }

    async fn create_id_index(&self, _table: &str) -> Result<(), IngestionError> {
        if self.fail_index {
            return Err(IngestionError::Database("permission denied".to_string()));
        }
        *self.indexed.lock().unwrap() = true;
        Ok(())
    }
}

fn numbered_rows(n: usize) -> Vec<Result<Row, IngestionError>> {
    (0..n).map(|i| Ok(vec![i.to_string()])).collect()
}

fn single_column() -> HeaderSet {
    normalize_headers(&["n"])
}

fn target<'a>(headers: &'a HeaderSet, chunk_size: usize, policy: ChunkFailurePolicy) -> ChunkTarget<'a> {
    ChunkTarget { table: "t", headers, chunk_size, policy }
}

#[tokio::test]
async fn chunk_count_and_order_follow_chunk_size() {
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());
    let headers = single_column();

    let reports = service
        .import_rows(&target(&headers, 5, ChunkFailurePolicy::Continue), numbered_rows(23), Instant::now())
        .await
        .unwrap();

    assert_eq!(reports.len(), 5);
    assert_eq!(reports.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(reports.last().unwrap().running_total, 23);
    assert!(reports.last().unwrap().is_final);
    assert!(reports[..4].iter().all(|r| !r.is_final));

    let chunks = repo.chunks.lock().unwrap().clone();
    for i in 0..23 {
        assert_eq!(chunks[i / 5][i % 5], vec![Some(i.to_string())]);
    }
    assert_eq!(chunks[4].len(), 3);
}

#[tokio::test]
async fn exact_multiple_has_no_partial_chunk() {
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());
    let headers = single_column();

    let reports = service
        .import_rows(&target(&headers, 5, ChunkFailurePolicy::Continue), numbered_rows(10), Instant::now())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| !r.is_final));
    assert_eq!(repo.stored_rows().len(), 10);
}

#[tokio::test]
async fn empty_input_submits_nothing() {
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());
    let headers = single_column();

    let reports = service
        .import_rows(&target(&headers, 3, ChunkFailurePolicy::Continue), numbered_rows(0), Instant::now())
        .await
        .unwrap();

    assert!(reports.is_empty());
    assert_eq!(*repo.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn failed_chunk_counts_zero_and_import_continues() {
    let repo = Arc::new(MemoryTable::failing_on(2));
    let service = ImportService::new(repo.clone());
    let headers = single_column();

    let reports = service
        .import_rows(&target(&headers, 4, ChunkFailurePolicy::Continue), numbered_rows(12), Instant::now())
        .await
        .unwrap();

    assert_eq!(reports.len(), 3);
    assert!(matches!(reports[1].outcome, ChunkOutcome::Failed { .. }));
    assert_eq!(reports[1].running_total, 4);
    assert_eq!(reports[2].outcome, ChunkOutcome::Inserted { rows: 4 });
    assert_eq!(reports[2].running_total, 8);
    assert_eq!(repo.stored_rows()[4], vec![Some("8".to_string())]);
}

#[tokio::test]
async fn abort_policy_stops_at_first_failure() {
    let repo = Arc::new(MemoryTable::failing_on(2));
    let service = ImportService::new(repo.clone());
    let headers = single_column();

    let err = service
        .import_rows(&target(&headers, 4, ChunkFailurePolicy::Abort), numbered_rows(12), Instant::now())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::ChunkAborted { sequence: 2, .. }));
    assert_eq!(*repo.calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn read_error_is_fatal() {
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());
    let headers = single_column();
    let rows = vec![
        Ok(vec!["a".to_string()]),
        Err(IngestionError::Decode("line 3: invalid utf-8".to_string())),
        Ok(vec!["b".to_string()]),
    ];

    let result = service
        .import_rows(&target(&headers, 10, ChunkFailurePolicy::Continue), rows, Instant::now())
        .await;

    assert!(matches!(result, Err(IngestionError::Decode(_))));
    assert_eq!(*repo.calls.lock().unwrap(), 0);
}

fn csv_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn import_config(path: PathBuf, chunk_size: usize) -> ImportConfig {
    ImportConfig {
        csv_path: path,
        table_name: "circuit_report".to_string(),
        chunk_size,
        on_chunk_failure: ChunkFailurePolicy::Continue,
    }
}

#[tokio::test]
async fn run_creates_table_sanitizes_rows_and_indexes() {
    let file = csv_file("Circle Name,VLAN,vlan,2G Site\nDelhi , NULL,7\nMumbai,N/A,8,x,extra\nPune,,9,y\n");
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());

    let summary = service.run(&import_config(file.path().to_path_buf(), 2)).await.unwrap();

    let (table, columns) = repo.created.lock().unwrap().clone().unwrap();
    assert_eq!(table, "circuit_report");
    assert_eq!(columns, vec!["circle_name", "vlan", "vlan_2", "col_2g_site"]);

    assert_eq!(summary.total_rows, 3);
    assert_eq!(summary.chunks.len(), 2);
    assert_eq!(summary.columns, 4);
    assert!(summary.index_created);
    assert!(*repo.indexed.lock().unwrap());

    let rows = repo.stored_rows();
    assert_eq!(rows[0], vec![Some("Delhi".into()), None, Some("7".into()), None]);
    assert_eq!(rows[1], vec![Some("Mumbai".into()), None, Some("8".into()), Some("x".into())]);
    assert_eq!(rows[2], vec![Some("Pune".into()), None, Some("9".into()), Some("y".into())]);
}

#[tokio::test]
async fn id_header_does_not_clash_with_primary_key() {
    let file = csv_file("ID,VLAN\n1,10\n");
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());

    let summary = service.run(&import_config(file.path().to_path_buf(), 10)).await.unwrap();

    let (_, columns) = repo.created.lock().unwrap().clone().unwrap();
    assert_eq!(columns, vec!["id_0", "vlan"]);
    assert_eq!(summary.total_rows, 1);
    assert_eq!(repo.stored_rows()[0], vec![Some("1".into()), Some("10".into())]);
}

#[tokio::test]
async fn index_failure_does_not_fail_import() {
    let file = csv_file("a\n1\n");
    let repo = Arc::new(MemoryTable { fail_index: true, ..MemoryTable::default() });
    let service = ImportService::new(repo.clone());

    let summary = service.run(&import_config(file.path().to_path_buf(), 10)).await.unwrap();

    assert_eq!(summary.total_rows, 1);
    assert!(!summary.index_created);
}

#[tokio::test]
async fn missing_file_aborts_before_table_creation() {
    let repo = Arc::new(MemoryTable::default());
    let service = ImportService::new(repo.clone());

    let err = service
        .run(&import_config(PathBuf::from("/no/such/report.csv"), 10))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::FileNotFound(_)));
    assert!(repo.created.lock().unwrap().is_none());
}
