use std::sync::Arc;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, debug, error, warn};
use crate::{
    application::upload_service::{check_filename, UploadService},
    config::AppConfig,
    domain::{error::IngestionError, models::UploadOutcome, ports::RecordRepository},
    infrastructure::postgres::PgRecordRepository,
};

pub const UPLOAD_PATH: &str = "/upload_csv/";
pub const FILE_FIELD: &str = "file";

#[derive(Clone)]
pub struct AppState {
    upload: Arc<UploadService>,
}

/// Error body shaped as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, detail: detail.into() }
    }
}

impl From<IngestionError> for ApiError {
    fn from(e: IngestionError) -> Self {
        let status = match e {
            IngestionError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, detail: e.to_string() }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self { status: e.status(), detail: e.body_text() }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        warn!("Rejected upload request: {}", e.body_text());
        Self { status: e.status(), detail: e.body_text() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

pub fn router(upload: Arc<UploadService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(UPLOAD_PATH, post(upload_csv))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(AppState { upload })
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn upload_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadOutcome>, ApiError> {
    let mut multipart = multipart?;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        check_filename(&filename)?;

        let bytes = field.bytes().await?;
        let outcome = state.upload.handle(&filename, &bytes).await
            .map_err(|e| {
                error!("Upload {} failed: {}", filename, e);
                e
            })?;
        info!("✅ Upload {} processed: {} rows", filename, outcome.inserted_rows);
        return Ok(Json(outcome));
    }

    warn!("Upload request carried no '{}' field", FILE_FIELD);
    Err(ApiError::bad_request("Missing file"))
}

pub fn build_upload_service(config: &AppConfig) -> UploadService {
    let repo: Option<Arc<dyn RecordRepository>> = if config.upload.persist {
        info!("Upload persistence enabled, target table: {}", config.upload.table_name);
        Some(Arc::new(PgRecordRepository::new(
            config.database.connect_options(),
            config.upload.table_name.clone(),
        )))
    } else {
        info!("Upload persistence disabled; records are validated and counted only");
        None
    };
    UploadService::new(repo)
}

pub async fn serve(config: &AppConfig) -> Result<(), IngestionError> {
    let app = router(
        Arc::new(build_upload_service(config)),
        config.server.max_upload_bytes,
    );

    let listener = TcpListener::bind(&config.server.bind_addr).await
        .map_err(|e| {
            error!("Failed to bind {}: {}", config.server.bind_addr, e);
            e
        })?;
    info!("Upload service listening on http://{}{}", config.server.bind_addr, UPLOAD_PATH);

    axum::serve(listener, app).await?;
    Ok(())
}
