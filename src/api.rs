use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::{Ingestor, SourceSnapshot};
use crate::quality::QualityReport;
use crate::sync::SyncRun;

#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(ingestor: Arc<Ingestor>) -> Self {
        Self { ingestor }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync/status", get(sync_status))
        .route("/sync/status/{source}", get(source_status))
        .route("/quality/reports/{source}", get(source_report))
        .route("/quality/audit", get(audit))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub sources: usize,
    /// Sources whose latest run failed.
    pub failing: Vec<String>,
}

/// Healthy unless some source's latest sync failed.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let runs = state.ingestor.coordinator().all_runs();
    let failing: Vec<String> = runs
        .iter()
        .filter(|r| !r.succeeded)
        .map(|r| r.source_id.clone())
        .collect();
    let (code, status) = if failing.is_empty() {
        (StatusCode::OK, HealthStatus::Healthy)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unhealthy)
    };
    (
        code,
        Json(HealthResponse {
            status,
            sources: runs.len(),
            failing,
        }),
    )
}

async fn sync_status(State(state): State<AppState>) -> Json<Vec<SyncRun>> {
    Json(state.ingestor.coordinator().all_runs())
}

async fn source_status(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<SourceSnapshot>, ApiError> {
    Ok(Json(state.ingestor.source_snapshot(&source).await?))
}

async fn source_report(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<QualityReport>, ApiError> {
    state
        .ingestor
        .latest_report(&source)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no report for source '{source}'")))
}

async fn audit(State(state): State<AppState>) -> Result<Json<QualityReport>, ApiError> {
    Ok(Json(state.ingestor.audit_store().await?))
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, error) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(e) => {
                tracing::error!(target: "api", error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
            }
        };
        (code, Json(ErrorBody { error })).into_response()
    }
}
