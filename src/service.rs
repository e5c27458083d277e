//! HTTP surface for the record store
//!
//! | Route                    | Purpose                                      |
//! |--------------------------|----------------------------------------------|
//! | `GET /health`            | liveness                                     |
//! | `GET /params`            | scheme parameters clients must match         |
//! | `POST /runs/stats`       | derive stats/summary/inference for one run   |
//! | `POST /summaries/merge`  | fold a run summary into a lifetime summary   |
//! | `DELETE /keys/:key_id`   | revoke a key set (cache and remote)          |
//!
//! Homomorphic work runs on the blocking pool, bounded by a semaphore. The
//! service holds no run or summary state; callers persist the results and
//! must serialize merges per key set.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::engine::{DerivedBlobs, RunBlobs, StatsEngine, SummaryMerger};
use crate::error::{ErrorClass, StatsError};
use crate::keys::KeyStore;
use crate::scheme::Evaluator;

pub struct AppState<E: Evaluator> {
    pub engine: StatsEngine<E>,
    pub merger: SummaryMerger<E>,
    pub keys: Arc<KeyStore>,
    permits: Arc<Semaphore>,
}

impl<E: Evaluator> AppState<E> {
    pub fn new(evaluator: Arc<E>, keys: Arc<KeyStore>, max_concurrent: usize) -> crate::Result<Self> {
        Ok(Self {
            engine: StatsEngine::new(evaluator.clone())?,
            merger: SummaryMerger::new(evaluator),
            keys,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ParamsResponse {
    pub version: String,
    pub slot_count: usize,
    pub ring_dim: usize,
    pub scale_bits: u32,
    pub max_depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub key_id: String,
    #[serde(flatten)]
    pub run: RunBlobs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub derived: DerivedBlobs,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub new_summary: String,
    pub stored_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error on its way to the client
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

/// HTTP status for each error class
pub fn status_for(err: &StatsError) -> StatusCode {
    match err.status_class() {
        ErrorClass::Caller => match err {
            StatsError::IncompatibleOperands(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::BAD_REQUEST,
        },
        ErrorClass::Retryable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// Run `f` on the blocking pool once a computation permit is free
async fn run_blocking<E, T, F>(state: &Arc<AppState<E>>, f: F) -> Result<T, ApiError>
where
    E: Evaluator + 'static,
    T: Send + 'static,
    F: FnOnce() -> crate::Result<T> + Send + 'static,
{
    let _permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::unavailable("service is shutting down"))?;

    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("computation task failed: {}", e),
        })?;

    result.map_err(|e| {
        error!(error = %e, "Request failed");
        ApiError::from(e)
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_params<E: Evaluator + 'static>(
    State(state): State<Arc<AppState<E>>>,
) -> Json<ParamsResponse> {
    let params = state.engine.evaluator().params();
    Json(ParamsResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        slot_count: params.slot_count,
        ring_dim: params.ring_dim(),
        scale_bits: params.scale_bits,
        max_depth: params.max_depth,
    })
}

async fn handle_stats<E: Evaluator + 'static>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<StatsRequest>,
) -> Result<Json<StatsResponse>, ApiError> {
    let start = Instant::now();

    let worker = state.clone();
    let derived = run_blocking(&state, move || {
        let keys = worker
            .keys
            .resolve(worker.engine.evaluator().as_ref(), &req.key_id)?;
        worker.engine.compute_blobs(&req.run, &keys)
    })
    .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!(processing_time_ms, "Computed run statistics");

    Ok(Json(StatsResponse {
        derived,
        processing_time_ms,
    }))
}

/// Callers must not issue concurrent merges for the same lifetime summary
async fn handle_merge<E: Evaluator + 'static>(
    State(state): State<Arc<AppState<E>>>,
    Json(req): Json<MergeRequest>,
) -> Result<Json<MergeResponse>, ApiError> {
    let worker = state.clone();
    let summary = run_blocking(&state, move || {
        worker.merger.add_blobs(&req.new_summary, &req.stored_summary)
    })
    .await?;

    Ok(Json(MergeResponse { summary }))
}

async fn handle_delete_key<E: Evaluator + 'static>(
    State(state): State<Arc<AppState<E>>>,
    Path(key_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let worker = state.clone();
    run_blocking(&state, move || worker.keys.delete(&key_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router<E: Evaluator + 'static>(state: Arc<AppState<E>>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/params", get(get_params::<E>))
        .route("/runs/stats", post(handle_stats::<E>))
        .route("/summaries/merge", post(handle_merge::<E>))
        .route("/keys/:key_id", delete(handle_delete_key::<E>))
        .with_state(state)
}
