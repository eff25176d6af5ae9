use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::pipeline::{
    BatchView, CancelResponse, ConfigureRequest, RequeueRequest, RequeueResponse, StartResponse,
};
use crate::services::scheduler::RunOptions;

/// GET /api/v1/batch — registry, progress and running flag.
pub async fn get_batch(State(state): State<AppState>) -> Json<BatchView> {
    Json(state.batch.view())
}

/// POST /api/v1/batch — replace the inputs; cancels any in-flight run.
pub async fn configure(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> Result<Json<BatchView>, StatusCode> {
    request.validate().map_err(|e| {
        tracing::warn!(error = %e, "Rejected batch configuration");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let options = RunOptions::new(
        request.concurrency.unwrap_or(state.defaults.concurrency),
        request.auto_describe.unwrap_or(state.defaults.auto_describe),
    );
    state.batch.configure(request.inputs, options);

    Ok(Json(state.batch.view()))
}

/// POST /api/v1/batch/start
pub async fn start(State(state): State<AppState>) -> Json<StartResponse> {
    Json(StartResponse {
        started: state.batch.start(),
    })
}

/// POST /api/v1/batch/cancel
pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.batch.cancel(),
    })
}

/// POST /api/v1/batch/requeue — one item by URI, or every finished item.
pub async fn requeue(
    State(state): State<AppState>,
    request: Option<Json<RequeueRequest>>,
) -> Result<Json<RequeueResponse>, StatusCode> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request
        .validate()
        .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let requeued = match request.uri.as_deref() {
        Some(uri) => state.batch.requeue_one(uri),
        None => state.batch.requeue_all(),
    };
    Ok(Json(RequeueResponse { requeued }))
}
