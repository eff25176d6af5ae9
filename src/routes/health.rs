use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub batch: BatchHealth,
}

#[derive(Serialize)]
pub struct BatchHealth {
    pub running: bool,
    pub items: usize,
    pub completed: usize,
}

/// GET /health — liveness plus a summary of the batch pipeline.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let progress = state.batch.progress();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        batch: BatchHealth {
            running: state.batch.running(),
            items: progress.total,
            completed: progress.completed,
        },
    })
}
