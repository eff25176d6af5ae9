use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod batch;
pub mod health;
pub mod metrics;
pub mod single;

/// API routes with the standard middleware stack. `/metrics` is mounted by
/// the server binary since the Prometheus recorder is process-global.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/batch",
            get(batch::get_batch).post(batch::configure),
        )
        .route("/api/v1/batch/start", post(batch::start))
        .route("/api/v1/batch/cancel", post(batch::cancel))
        .route("/api/v1/batch/requeue", post(batch::requeue))
        .route("/api/v1/single", get(single::get_single))
        .route("/api/v1/single/run", post(single::run))
        .route("/api/v1/single/regenerate", post(single::regenerate))
        .route("/api/v1/single/describe", post(single::describe_with))
        .route("/api/v1/single/cancel", post(single::cancel))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB limit
}
