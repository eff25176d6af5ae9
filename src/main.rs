use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use listing_autofill::{
    app_state::AppState, config::AppConfig, routes, services::workers_ai::WorkersAiClient,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing listing-autofill server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!("autofill_runs_started_total", "Batch pipeline runs started");
    metrics::describe_counter!(
        "autofill_items_completed_total",
        "Listing photos that reached Done"
    );
    metrics::describe_counter!(
        "autofill_items_failed_total",
        "Listing photos that reached Error, by failure kind"
    );
    metrics::describe_counter!(
        "autofill_results_discarded_total",
        "Results dropped because their run was cancelled or superseded"
    );
    metrics::describe_gauge!(
        "autofill_items_in_flight",
        "Items currently Classifying or Describing"
    );
    metrics::describe_histogram!(
        "autofill_item_seconds",
        "Time to take one photo through the pipeline"
    );

    // Initialize Workers AI client
    tracing::info!(
        classify_model = %config.classify_model,
        describe_model = %config.describe_model,
        "Initializing Cloudflare Workers AI client"
    );
    let vision = WorkersAiClient::new(
        &config.cf_account_id,
        &config.cf_api_token,
        &config.classify_model,
        &config.describe_model,
        config.ai_timeout(),
    )
    .expect("Failed to initialize Workers AI client");

    // Create shared application state
    let state = AppState::new(Arc::new(vision), config.run_options());

    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    tracing::info!("Starting listing-autofill on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
