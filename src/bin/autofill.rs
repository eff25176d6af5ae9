use clap::Parser;
use listing_autofill::{
    config::AppConfig,
    models::work_item::Progress,
    services::{
        scheduler::{RunOptions, Scheduler},
        workers_ai::WorkersAiClient,
    },
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 250;

/// Classify and describe listing photos in one batch run.
#[derive(Parser, Debug)]
#[command(name = "autofill", version)]
struct Cli {
    /// Image references: http(s) URLs, data: URIs or local paths
    #[arg(required = true)]
    images: Vec<String>,

    /// Simultaneous pipeline tasks (defaults to DEFAULT_CONCURRENCY)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Stop after classification
    #[arg(long)]
    no_describe: bool,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let vision = WorkersAiClient::new(
        &config.cf_account_id,
        &config.cf_api_token,
        &config.classify_model,
        &config.describe_model,
        config.ai_timeout(),
    )
    .expect("Failed to initialize Workers AI client")
    .with_local_files();

    let defaults = config.run_options();
    let options = RunOptions::new(
        cli.concurrency.unwrap_or(defaults.concurrency),
        defaults.auto_describe && !cli.no_describe,
    );

    let scheduler = Scheduler::new(Arc::new(vision));
    scheduler.configure(cli.images, options);

    if !scheduler.start() {
        tracing::warn!("Nothing to process");
        return;
    }

    let mut last = Progress::default();
    let idle = scheduler.wait_idle();
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = &mut idle => break,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, cancelling run");
                scheduler.cancel();
                break;
            }
            _ = sleep(Duration::from_millis(POLL_INTERVAL_MS)) => {
                let progress = scheduler.progress();
                if progress != last {
                    tracing::info!(
                        completed = progress.completed,
                        total = progress.total,
                        percent = progress.percent,
                        "Progress"
                    );
                    last = progress;
                }
            }
        }
    }

    let view = scheduler.view();
    tracing::info!(
        completed = view.progress.completed,
        total = view.progress.total,
        "Batch finished"
    );
    match serde_json::to_string_pretty(&view.items) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize results"),
    }
}
