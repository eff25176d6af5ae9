use std::time::Duration;

use serde::Deserialize;

use crate::services::scheduler::{RunOptions, DEFAULT_CONCURRENCY};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the batch CLI.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Cloudflare account ID
    pub cf_account_id: String,

    /// Cloudflare Workers AI API token
    pub cf_api_token: String,

    /// Vision model used for the classify stage
    #[serde(default = "default_classify_model")]
    pub classify_model: String,

    /// Text model used for the describe stage
    #[serde(default = "default_describe_model")]
    pub describe_model: String,

    /// Per-request timeout for Workers AI calls, in seconds
    #[serde(default = "default_ai_timeout_secs")]
    pub ai_timeout_secs: u64,

    /// Simultaneous pipeline tasks per batch run
    #[serde(default = "default_concurrency")]
    pub default_concurrency: usize,

    /// Run the describe stage after classification
    #[serde(default = "default_auto_describe")]
    pub auto_describe: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_classify_model() -> String {
    "@cf/llava-hf/llava-1.5-7b-hf".to_string()
}

fn default_describe_model() -> String {
    "@cf/meta/llama-3.1-8b-instruct".to_string()
}

fn default_ai_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_auto_describe() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai_timeout_secs)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(self.default_concurrency, self.auto_describe)
    }
}
