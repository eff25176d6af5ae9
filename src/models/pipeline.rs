use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::work_item::{Progress, WorkItem};

/// Request to replace the batch inputs.
#[derive(Debug, Deserialize, Validate)]
pub struct ConfigureRequest {
    #[garde(length(min = 1, max = 64), inner(length(min = 1, max = 2048)))]
    pub inputs: Vec<String>,

    #[garde(range(min = 1, max = 8))]
    pub concurrency: Option<usize>,

    #[garde(skip)]
    pub auto_describe: Option<bool>,
}

/// Reset one item (by URI) or, when absent, every finished item.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RequeueRequest {
    #[garde(length(min = 1))]
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SingleRunRequest {
    #[garde(length(min = 1, max = 2048))]
    pub input: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DescribeRequest {
    #[garde(length(min = 1, max = 200))]
    pub category: String,

    #[garde(length(max = 32), inner(length(min = 1, max = 100)))]
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Registry, progress and running flag as one consistent read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchView {
    pub running: bool,
    pub progress: Progress,
    pub items: Vec<WorkItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub started: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequeueResponse {
    pub requeued: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub generation: u64,
}
