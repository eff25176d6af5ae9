use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Pipeline status of a single listing photo.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Classifying,
    Describing,
    Done,
    Error,
}

impl ItemStatus {
    /// Claimed by a pipeline task and awaiting a network call.
    pub fn is_active(self) -> bool {
        matches!(self, ItemStatus::Classifying | ItemStatus::Describing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Done | ItemStatus::Error)
    }
}

/// Output of the classify stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
    pub labels: Vec<String>,
}

/// Output of the describe stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Description {
    pub blurb: String,
    pub meta: DescriptionMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DescriptionMeta {
    /// Model that produced the blurb.
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_title: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Per-image unit of pipeline state. Identity is the image URI, not its position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub uri: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn pending(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            status: ItemStatus::Pending,
            classification: None,
            description: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Completion counters derived from the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u8,
}
