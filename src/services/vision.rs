use async_trait::async_trait;

use crate::models::work_item::{Classification, Description};

/// Opaque classification/description service the pipeline orchestrates.
///
/// Retries and timeouts belong to the implementation; a timeout surfaces
/// as an ordinary [`ServiceError::Timeout`].
#[async_trait]
pub trait VisionService: Send + Sync {
    /// Map a listing photo to a category, confidence and labels.
    async fn classify(&self, image_uri: &str) -> Result<Classification, ServiceError>;

    /// Write a listing blurb for a category and its labels.
    async fn describe(&self, category: &str, labels: &[String])
        -> Result<Description, ServiceError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error: {message}")]
    Server {
        status: Option<u16>,
        message: String,
    },
}

impl ServiceError {
    pub fn server(message: impl Into<String>) -> Self {
        ServiceError::Server {
            status: None,
            message: message.into(),
        }
    }

    /// Network and timeout failures are worth a manual requeue; server
    /// rejections may be permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Network(_) | ServiceError::Timeout(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Network(_) => "network",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::Server { .. } => "server",
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::Server {
                status: err.status().map(|s| s.as_u16()),
                message: format!("undecodable response: {err}"),
            }
        } else if let Some(status) = err.status() {
            ServiceError::Server {
                status: Some(status.as_u16()),
                message: err.to_string(),
            }
        } else {
            ServiceError::Network(err.to_string())
        }
    }
}
