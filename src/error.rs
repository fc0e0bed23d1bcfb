//! Custom error types for litharvest.
//!
//! Library functions return `Result<T, HarvestError>`. The pipeline catches
//! most of these at the call site and logs them instead of aborting a run.

use thiserror::Error;

/// Main error type for litharvest operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be interpreted
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Build an `Api` error from a non-success HTTP status.
    pub fn from_status(service: &str, status: reqwest::StatusCode) -> Self {
        HarvestError::Api {
            code: status.as_u16() as i32,
            message: format!("{} error: {}", service, status),
        }
    }
}
