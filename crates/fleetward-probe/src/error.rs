//! Error types for probes

use thiserror::Error;

/// Errors from a single probe attempt
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Endpoint answered with a non-success status
    #[error("unhealthy status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// TCP connect failed
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),

    /// Attempt did not finish in its time slice
    #[error("probe attempt timed out")]
    Timeout,
}

/// Result type for probe attempts
pub type Result<T> = std::result::Result<T, ProbeError>;
