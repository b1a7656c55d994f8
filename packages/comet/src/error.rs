//! Structured error types for comet.
//!
//! `CometError` covers the few places where tracking itself can fail:
//! loading configuration, resolving a collector address, and building the
//! HTTP client.
//!
//! # The Error Boundary Rule
//!
//! > **No `CometError` ever reaches the host's action handling.**
//!
//! - Host action errors are the host's own type and pass through interceptors untouched
//! - Transport failures are logged and dropped
//! - Only construction-time APIs (`CometConfig::from_env`, `HttpTransport::new`) return `CometError`

use thiserror::Error;

/// Result type for comet operations.
pub type Result<T> = std::result::Result<T, CometError>;

/// Errors raised while setting up or addressing the tracker.
#[derive(Debug, Error)]
pub enum CometError {
    /// Invalid or unparsable configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The document base address cannot be turned into a collector URL.
    #[error("invalid collector address `{base}`: {reason}")]
    Address { base: String, reason: String },

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CometError {
    pub(crate) fn address(base: impl Into<String>, reason: impl ToString) -> Self {
        Self::Address {
            base: base.into(),
            reason: reason.to_string(),
        }
    }
}
