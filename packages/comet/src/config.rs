use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::action::DEFAULT_NAMESPACE;
use crate::error::{CometError, Result};

/// Collector service name used in `/api/<service>/...`.
pub const DEFAULT_SERVICE: &str = "comet";

/// Default timeout for one collector POST.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tracker configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CometConfig {
    pub service: String,
    pub namespace: String,
    /// How long a deferred capture may stay armed; `None` waits forever.
    pub deferred_timeout: Option<Duration>,
    pub send_timeout: Duration,
}

impl CometConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            service: env::var("COMET_SERVICE").unwrap_or_else(|_| DEFAULT_SERVICE.to_string()),
            namespace: env::var("COMET_ACTION_NAMESPACE")
                .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string()),
            deferred_timeout: env::var("COMET_DEFERRED_TIMEOUT_SECS")
                .ok()
                .map(|v| parse_number(&v, "COMET_DEFERRED_TIMEOUT_SECS"))
                .transpose()?
                .map(Duration::from_secs),
            send_timeout: env::var("COMET_SEND_TIMEOUT_MS")
                .ok()
                .map(|v| parse_number(&v, "COMET_SEND_TIMEOUT_MS"))
                .transpose()?
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SEND_TIMEOUT),
        })
    }
}

impl Default for CometConfig {
    fn default() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            deferred_timeout: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

fn parse_number(value: &str, key: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| CometError::Config(format!("{key} must be a whole number, got `{value}`")))
}
