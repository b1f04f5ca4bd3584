//! Client configuration.
//!
//! [`ApiConfig`] is the single canonical set of options a client is built
//! from. Every field has an independent default, so a YAML document only
//! needs to name what it changes:
//!
//! ```
//! use std::time::Duration;
//! use cocapi::ApiConfig;
//!
//! let config = ApiConfig::from_yaml(
//!     r#"
//! timeout: 5s
//! max_retries: 1
//! cache_ttl: 10m
//! enable_metrics: true
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.timeout, Duration::from_secs(5));
//! assert_eq!(config.cache_ttl, Duration::from_secs(600));
//! assert_eq!(config.burst_limit, 20);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Official API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.clashofclans.com/v1";

/// Options for a client instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Budget for a single transport attempt (e.g. `"20s"`).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Backoff base delay (e.g. `"1s"`, `"250ms"`).
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Apply ±25 % jitter to backoff delays.
    pub retry_jitter: bool,
    /// Serve repeated requests from the in-process cache.
    pub enable_caching: bool,
    /// Lifetime of cached responses (e.g. `"5m"`).
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Upper bound on cached entries; unbounded when unset.
    pub cache_max_entries: Option<usize>,
    /// Admission control for async clients.
    pub enable_rate_limiting: bool,
    /// Token refill rate.
    pub requests_per_second: f64,
    /// Token bucket capacity.
    pub burst_limit: u32,
    /// Record per-call metrics.
    pub enable_metrics: bool,
    /// Number of call records kept for summaries.
    pub metrics_window_size: usize,
    /// Return failures as values and add `status_code` to every response.
    pub status_code: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(20),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_jitter: true,
            enable_caching: true,
            cache_ttl: Duration::from_secs(300),
            cache_max_entries: None,
            enable_rate_limiting: true,
            requests_per_second: 10.0,
            burst_limit: 20,
            enable_metrics: false,
            metrics_window_size: 1000,
            status_code: false,
        }
    }
}

impl ApiConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ApiError> {
        let config: ApiConfig = serde_saphyr::from_str(yaml)
            .map_err(|err| ApiError::InvalidConfiguration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that the type system cannot express.
    pub fn validate(&self) -> Result<(), ApiError> {
        validate_base_url(&self.base_url)?;
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero"));
        }
        if !(self.requests_per_second.is_finite() && self.requests_per_second > 0.0) {
            return Err(invalid("requests_per_second must be a positive number"));
        }
        if self.burst_limit == 0 {
            return Err(invalid("burst_limit must be at least 1"));
        }
        if self.metrics_window_size == 0 {
            return Err(invalid("metrics_window_size must be at least 1"));
        }
        if self.cache_max_entries == Some(0) {
            return Err(invalid("cache_max_entries must be at least 1 when set"));
        }
        Ok(())
    }
}

/// Accepts absolute `http`/`https` URLs with a host and no query string.
pub(crate) fn validate_base_url(url: &str) -> Result<(), ApiError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid(format!("base_url {url:?} must start with http:// or https://")))?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err(invalid(format!("base_url {url:?} has no host")));
    }
    if url.contains(['?', '#']) || url.chars().any(char::is_whitespace) {
        return Err(invalid(format!(
            "base_url {url:?} must not contain a query, fragment or whitespace"
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::InvalidConfiguration(message.into())
}
