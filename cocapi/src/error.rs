//! Error taxonomy for API calls.
//!
//! Every failure a client can report is an [`ApiError`]. Transport failures
//! and non-2xx statuses are classified at the executor boundary, so callers
//! never see a raw [`TransportError`].
//!
//! Retryable kinds ([`Network`](ApiError::Network),
//! [`Timeout`](ApiError::Timeout), [`RateLimited`](ApiError::RateLimited),
//! [`Server`](ApiError::Server)) only surface wrapped in
//! [`RetriesExhausted`](ApiError::RetriesExhausted) once the retry budget is
//! spent. Everything else surfaces on first occurrence.

use std::fmt;
use std::time::Duration;

use cocapi_core::TransportError;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::middleware::MiddlewareError;
use crate::schema::SchemaError;

/// Stable, string-convertible classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection-level failure.
    Network,
    /// Attempt exceeded its timeout.
    Timeout,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    Server,
    /// HTTP 4xx other than 401, 403 and 429.
    Client,
    /// HTTP 401 or 403.
    Auth,
    /// Retry budget spent.
    RetriesExhausted,
    /// Malformed custom endpoint path.
    InvalidPath,
    /// The transport could not build the request.
    InvalidRequest,
    /// Rejected configuration change.
    InvalidConfiguration,
    /// Response body was not valid JSON.
    Decode,
    /// A middleware stage failed.
    Middleware,
    /// Payload did not match the requested model.
    Schema,
}

impl ErrorKind {
    /// Returns the kind as a static string, used as `error_type` in
    /// structured responses and as a metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Auth => "auth",
            ErrorKind::RetriesExhausted => "retries_exhausted",
            ErrorKind::InvalidPath => "invalid_path",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
            ErrorKind::Decode => "decode",
            ErrorKind::Middleware => "middleware",
            ErrorKind::Schema => "schema",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every client operation.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Connection could not be established or broke mid-flight.
    #[error("connection error - {message}")]
    Network {
        /// Underlying transport message.
        message: String,
    },

    /// The attempt did not complete within the configured timeout.
    #[error("request timeout after {} seconds", .timeout.as_secs_f64())]
    Timeout {
        /// Per-attempt budget that was exceeded.
        timeout: Duration,
    },

    /// HTTP 429.
    #[error("rate limited - too many requests")]
    RateLimited {
        /// Server supplied `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx.
    #[error("server error {status} - try again later")]
    Server {
        /// Response status.
        status: u16,
    },

    /// HTTP 4xx other than 401, 403 and 429.
    #[error("{}", client_message(*.status))]
    Client {
        /// Response status.
        status: u16,
    },

    /// HTTP 401 or 403.
    #[error("access denied ({status}) - invalid API token or missing IP whitelisting")]
    Auth {
        /// Response status.
        status: u16,
    },

    /// Retryable failures persisted for the whole retry budget.
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of transport attempts made.
        attempts: u32,
        /// The last failure.
        source: Box<ApiError>,
    },

    /// Custom endpoint path rejected before any network activity.
    #[error("invalid endpoint path {path:?}: {reason}")]
    InvalidPath {
        /// Path as supplied.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The transport rejected the request before sending it.
    #[error("invalid request - {message}")]
    InvalidRequest {
        /// Underlying transport message.
        message: String,
    },

    /// Configuration is invalid or a change was refused.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Successful status with a body that is not JSON.
    #[error("invalid JSON response from API: {0}")]
    Decode(String),

    /// A middleware stage returned an error.
    #[error("middleware stage {stage:?} failed: {source}")]
    Middleware {
        /// Name of the failing stage.
        stage: String,
        /// Error returned by the stage.
        source: MiddlewareError,
    },

    /// Payload did not match the requested model.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn client_message(status: u16) -> String {
    match status {
        400 => "bad request (400) - check your parameters".to_owned(),
        404 => "not found (404) - check clan/player tag".to_owned(),
        _ => format!("HTTP error {status}"),
    }
}

impl ApiError {
    /// Classifies a non-2xx status.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            401 | 403 => ApiError::Auth { status },
            429 => ApiError::RateLimited { retry_after },
            500..=599 => ApiError::Server { status },
            _ => ApiError::Client { status },
        }
    }

    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Auth { .. } => ErrorKind::Auth,
            ApiError::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            ApiError::InvalidPath { .. } => ErrorKind::InvalidPath,
            ApiError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ApiError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::Middleware { .. } => ErrorKind::Middleware,
            ApiError::Schema(_) => ErrorKind::Schema,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network { .. }
                | ApiError::Timeout { .. }
                | ApiError::RateLimited { .. }
                | ApiError::Server { .. }
        )
    }

    /// HTTP status associated with this error, if a response was received.
    ///
    /// For [`RetriesExhausted`](ApiError::RetriesExhausted) this is the status
    /// of the last attempt.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status }
            | ApiError::Client { status }
            | ApiError::Auth { status } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Server supplied retry hint, only set for [`RateLimited`](ApiError::RateLimited).
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Structured error value: `{"result": "error", "message", "error_type"}`.
    pub fn to_value(&self) -> Value {
        json!({
            "result": "error",
            "message": self.to_string(),
            "error_type": self.kind().as_str(),
        })
    }
}

impl From<TransportError> for ApiError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Timeout(timeout) => ApiError::Timeout { timeout },
            TransportError::Connect(source) | TransportError::Other(source) => {
                ApiError::Network {
                    message: source.to_string(),
                }
            }
            TransportError::Request(source) => ApiError::InvalidRequest {
                message: source.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ApiError::from_status(401, None).kind(), ErrorKind::Auth);
        assert_eq!(ApiError::from_status(403, None).kind(), ErrorKind::Auth);
        assert_eq!(ApiError::from_status(404, None).kind(), ErrorKind::Client);
        assert_eq!(ApiError::from_status(429, None).kind(), ErrorKind::RateLimited);
        assert_eq!(ApiError::from_status(503, None).kind(), ErrorKind::Server);
        assert_eq!(ApiError::from_status(302, None).kind(), ErrorKind::Client);
    }

    #[test]
    fn only_transient_kinds_are_retryable() {
        assert!(ApiError::from_status(500, None).is_retryable());
        assert!(ApiError::from_status(429, None).is_retryable());
        assert!(
            ApiError::Timeout {
                timeout: Duration::from_secs(1)
            }
            .is_retryable()
        );
        assert!(!ApiError::from_status(400, None).is_retryable());
        assert!(!ApiError::from_status(403, None).is_retryable());
        assert!(!ApiError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn exhausted_reports_last_status() {
        let err = ApiError::RetriesExhausted {
            attempts: 4,
            source: Box::new(ApiError::Server { status: 502 }),
        };
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.kind().as_str(), "retries_exhausted");
    }

    #[test]
    fn structured_value_shape() {
        let value = ApiError::from_status(404, None).to_value();
        assert_eq!(value["result"], "error");
        assert_eq!(value["error_type"], "client");
        assert_eq!(value["message"], "not found (404) - check clan/player tag");
    }

    #[test]
    fn transport_errors_convert() {
        let err: ApiError = TransportError::Timeout(Duration::from_secs(2)).into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let err: ApiError = TransportError::Connect("refused".into()).into();
        assert_eq!(err.kind(), ErrorKind::Network);
        let err: ApiError = TransportError::Request("invalid URL".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(!err.is_retryable());
    }
}
