//! Transport traits: the single outbound HTTP call.
//!
//! The executor never talks to an HTTP client directly. It hands a
//! [`TransportRequest`] to either a [`Transport`] (async clients) or a
//! [`BlockingTransport`] (blocking clients) and classifies whatever comes
//! back. Implementations must keep three outcomes apart:
//!
//! - a response with any status code, including the raw body
//! - [`TransportError::Timeout`] when the attempt ran out of time
//! - [`TransportError::Connect`] / [`TransportError::Other`] for failures
//!   before a response was received
//! - [`TransportError::Request`] when the request could not be built at all;
//!   sending it again cannot succeed
//!
//! # Examples
//!
//! ```rust
//! use async_trait::async_trait;
//! use cocapi_core::{Transport, TransportError, TransportRequest, TransportResponse};
//!
//! struct Canned;
//!
//! #[async_trait]
//! impl Transport for Canned {
//!     async fn send(&self, _req: TransportRequest) -> Result<TransportResponse, TransportError> {
//!         Ok(TransportResponse::new(200, r#"{"items":[]}"#))
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use thiserror::Error;

use crate::request::{Headers, Params, RequestContext};

/// Longest server-supplied `Retry-After` hint that is honoured as is.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Boxed error used as the source of transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// One HTTP call as handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL without query string.
    pub url: String,
    /// Query parameters to append.
    pub params: Params,
    /// Headers, including the bearer `authorization` header.
    pub headers: Headers,
    /// Optional JSON body for `POST`.
    pub body: Option<Bytes>,
    /// Budget for this attempt alone.
    pub timeout: Duration,
}

impl TransportRequest {
    /// Builds a transport request from the final, post-middleware context.
    pub fn from_context(context: RequestContext, timeout: Duration) -> Self {
        Self {
            method: context.method,
            url: context.url,
            params: context.params,
            headers: context.headers,
            body: None,
            timeout,
        }
    }

    /// Attaches a JSON body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Raw response as received from the upstream API.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers with lowercase names.
    pub headers: Headers,
    /// Raw body bytes.
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a response with the given status and body.
    ///
    /// Status codes outside `100..=999` are mapped to `500`.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Adds a header, lowercasing its name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status is in the `2xx` range.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parses a `Retry-After` header given in delta-seconds, capped at
    /// [`MAX_RETRY_AFTER`].
    ///
    /// HTTP-date values are not supported and yield `None`.
    pub fn retry_after(&self) -> Option<Duration> {
        let value = self.header("retry-after")?.trim();
        let secs = value.parse::<f64>().ok().filter(|secs| *secs >= 0.0)?;
        // NaN fails the filter above, so conversion only fails on overflow.
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(MAX_RETRY_AFTER);
        Some(delay.min(MAX_RETRY_AFTER))
    }

    /// Body as lossy UTF-8, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure before a complete response was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The attempt exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connect(#[source] BoxError),

    /// The request could not be built, for example an invalid URL or header.
    #[error("invalid request: {0}")]
    Request(#[source] BoxError),

    /// Any other failure, such as TLS or reading the body.
    #[error("transport failure: {0}")]
    Other(#[source] BoxError),
}

/// Asynchronous transport used by async clients.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs exactly one HTTP call.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}

/// Blocking transport used by synchronous clients.
pub trait BlockingTransport: Send + Sync {
    /// Performs exactly one HTTP call, blocking the calling thread.
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

impl<T> BlockingTransport for Arc<T>
where
    T: BlockingTransport + ?Sized,
{
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

impl BlockingTransport for Box<dyn BlockingTransport> {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}
