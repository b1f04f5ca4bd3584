use std::fmt;

/// Stages a call moves through, in order.
///
/// `RateLimitWait` is only entered by asynchronous calls. A cache hit jumps
/// from `CacheCheck` straight to `MetricsRecord`; a failure jumps from the
/// failing stage to `MetricsRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Looking the key up in the cache store.
    CacheCheck,
    /// Waiting for a rate limiter token.
    RateLimitWait,
    /// Running request middleware.
    MiddlewareRequest,
    /// Sending to the transport, possibly several times.
    TransportAttempt,
    /// Running response middleware.
    MiddlewareResponse,
    /// Writing the payload to the cache store.
    CacheStore,
    /// Appending the call to the metrics window.
    MetricsRecord,
}

impl CallState {
    /// Returns the state as a static string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::CacheCheck => "cache_check",
            CallState::RateLimitWait => "rate_limit_wait",
            CallState::MiddlewareRequest => "middleware_request",
            CallState::TransportAttempt => "transport_attempt",
            CallState::MiddlewareResponse => "middleware_response",
            CallState::CacheStore => "cache_store",
            CallState::MetricsRecord => "metrics_record",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
