//! Metric declarations for the `metrics` facade.
//!
//! Compiled to no-ops unless the `metrics` feature is enabled.

use std::time::Duration;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

use super::CallRecord;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of completed calls.
    pub static ref REQUESTS_TOTAL: &'static str = {
        metrics::describe_counter!(
            "cocapi_requests_total",
            "Total number of API calls, labelled by endpoint and outcome."
        );
        "cocapi_requests_total"
    };
    /// Track number of calls served from the cache.
    pub static ref CACHE_HIT_TOTAL: &'static str = {
        metrics::describe_counter!(
            "cocapi_cache_hit_total",
            "Total number of API calls answered from the cache."
        );
        "cocapi_cache_hit_total"
    };
    /// Track number of failed calls.
    pub static ref ERRORS_TOTAL: &'static str = {
        metrics::describe_counter!(
            "cocapi_errors_total",
            "Total number of failed API calls, labelled by error kind."
        );
        "cocapi_errors_total"
    };
    /// Track number of retry attempts.
    pub static ref RETRIES_TOTAL: &'static str = {
        metrics::describe_counter!(
            "cocapi_retries_total",
            "Total number of transport retries."
        );
        "cocapi_retries_total"
    };
    /// Histogram of call duration.
    pub static ref REQUEST_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cocapi_request_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of API calls in seconds, retries included."
        );
        "cocapi_request_duration_seconds"
    };
    /// Histogram of time spent waiting for the rate limiter.
    pub static ref RATE_LIMIT_WAIT: &'static str = {
        metrics::describe_histogram!(
            "cocapi_rate_limit_wait_seconds",
            metrics::Unit::Seconds,
            "Time spent waiting for a rate limiter token in seconds."
        );
        "cocapi_rate_limit_wait_seconds"
    };
}

/// Exports one finished call.
#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_call(record: &CallRecord) {
    let outcome = record.outcome.as_str();
    metrics::counter!(
        *REQUESTS_TOTAL,
        "endpoint" => record.endpoint.clone(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!(
        *REQUEST_DURATION,
        "endpoint" => record.endpoint.clone(),
        "outcome" => outcome
    )
    .record(record.duration.as_secs_f64());

    if record.outcome == super::CallOutcome::CacheHit {
        metrics::counter!(*CACHE_HIT_TOTAL, "endpoint" => record.endpoint.clone()).increment(1);
    }
    if let Some(kind) = record.error_kind {
        metrics::counter!(*ERRORS_TOTAL, "kind" => kind.as_str()).increment(1);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_call(_record: &CallRecord) {}

/// Exports one scheduled retry.
#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_retry(endpoint: &str) {
    metrics::counter!(*RETRIES_TOTAL, "endpoint" => super::normalize_endpoint(endpoint))
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_retry(_endpoint: &str) {}

/// Exports time spent in the rate limiter.
#[cfg(feature = "metrics")]
#[inline]
pub(crate) fn record_rate_limit_wait(wait: Duration) {
    metrics::histogram!(*RATE_LIMIT_WAIT).record(wait.as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_rate_limit_wait(_wait: Duration) {}
