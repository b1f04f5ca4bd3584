//! Orchestration of one logical API call.
//!
//! An [`Executor`] owns every piece of per-client state: the cache store,
//! the metrics window, the rate limiter, the retry policy and the
//! middleware pipeline. It is shared by the blocking and the asynchronous
//! entry points, which differ only in how they wait:
//!
//! ```text
//! CacheCheck ──hit──────────────────────────────────────────────┐
//!     │ miss                                                    │
//!     ▼                                                         │
//! RateLimitWait (async only)                                    │
//!     ▼                                                         │
//! MiddlewareRequest ──err──────────────────────────────────────┐│
//!     ▼                                                        ││
//! TransportAttempt ◄─┐ retryable, budget left: sleep(backoff)  ││
//!     │──────────────┘                                         ││
//!     ▼ 2xx + JSON              otherwise ────────────────────►││
//! MiddlewareResponse ──err────────────────────────────────────►││
//!     ▼                                                        ▼▼
//! CacheStore (GET only) ───────────────────────────────► MetricsRecord ─► return
//! ```
//!
//! The cache is consulted before the limiter and the retry loop, so a hit
//! consumes neither a token nor an attempt. The cache key is derived from
//! the request as built by the client, before middleware runs, and the
//! value stored under it is the payload after response middleware. Exactly
//! one [`CallRecord`] is appended per call.

mod blocking;
mod future;
mod states;

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use cocapi_core::{
    CacheKey, Headers, RequestContext, TransportError, TransportRequest, TransportResponse,
};

use crate::cache::CacheStore;
use crate::config::{ApiConfig, validate_base_url};
use crate::endpoints::ApiRequest;
use crate::error::ApiError;
use crate::metrics::{self, CallRecord, MetricsRecorder};
use crate::middleware::MiddlewarePipeline;
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryDecision, RetryPolicy};

pub use states::CallState;

/// Successful result of a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP status of the response, `200` for cache hits.
    pub status: u16,
    /// JSON payload after response middleware.
    pub payload: Value,
    /// Whether the payload came from the cache.
    pub cached: bool,
}

/// A call after the client built it, before anything ran.
#[derive(Debug)]
struct PreparedCall {
    context: RequestContext,
    key: Option<CacheKey>,
    body: Option<Value>,
    endpoint: String,
}

impl PreparedCall {
    fn method(&self) -> &str {
        self.context.method.as_str()
    }
}

/// Per-client request pipeline.
#[derive(Debug)]
pub struct Executor {
    base_url: String,
    timeout: Duration,
    headers: Headers,
    cache: CacheStore,
    metrics: MetricsRecorder,
    limiter: RateLimiter,
    retry: RetryPolicy,
    middleware: MiddlewarePipeline,
}

impl Executor {
    /// Builds the pipeline described by `config`, authenticating with `token`.
    pub fn new(token: &str, config: &ApiConfig) -> Result<Self, ApiError> {
        config.validate()?;

        let mut headers = Headers::new();
        headers.insert("authorization".to_owned(), format!("Bearer {token}"));
        headers.insert("accept".to_owned(), "application/json".to_owned());

        let cache = CacheStore::new(config.cache_ttl).with_max_entries(config.cache_max_entries);
        if !config.enable_caching {
            cache.disable();
        }
        let metrics = MetricsRecorder::new(config.metrics_window_size);
        if !config.enable_metrics {
            metrics.disable();
        }

        Ok(Self {
            base_url: trim_base_url(&config.base_url),
            timeout: config.timeout,
            headers,
            cache,
            metrics,
            limiter: RateLimiter::from_config(config),
            retry: RetryPolicy::from_config(config),
            middleware: MiddlewarePipeline::default(),
        })
    }

    /// Base URL calls are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Points later calls at another base URL.
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ApiError> {
        validate_base_url(base_url)?;
        self.base_url = trim_base_url(base_url);
        Ok(())
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Response cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Metrics window.
    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    /// Token bucket used by asynchronous calls.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Middleware stages.
    pub fn middleware(&self) -> &MiddlewarePipeline {
        &self.middleware
    }

    /// Middleware stages, for registration.
    pub fn middleware_mut(&mut self) -> &mut MiddlewarePipeline {
        &mut self.middleware
    }

    fn prepare(&self, request: ApiRequest) -> PreparedCall {
        let ApiRequest {
            method,
            path,
            params,
            body,
        } = request;
        let mut context = RequestContext::new(method, format!("{}{path}", self.base_url))
            .with_params(params);
        context.headers.extend(self.headers.clone());

        let key = (context.method == Method::GET && self.cache.is_enabled())
            .then(|| context.cache_key());

        PreparedCall {
            context,
            key,
            body,
            endpoint: path,
        }
    }

    /// `CacheCheck`: a hit completes the call.
    fn lookup(&self, call: &PreparedCall, elapsed: Duration) -> Option<ApiResponse> {
        debug!(state = %CallState::CacheCheck);
        let key = call.key.as_ref()?;
        let Some(payload) = self.cache.get(key) else {
            debug!(%key, "cache miss");
            return None;
        };
        debug!(%key, "cache hit");
        self.record(CallRecord::cache_hit(&call.endpoint, call.method(), elapsed));
        Some(ApiResponse {
            status: 200,
            payload,
            cached: true,
        })
    }

    /// `MiddlewareRequest`: the request the transport receives.
    fn transport_request(&self, call: &PreparedCall) -> Result<TransportRequest, ApiError> {
        debug!(state = %CallState::MiddlewareRequest);
        let context = self.middleware.apply_request(call.context.clone())?;
        let mut request = TransportRequest::from_context(context, self.timeout);
        if let Some(body) = &call.body {
            let body = serde_json::to_vec(body).map_err(|err| ApiError::Decode(err.to_string()))?;
            request
                .headers
                .insert("content-type".to_owned(), "application/json".to_owned());
            request = request.with_body(Bytes::from(body));
        }
        Ok(request)
    }

    /// Decides what follows a failed attempt: `Ok(delay)` to try again,
    /// `Err` with the error to surface.
    fn after_failure(
        &self,
        call: &PreparedCall,
        retry: u32,
        error: ApiError,
    ) -> Result<Duration, ApiError> {
        match self.retry.decide(retry, &error) {
            RetryDecision::Retry(delay) => {
                debug!(
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying"
                );
                metrics::record_retry(&call.endpoint);
                Ok(delay)
            }
            RetryDecision::GiveUp if error.is_retryable() => {
                let attempts = retry + 1;
                warn!(attempts, error = %error, "retries exhausted");
                Err(ApiError::RetriesExhausted {
                    attempts,
                    source: Box::new(error),
                })
            }
            RetryDecision::GiveUp => Err(error),
        }
    }

    /// `MiddlewareResponse`, `CacheStore` and `MetricsRecord`.
    fn finish(
        &self,
        call: PreparedCall,
        elapsed: Duration,
        retries: u32,
        outcome: Result<(u16, Value), ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        let result = outcome.and_then(|(status, payload)| {
            debug!(state = %CallState::MiddlewareResponse);
            let payload = self.middleware.apply_response(payload)?;
            Ok((status, payload))
        });

        debug!(state = %CallState::MetricsRecord);
        match result {
            Ok((status, payload)) => {
                if let Some(key) = call.key.clone() {
                    debug!(state = %CallState::CacheStore, %key);
                    self.cache.put(key, payload.clone(), self.cache.default_ttl());
                }
                self.record(
                    CallRecord::success(&call.endpoint, call.method(), elapsed, status)
                        .with_retries(retries),
                );
                Ok(ApiResponse {
                    status,
                    payload,
                    cached: false,
                })
            }
            Err(error) => {
                self.record(
                    CallRecord::error(&call.endpoint, call.method(), elapsed, &error)
                        .with_retries(retries),
                );
                Err(error)
            }
        }
    }

    fn record(&self, record: CallRecord) {
        metrics::record_call(&record);
        self.metrics.record(record);
    }
}

/// Turns a transport result into a payload or a classified error.
///
/// A 2xx body that is not JSON is a non-retryable decode error; an empty
/// 2xx body is `null`.
fn classify(result: Result<TransportResponse, TransportError>) -> Result<(u16, Value), ApiError> {
    let response = result?;
    let status = response.status.as_u16();
    if !response.is_success() {
        return Err(ApiError::from_status(status, response.retry_after()));
    }
    if response.body.is_empty() {
        return Ok((status, Value::Null));
    }
    serde_json::from_slice(&response.body)
        .map(|payload| (status, payload))
        .map_err(|err| ApiError::Decode(err.to_string()))
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}
