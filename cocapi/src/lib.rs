#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// TTL response cache.
///
/// [`CacheStore`](cache::CacheStore) keeps JSON payloads keyed by
/// [`CacheKey`] with per-entry expiry, an optional capacity bound and
/// hit/miss/expiry/eviction counters.
pub mod cache;

/// Sync and async clients with the endpoint wrappers.
pub mod client;

/// Client configuration with defaults and YAML loading.
pub mod config;

/// Path builders for the named endpoints.
pub mod endpoints;

/// Error taxonomy shared by every client operation.
pub mod error;

/// Orchestration of a single call.
///
/// The [`Executor`](executor::Executor) coordinates cache, rate limiter,
/// middleware, transport with retries, and metrics for each call.
pub mod executor;

/// Sliding-window call metrics.
///
/// When the `metrics` feature is enabled, every call is also exported
/// through the `metrics` facade:
/// - request, cache hit, error and retry counters
/// - call duration and rate limiter wait histograms
pub mod metrics;

/// Request and response middleware.
pub mod middleware;

/// Async token-bucket rate limiter.
pub mod rate_limit;

/// Retry decisions and exponential backoff with jitter.
pub mod retry;

/// Structural records inferred from payloads.
pub mod schema;

mod rnd;

pub use cache::{CacheStats, CacheStore};
pub use client::{ApiMethods, AsyncCocApi, ClientBuilder, CocApi, NotSet};
pub use config::{ApiConfig, DEFAULT_BASE_URL};
pub use endpoints::ApiRequest;
pub use error::{ApiError, ErrorKind};
pub use executor::{ApiResponse, CallState, Executor};
pub use metrics::{CallRecord, MetricsRecorder, MetricsSummary};
pub use middleware::{MiddlewarePipeline, RequestMiddleware, ResponseMiddleware};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use schema::{DynamicRecord, Schema};

pub use cocapi_core::{CacheKey, Params};

/// The `cocapi` prelude.
///
/// ```rust
/// use cocapi::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{ApiConfig, ApiError, ApiMethods, AsyncCocApi, CocApi, Params};
}
