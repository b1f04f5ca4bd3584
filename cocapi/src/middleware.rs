//! Request and response middleware.
//!
//! Middleware are values implementing [`RequestMiddleware`] or
//! [`ResponseMiddleware`], registered on a client in order. Request stages
//! run on every cache miss before the transport is called; response stages
//! run on every successful, decoded payload before it is cached. Cache hits
//! bypass both.
//!
//! A stage that returns an error aborts the call; later stages do not run.
//!
//! ```
//! use cocapi::middleware::{MiddlewarePipeline, UserAgent, request_fn};
//!
//! let mut pipeline = MiddlewarePipeline::default();
//! pipeline.add_request(UserAgent::new("my-bot/1.0"));
//! pipeline.add_request(request_fn("limit", |mut ctx| {
//!     ctx.params.entry("limit".into()).or_insert_with(|| "10".into());
//!     Ok(ctx)
//! }));
//!
//! assert_eq!(pipeline.info().request_names, ["user_agent", "limit"]);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use cocapi_core::RequestContext;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;

/// Failure reported by a middleware stage.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct MiddlewareError {
    message: String,
}

impl MiddlewareError {
    /// Creates an error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Transforms the outgoing request.
pub trait RequestMiddleware: Send + Sync {
    /// Name used in diagnostics and errors.
    fn name(&self) -> Cow<'_, str>;

    /// Returns the context the next stage receives.
    fn apply(&self, context: RequestContext) -> Result<RequestContext, MiddlewareError>;
}

/// Transforms a successful response payload.
pub trait ResponseMiddleware: Send + Sync {
    /// Name used in diagnostics and errors.
    fn name(&self) -> Cow<'_, str>;

    /// Returns the payload the next stage receives.
    fn apply(&self, response: Value) -> Result<Value, MiddlewareError>;
}

/// Request middleware built from a closure. See [`request_fn`].
pub struct RequestFn<F> {
    name: String,
    f: F,
}

/// Wraps a closure as a named [`RequestMiddleware`].
pub fn request_fn<F>(name: impl Into<String>, f: F) -> RequestFn<F>
where
    F: Fn(RequestContext) -> Result<RequestContext, MiddlewareError> + Send + Sync,
{
    RequestFn {
        name: name.into(),
        f,
    }
}

impl<F> RequestMiddleware for RequestFn<F>
where
    F: Fn(RequestContext) -> Result<RequestContext, MiddlewareError> + Send + Sync,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn apply(&self, context: RequestContext) -> Result<RequestContext, MiddlewareError> {
        (self.f)(context)
    }
}

/// Response middleware built from a closure. See [`response_fn`].
pub struct ResponseFn<F> {
    name: String,
    f: F,
}

/// Wraps a closure as a named [`ResponseMiddleware`].
pub fn response_fn<F>(name: impl Into<String>, f: F) -> ResponseFn<F>
where
    F: Fn(Value) -> Result<Value, MiddlewareError> + Send + Sync,
{
    ResponseFn {
        name: name.into(),
        f,
    }
}

impl<F> ResponseMiddleware for ResponseFn<F>
where
    F: Fn(Value) -> Result<Value, MiddlewareError> + Send + Sync,
{
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn apply(&self, response: Value) -> Result<Value, MiddlewareError> {
        (self.f)(response)
    }
}

/// Registered stages and their names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiddlewareInfo {
    /// Number of request stages.
    pub request_count: usize,
    /// Number of response stages.
    pub response_count: usize,
    /// Request stage names in execution order.
    pub request_names: Vec<String>,
    /// Response stage names in execution order.
    pub response_names: Vec<String>,
}

/// Ordered request and response stages.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    request: Vec<Arc<dyn RequestMiddleware>>,
    response: Vec<Arc<dyn ResponseMiddleware>>,
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        f.debug_struct("MiddlewarePipeline")
            .field("request", &info.request_names)
            .field("response", &info.response_names)
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Appends a request stage.
    pub fn add_request<M>(&mut self, middleware: M)
    where
        M: RequestMiddleware + 'static,
    {
        self.request.push(Arc::new(middleware));
    }

    /// Appends a response stage.
    pub fn add_response<M>(&mut self, middleware: M)
    where
        M: ResponseMiddleware + 'static,
    {
        self.response.push(Arc::new(middleware));
    }

    /// Removes all request stages.
    pub fn clear_request(&mut self) {
        self.request.clear();
    }

    /// Removes all response stages.
    pub fn clear_response(&mut self) {
        self.response.clear();
    }

    /// Removes every stage.
    pub fn clear_all(&mut self) {
        self.clear_request();
        self.clear_response();
    }

    /// Whether no stage is registered.
    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.response.is_empty()
    }

    /// Counts and names of the registered stages.
    pub fn info(&self) -> MiddlewareInfo {
        MiddlewareInfo {
            request_count: self.request.len(),
            response_count: self.response.len(),
            request_names: self.request.iter().map(|m| m.name().into_owned()).collect(),
            response_names: self.response.iter().map(|m| m.name().into_owned()).collect(),
        }
    }

    /// Runs the request stages in order.
    pub fn apply_request(&self, mut context: RequestContext) -> Result<RequestContext, ApiError> {
        for stage in &self.request {
            context = stage.apply(context).map_err(|source| {
                warn!(stage = %stage.name(), error = %source, "request middleware failed");
                ApiError::Middleware {
                    stage: stage.name().into_owned(),
                    source,
                }
            })?;
        }
        Ok(context)
    }

    /// Runs the response stages in order.
    pub fn apply_response(&self, mut response: Value) -> Result<Value, ApiError> {
        for stage in &self.response {
            response = stage.apply(response).map_err(|source| {
                warn!(stage = %stage.name(), error = %source, "response middleware failed");
                ApiError::Middleware {
                    stage: stage.name().into_owned(),
                    source,
                }
            })?;
        }
        Ok(response)
    }
}

/// Sets the `User-Agent` header.
#[derive(Debug, Clone)]
pub struct UserAgent {
    user_agent: String,
}

impl UserAgent {
    /// Creates the stage with the given header value.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl RequestMiddleware for UserAgent {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("user_agent")
    }

    fn apply(&self, mut context: RequestContext) -> Result<RequestContext, MiddlewareError> {
        context.set_header("user-agent", self.user_agent.clone());
        Ok(context)
    }
}

/// Adds a random `X-Request-ID` header to every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestId;

impl RequestMiddleware for RequestId {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("request_id")
    }

    fn apply(&self, mut context: RequestContext) -> Result<RequestContext, MiddlewareError> {
        context.set_header("x-request-id", Uuid::new_v4().to_string());
        Ok(context)
    }
}

/// Logs the outgoing request at debug level. The authorization header is
/// redacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugLogging;

impl RequestMiddleware for DebugLogging {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("debug_logging")
    }

    fn apply(&self, context: RequestContext) -> Result<RequestContext, MiddlewareError> {
        let headers: Vec<_> = context
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    format!("{name}: <redacted>")
                } else {
                    format!("{name}: {value}")
                }
            })
            .collect();
        debug!(
            method = %context.method,
            url = %context.url,
            headers = ?headers,
            params = ?context.params,
            "api request"
        );
        Ok(context)
    }
}

/// Adds `_processed_at` (Unix seconds, fractional) to object payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseTimestamp;

impl ResponseMiddleware for ResponseTimestamp {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("response_timestamp")
    }

    fn apply(&self, mut response: Value) -> Result<Value, MiddlewareError> {
        if let Value::Object(map) = &mut response {
            let now = Utc::now();
            let secs = now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6;
            map.insert("_processed_at".into(), Value::from(secs));
        }
        Ok(response)
    }
}

/// Adds `_response_size_bytes` (serialized length) to object payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseSize;

impl ResponseMiddleware for ResponseSize {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed("response_size")
    }

    fn apply(&self, mut response: Value) -> Result<Value, MiddlewareError> {
        let size = serde_json::to_vec(&response)
            .map_err(|err| MiddlewareError::new(err.to_string()))?
            .len();
        if let Value::Object(map) = &mut response {
            map.insert("_response_size_bytes".into(), Value::from(size));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn context() -> RequestContext {
        RequestContext::get("https://api.example.com/v1/clans")
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = MiddlewarePipeline::default();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.apply_request(context()).unwrap(), context());
        assert_eq!(pipeline.apply_response(json!({"a": 1})).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn request_stages_run_in_registration_order() {
        let mut pipeline = MiddlewarePipeline::default();
        pipeline.add_request(request_fn("a", |mut ctx| {
            ctx.set_header("x-trace", "a");
            Ok(ctx)
        }));
        pipeline.add_request(request_fn("b", |mut ctx| {
            let seen = ctx.header("x-trace").unwrap_or_default().to_owned();
            ctx.set_header("x-trace", format!("{seen}b"));
            Ok(ctx)
        }));

        let result = pipeline.apply_request(context()).unwrap();
        assert_eq!(result.header("x-trace"), Some("ab"));
    }

    #[test]
    fn failing_stage_aborts_with_its_name() {
        let mut pipeline = MiddlewarePipeline::default();
        pipeline.add_response(response_fn("reject", |_| Err(MiddlewareError::new("nope"))));
        pipeline.add_response(response_fn("never", |_| panic!("must not run")));

        let err = pipeline.apply_response(json!({})).unwrap_err();
        match err {
            ApiError::Middleware { stage, source } => {
                assert_eq!(stage, "reject");
                assert_eq!(source.to_string(), "nope");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn builtin_request_stages() {
        let mut pipeline = MiddlewarePipeline::default();
        pipeline.add_request(UserAgent::new("bot/2"));
        pipeline.add_request(RequestId);
        pipeline.add_request(DebugLogging);

        let ctx = pipeline.apply_request(context()).unwrap();
        assert_eq!(ctx.header("User-Agent"), Some("bot/2"));
        let id = ctx.header("x-request-id").unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }

    #[test]
    fn builtin_response_stages_only_touch_objects() {
        let mut pipeline = MiddlewarePipeline::default();
        pipeline.add_response(ResponseTimestamp);
        pipeline.add_response(ResponseSize);

        let out = pipeline.apply_response(json!({"name": "X"})).unwrap();
        assert!(out["_processed_at"].as_f64().unwrap() > 0.0);
        assert!(out["_response_size_bytes"].as_u64().unwrap() > 0);

        let out = pipeline.apply_response(json!([1, 2])).unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn info_and_clear() {
        let mut pipeline = MiddlewarePipeline::default();
        pipeline.add_request(RequestId);
        pipeline.add_response(ResponseSize);
        assert_eq!(
            pipeline.info(),
            MiddlewareInfo {
                request_count: 1,
                response_count: 1,
                request_names: vec!["request_id".into()],
                response_names: vec!["response_size".into()],
            }
        );

        pipeline.clear_request();
        assert_eq!(pipeline.info().request_count, 0);
        assert_eq!(pipeline.info().response_count, 1);
        pipeline.clear_all();
        assert!(pipeline.is_empty());
    }
}
