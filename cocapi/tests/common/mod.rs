//! Scripted transports shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cocapi::{ApiConfig, AsyncCocApi, CocApi};
use cocapi_core::{
    BlockingTransport, BoxError, Transport, TransportError, TransportRequest, TransportResponse,
};
use parking_lot::Mutex;

/// One scripted transport outcome.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(u16, &'static str),
    RetryAfter(u16, &'static str),
    Timeout,
    Refused,
    Malformed,
}

impl Step {
    fn run(&self, timeout: Duration) -> Result<TransportResponse, TransportError> {
        match self {
            Step::Respond(status, body) => Ok(TransportResponse::new(*status, *body)),
            Step::RetryAfter(status, seconds) => {
                Ok(TransportResponse::new(*status, "").with_header("retry-after", *seconds))
            }
            Step::Timeout => Err(TransportError::Timeout(timeout)),
            Step::Refused => Err(TransportError::Connect(BoxError::from("connection refused"))),
            Step::Malformed => Err(TransportError::Request(BoxError::from(
                "builder error: relative URL without a base",
            ))),
        }
    }
}

/// Plays back steps in order, repeating the last one once exhausted, and
/// records every request it receives.
#[derive(Debug, Default)]
pub struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl Scripted {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn ok(body: &'static str) -> Arc<Self> {
        Self::new([Step::Respond(200, body)])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    fn next(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let timeout = request.timeout;
        self.requests.lock().push(request);
        let step = match self.steps.lock().pop_front() {
            Some(step) => {
                *self.last.lock() = Some(step.clone());
                step
            }
            None => self
                .last
                .lock()
                .clone()
                .unwrap_or(Step::Respond(200, "{}")),
        };
        step.run(timeout)
    }
}

#[async_trait]
impl Transport for Scripted {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.next(request)
    }
}

impl BlockingTransport for Scripted {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.next(request)
    }
}

/// Never answers; counts attempts.
#[derive(Debug, Default)]
pub struct Hanging {
    attempts: Mutex<usize>,
}

impl Hanging {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

#[async_trait]
impl Transport for Hanging {
    async fn send(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
        *self.attempts.lock() += 1;
        std::future::pending().await
    }
}

/// Sends client logs to the test harness output; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Configuration with fast, deterministic retries and metrics enabled.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        retry_delay: Duration::from_millis(1),
        retry_jitter: false,
        enable_metrics: true,
        ..ApiConfig::default()
    }
}

pub fn blocking_client(transport: Arc<Scripted>, config: ApiConfig) -> CocApi {
    init_tracing();
    CocApi::builder()
        .token("test-token")
        .transport(transport)
        .config(config)
        .build()
        .expect("valid client")
}

pub fn async_client<T>(transport: Arc<T>, config: ApiConfig) -> AsyncCocApi
where
    T: Transport + 'static,
{
    init_tracing();
    AsyncCocApi::builder()
        .token("test-token")
        .transport(transport)
        .config(config)
        .build_async()
        .expect("valid client")
}
