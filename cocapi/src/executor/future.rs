use tokio::time::Instant;
use tracing::{Instrument, debug, info_span};

use cocapi_core::{Transport, TransportError};

use super::{ApiResponse, CallState, Executor, PreparedCall, classify};
use crate::endpoints::ApiRequest;
use crate::error::ApiError;
use crate::metrics;

impl Executor {
    /// Runs one call asynchronously.
    ///
    /// On a cache miss the call first waits for a rate limiter token. Every
    /// attempt is bounded by the configured timeout. Dropping the returned
    /// future cancels the call; a cancelled call writes nothing to the cache.
    pub async fn execute<T>(&self, transport: &T, request: ApiRequest) -> Result<ApiResponse, ApiError>
    where
        T: Transport + ?Sized,
    {
        let call = self.prepare(request);
        let span = info_span!("cocapi.call", endpoint = %call.endpoint, method = call.method());
        self.run(transport, call).instrument(span).await
    }

    async fn run<T>(&self, transport: &T, call: PreparedCall) -> Result<ApiResponse, ApiError>
    where
        T: Transport + ?Sized,
    {
        let started = Instant::now();
        if let Some(hit) = self.lookup(&call, started.elapsed()) {
            return Ok(hit);
        }

        if self.limiter.is_enabled() {
            debug!(state = %CallState::RateLimitWait);
            let waited = self.limiter.acquire().await;
            if !waited.is_zero() {
                metrics::record_rate_limit_wait(waited);
            }
        }

        let mut retries = 0;
        let outcome = match self.transport_request(&call) {
            Ok(request) => loop {
                debug!(state = %CallState::TransportAttempt, attempt = retries + 1);
                let attempt = tokio::time::timeout(self.timeout, transport.send(request.clone()))
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Timeout(self.timeout)));
                match classify(attempt) {
                    Ok(response) => break Ok(response),
                    Err(error) => match self.after_failure(&call, retries, error) {
                        Ok(delay) => {
                            tokio::time::sleep(delay).await;
                            retries += 1;
                        }
                        Err(error) => break Err(error),
                    },
                }
            },
            Err(error) => Err(error),
        };

        self.finish(call, started.elapsed(), retries, outcome)
    }
}
