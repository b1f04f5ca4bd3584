use std::thread;
use std::time::Instant;

use tracing::{debug, info_span};

use cocapi_core::BlockingTransport;

use super::{ApiResponse, CallState, Executor, classify};
use crate::endpoints::ApiRequest;
use crate::error::ApiError;

impl Executor {
    /// Runs one call on the current thread.
    ///
    /// Retry delays block the thread. The rate limiter is never consulted
    /// on this path.
    pub fn execute_blocking<T>(
        &self,
        transport: &T,
        request: ApiRequest,
    ) -> Result<ApiResponse, ApiError>
    where
        T: BlockingTransport + ?Sized,
    {
        let call = self.prepare(request);
        let span = info_span!("cocapi.call", endpoint = %call.endpoint, method = call.method());
        let _enter = span.enter();
        let started = Instant::now();

        if let Some(hit) = self.lookup(&call, started.elapsed()) {
            return Ok(hit);
        }

        let mut retries = 0;
        let outcome = match self.transport_request(&call) {
            Ok(request) => loop {
                debug!(state = %CallState::TransportAttempt, attempt = retries + 1);
                match classify(transport.send(request.clone())) {
                    Ok(response) => break Ok(response),
                    Err(error) => match self.after_failure(&call, retries, error) {
                        Ok(delay) => {
                            thread::sleep(delay);
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
