use cocapi_core::{BlockingTransport, TransportError, TransportRequest, TransportResponse};
use tracing::debug;

use crate::convert::{collect_headers, map_error, request_url};

/// Blocking transport over a [`reqwest::blocking::Client`].
///
/// The blocking client runs its own runtime internally; create and drop it
/// outside of any async context.
#[derive(Debug, Clone, Default)]
pub struct BlockingReqwestTransport {
    client: reqwest::blocking::Client,
}

impl BlockingReqwestTransport {
    /// Transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over a preconfigured client.
    pub fn from_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl BlockingTransport for BlockingReqwestTransport {
    fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request_url(&request)?;
        let timeout = request.timeout;
        debug!(method = %request.method, %url, "sending blocking request");

        let mut builder = self.client.request(request.method, url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().map_err(|e| map_error(e, timeout))?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let body = response.bytes().map_err(|e| map_error(e, timeout))?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
