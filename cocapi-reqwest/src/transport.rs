use async_trait::async_trait;
use cocapi_core::{Transport, TransportError, TransportRequest, TransportResponse};
use tracing::debug;

use crate::convert::{collect_headers, map_error, request_url};

/// Asynchronous transport over a [`reqwest::Client`].
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a default client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over a preconfigured client (proxies, TLS roots, pool sizes).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request_url(&request)?;
        let timeout = request.timeout;
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self.client.request(request.method, url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| map_error(e, timeout))?;
        let status = response.status();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| map_error(e, timeout))?;
        debug!(status = status.as_u16(), bytes = body.len(), "received response");

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
