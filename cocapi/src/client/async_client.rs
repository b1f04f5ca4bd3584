use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use cocapi_core::{Params, Transport};

use super::{ApiMethods, ClientBuilder, NotSet, dynamic_record, impl_client_management, probe, shape};
use crate::config::ApiConfig;
use crate::endpoints::{self, ApiRequest};
use crate::error::ApiError;
use crate::executor::{ApiResponse, Executor};
use crate::schema::{self, DynamicRecord};

/// Asynchronous client.
///
/// Calls made concurrently through one client share its cache, metrics
/// window and rate limiter. Dropping a call's future cancels it.
///
/// ```no_run
/// use cocapi::{ApiMethods, AsyncCocApi};
///
/// # async fn run() -> Result<(), cocapi::ApiError> {
/// let api = AsyncCocApi::new("token")?;
/// let (clan, player) = tokio::join!(
///     api.clan_tag("#2PP", None),
///     api.players("#9QY", None),
/// );
/// println!("{} {}", clan?["name"], player?["name"]);
/// # Ok(())
/// # }
/// ```
pub struct AsyncCocApi {
    executor: Executor,
    transport: Arc<dyn Transport>,
    config: ApiConfig,
}

impl std::fmt::Debug for AsyncCocApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCocApi")
            .field("executor", &self.executor)
            .field("transport", &"...")
            .finish()
    }
}

impl AsyncCocApi {
    /// Creates a [`ClientBuilder`].
    pub fn builder() -> ClientBuilder<NotSet, NotSet> {
        ClientBuilder::new()
    }

    /// Client with the default configuration over `reqwest`.
    #[cfg(feature = "reqwest")]
    pub fn new(token: &str) -> Result<Self, ApiError> {
        Self::with_config(token, ApiConfig::default())
    }

    /// Client with a custom configuration over `reqwest`.
    #[cfg(feature = "reqwest")]
    pub fn with_config(token: &str, config: ApiConfig) -> Result<Self, ApiError> {
        Self::from_parts(token, cocapi_reqwest::ReqwestTransport::new(), config)
    }

    pub(super) fn from_parts<T>(token: &str, transport: T, config: ApiConfig) -> Result<Self, ApiError>
    where
        T: Transport + 'static,
    {
        Ok(Self {
            executor: Executor::new(token, &config)?,
            transport: Arc::new(transport),
            config,
        })
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.executor.execute(self.transport.as_ref(), request).await
    }

    /// Calls a path without a dedicated wrapper.
    ///
    /// The path must start with `/`; it is rejected before any network
    /// activity otherwise.
    pub async fn custom_endpoint(
        &self,
        path: &str,
        params: Option<Params>,
    ) -> Result<Value, ApiError> {
        let result = match endpoints::custom(path, params) {
            Ok(request) => self.execute(request).await,
            Err(error) => Err(error),
        };
        shape(self.config.status_code, result)
    }

    /// Calls a path and validates the payload into a dynamic record.
    pub async fn custom_endpoint_model(
        &self,
        path: &str,
        params: Option<Params>,
    ) -> Result<DynamicRecord, ApiError> {
        let response = self.execute(endpoints::custom(path, params)?).await?;
        dynamic_record(path, &response.payload)
    }

    /// Runs a request and deserializes the payload into `T`.
    pub async fn call_model<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        Ok(schema::decode(response.payload)?)
    }

    /// Checks connectivity and credentials by listing locations.
    pub async fn test(&self) -> bool {
        self.execute(probe()).await.is_ok()
    }
}

impl_client_management!(AsyncCocApi);

impl ApiMethods for AsyncCocApi {
    type Output<'a> = BoxFuture<'a, Result<Value, ApiError>>;

    fn call(&self, request: ApiRequest) -> Self::Output<'_> {
        async move { shape(self.config.status_code, self.execute(request).await) }.boxed()
    }
}
