use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use cocapi_core::{BlockingTransport, Params};

use super::{ApiMethods, ClientBuilder, NotSet, dynamic_record, impl_client_management, probe, shape};
use crate::config::ApiConfig;
use crate::endpoints::{self, ApiRequest};
use crate::error::ApiError;
use crate::executor::{ApiResponse, Executor};
use crate::schema::{self, DynamicRecord};

/// Blocking client: every call runs on the caller's thread.
///
/// Calls are cached, retried and recorded like asynchronous ones, but never
/// wait for the rate limiter.
pub struct CocApi {
    executor: Executor,
    transport: Arc<dyn BlockingTransport>,
    config: ApiConfig,
}

impl std::fmt::Debug for CocApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CocApi")
            .field("executor", &self.executor)
            .field("transport", &"...")
            .finish()
    }
}

impl CocApi {
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
        Self::from_parts(token, cocapi_reqwest::BlockingReqwestTransport::new(), config)
    }

    /// Client configured only with a timeout and the structured status flag.
    #[cfg(feature = "reqwest")]
    pub fn with_options(token: &str, timeout_secs: u64, status_code: bool) -> Result<Self, ApiError> {
        let config = ApiConfig {
            timeout: std::time::Duration::from_secs(timeout_secs),
            status_code,
            ..ApiConfig::default()
        };
        Self::with_config(token, config)
    }

    pub(super) fn from_parts<T>(token: &str, transport: T, config: ApiConfig) -> Result<Self, ApiError>
    where
        T: BlockingTransport + 'static,
    {
        Ok(Self {
            executor: Executor::new(token, &config)?,
            transport: Arc::new(transport),
            config,
        })
    }

    fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.executor.execute_blocking(self.transport.as_ref(), request)
    }

    /// Calls a path without a dedicated wrapper.
    ///
    /// The path must start with `/`; it is rejected before any network
    /// activity otherwise.
    pub fn custom_endpoint(&self, path: &str, params: Option<Params>) -> Result<Value, ApiError> {
        let result = endpoints::custom(path, params).and_then(|request| self.execute(request));
        shape(self.config.status_code, result)
    }

    /// Calls a path and validates the payload into a dynamic record.
    pub fn custom_endpoint_model(
        &self,
        path: &str,
        params: Option<Params>,
    ) -> Result<DynamicRecord, ApiError> {
        let response = self.execute(endpoints::custom(path, params)?)?;
        dynamic_record(path, &response.payload)
    }

    /// Runs a request and deserializes the payload into `T`.
    pub fn call_model<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request)?;
        Ok(schema::decode(response.payload)?)
    }

    /// Checks connectivity and credentials by listing locations.
    pub fn test(&self) -> bool {
        self.execute(probe()).is_ok()
    }
}

impl_client_management!(CocApi);

impl ApiMethods for CocApi {
    type Output<'a> = Result<Value, ApiError>;

    fn call(&self, request: ApiRequest) -> Self::Output<'_> {
        shape(self.config.status_code, self.execute(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cocapi_core::{TransportError, TransportRequest, TransportResponse};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    struct Fixed(&'static str);

    impl BlockingTransport for Fixed {
        fn send(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::new(200, self.0))
        }
    }

    fn client(body: &'static str, config: ApiConfig) -> CocApi {
        CocApi::builder()
            .token("t")
            .transport(Fixed(body))
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn wrappers_return_payload() {
        let api = client(r##"{"tag":"#2PP"}"##, ApiConfig::default());
        assert_eq!(api.clan_tag("#2PP", None).unwrap(), json!({"tag": "#2PP"}));
    }

    #[test]
    fn call_model_decodes() {
        #[derive(Deserialize)]
        struct Clan {
            tag: String,
        }
        let api = client(r##"{"tag":"#2PP"}"##, ApiConfig::default());
        let clan: Clan = api.call_model(endpoints::clan_tag("#2PP", None)).unwrap();
        assert_eq!(clan.tag, "#2PP");
    }

    #[test]
    fn custom_endpoint_model_builds_record() {
        let api = client(r#"{"name":"x","members":3}"#, ApiConfig::default());
        let record = api.custom_endpoint_model("/clans/%23ABC", None).unwrap();
        assert_eq!(record.model_name(), "ClansModel");
        assert_eq!(record.get("members"), Some(&json!(3)));

        let list = client("[1,2]", ApiConfig::default());
        let err = list.custom_endpoint_model("/labels/clans", None).unwrap_err();
        assert!(matches!(err, ApiError::Schema(_)));
    }

    #[test]
    fn set_and_reset_base_url() {
        let mut api = client("{}", ApiConfig::default());
        assert!(api.set_base_url("http://localhost:9000/v1", false).is_err());
        api.set_base_url("http://localhost:9000/v1", true).unwrap();
        assert_eq!(api.base_url(), "http://localhost:9000/v1");
        assert_eq!(api.config().base_url, "http://localhost:9000/v1");
        api.reset_base_url();
        assert_eq!(api.base_url(), crate::config::DEFAULT_BASE_URL);
    }
}
