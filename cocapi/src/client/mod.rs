//! Blocking and asynchronous API clients.
//!
//! [`CocApi`] runs calls on the caller's thread; [`AsyncCocApi`] returns
//! futures and adds rate limiting. Both expose the named endpoints through
//! the [`ApiMethods`] trait and share the same management surface (cache,
//! metrics, middleware and base URL).
//!
//! Clients are built either through the convenience constructors (with the
//! default `reqwest` feature) or through [`ClientBuilder`], which accepts any
//! transport:
//!
//! ```
//! use cocapi::{ApiConfig, CocApi};
//! use cocapi_core::{BlockingTransport, TransportError, TransportRequest, TransportResponse};
//!
//! struct Offline;
//!
//! impl BlockingTransport for Offline {
//!     fn send(&self, _: TransportRequest) -> Result<TransportResponse, TransportError> {
//!         Ok(TransportResponse::new(200, r#"{"items":[]}"#))
//!     }
//! }
//!
//! let api = CocApi::builder()
//!     .token("token")
//!     .transport(Offline)
//!     .config(ApiConfig::default())
//!     .build()
//!     .unwrap();
//! assert!(api.test());
//! ```

mod async_client;
mod blocking;

use serde_json::{Value, json};

use cocapi_core::{BlockingTransport, Params, Transport};

use crate::config::ApiConfig;
use crate::endpoints::{self, ApiRequest};
use crate::error::ApiError;
use crate::executor::ApiResponse;
use crate::schema::{DynamicRecord, Schema};

pub use async_client::AsyncCocApi;
pub use blocking::CocApi;

/// Endpoint wrappers shared by both clients.
///
/// `Output` is the result for [`CocApi`] and a boxed future of it for
/// [`AsyncCocApi`].
pub trait ApiMethods {
    /// What a call returns.
    type Output<'a>
    where
        Self: 'a;

    /// Runs a prepared request.
    fn call(&self, request: ApiRequest) -> Self::Output<'_>;

    /// Clan details.
    fn clan_tag(&self, tag: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::clan_tag(tag, params))
    }

    /// Members of a clan.
    fn clan_members(&self, tag: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::clan_members(tag, params))
    }

    /// Current war of a clan.
    fn clan_current_war(&self, tag: &str) -> Self::Output<'_> {
        self.call(endpoints::clan_current_war(tag))
    }

    /// War log of a clan.
    fn clan_war_log(&self, tag: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::clan_war_log(tag, params))
    }

    /// Clan war league group of a clan.
    fn clan_leaguegroup(&self, tag: &str) -> Self::Output<'_> {
        self.call(endpoints::clan_leaguegroup(tag))
    }

    /// Capital raid seasons of a clan.
    fn clan_capitalraidseasons(&self, tag: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::clan_capitalraidseasons(tag, params))
    }

    /// Player details.
    fn players(&self, tag: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::players(tag, params))
    }

    /// Clan search by name.
    fn clan(&self, name: &str, limit: u32, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::clan(name, limit, params))
    }

    /// A clan war league war.
    fn warleague(&self, war_tag: &str) -> Self::Output<'_> {
        self.call(endpoints::warleague(war_tag))
    }

    /// All locations.
    fn location(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::location(params))
    }

    /// One location.
    fn location_id(&self, location_id: &str) -> Self::Output<'_> {
        self.call(endpoints::location_id(location_id))
    }

    /// Clan rankings of a location.
    fn location_id_clan_rank(&self, location_id: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::location_id_clan_rank(location_id, params))
    }

    /// Player rankings of a location.
    fn location_id_player_rank(
        &self,
        location_id: &str,
        params: Option<Params>,
    ) -> Self::Output<'_> {
        self.call(endpoints::location_id_player_rank(location_id, params))
    }

    /// Clan versus rankings of a location.
    fn location_clan_versus(&self, location_id: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::location_clan_versus(location_id, params))
    }

    /// Player versus rankings of a location.
    fn location_player_versus(
        &self,
        location_id: &str,
        params: Option<Params>,
    ) -> Self::Output<'_> {
        self.call(endpoints::location_player_versus(location_id, params))
    }

    /// Builder base clan rankings of a location.
    fn location_clans_builder_base(
        &self,
        location_id: &str,
        params: Option<Params>,
    ) -> Self::Output<'_> {
        self.call(endpoints::location_clans_builder_base(location_id, params))
    }

    /// Builder base player rankings of a location.
    fn location_players_builder_base(
        &self,
        location_id: &str,
        params: Option<Params>,
    ) -> Self::Output<'_> {
        self.call(endpoints::location_players_builder_base(location_id, params))
    }

    /// All leagues.
    fn league(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::league(params))
    }

    /// One league.
    fn league_id(&self, league_id: &str) -> Self::Output<'_> {
        self.call(endpoints::league_id(league_id))
    }

    /// Seasons of a league.
    fn league_season(&self, league_id: &str, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::league_season(league_id, params))
    }

    /// Rankings of one league season.
    fn league_season_id(
        &self,
        league_id: &str,
        season_id: &str,
        params: Option<Params>,
    ) -> Self::Output<'_> {
        self.call(endpoints::league_season_id(league_id, season_id, params))
    }

    /// All war leagues.
    fn warleagues(&self) -> Self::Output<'_> {
        self.call(endpoints::warleagues())
    }

    /// One war league.
    fn warleagues_id(&self, league_id: &str) -> Self::Output<'_> {
        self.call(endpoints::warleagues_id(league_id))
    }

    /// Clan labels.
    fn labels_clans(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::labels_clans(params))
    }

    /// Player labels.
    fn labels_players(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::labels_players(params))
    }

    /// All capital leagues.
    fn capitalleagues(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::capitalleagues(params))
    }

    /// One capital league.
    fn capitalleagues_id(&self, league_id: &str) -> Self::Output<'_> {
        self.call(endpoints::capitalleagues_id(league_id))
    }

    /// All builder base leagues.
    fn builderbaseleagues(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::builderbaseleagues(params))
    }

    /// One builder base league.
    fn builderbaseleagues_id(&self, league_id: &str) -> Self::Output<'_> {
        self.call(endpoints::builderbaseleagues_id(league_id))
    }

    /// Current gold pass season.
    fn goldpass(&self, params: Option<Params>) -> Self::Output<'_> {
        self.call(endpoints::goldpass(params))
    }
}

/// Marker type for unset builder fields.
///
/// When you see `NotSet` in a compiler error, the corresponding builder
/// method has not been called yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotSet;

/// Bearer token set on a [`ClientBuilder`].
#[derive(Clone)]
pub struct Token(String);

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(..)")
    }
}

/// Builder for [`CocApi`] and [`AsyncCocApi`].
///
/// Use [`CocApi::builder`] or [`AsyncCocApi::builder`] to create one.
#[derive(Debug)]
pub struct ClientBuilder<Tok, Tr> {
    token: Tok,
    transport: Tr,
    config: ApiConfig,
}

impl ClientBuilder<NotSet, NotSet> {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            token: NotSet,
            transport: NotSet,
            config: ApiConfig::default(),
        }
    }
}

impl Default for ClientBuilder<NotSet, NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tok, Tr> ClientBuilder<Tok, Tr> {
    /// Sets the API token.
    pub fn token(self, token: impl Into<String>) -> ClientBuilder<Token, Tr> {
        ClientBuilder {
            token: Token(token.into()),
            transport: self.transport,
            config: self.config,
        }
    }

    /// Sets the transport calls go through.
    pub fn transport<NewTr>(self, transport: NewTr) -> ClientBuilder<Tok, NewTr> {
        ClientBuilder {
            token: self.token,
            transport,
            config: self.config,
        }
    }

    /// Replaces the configuration.
    pub fn config(self, config: ApiConfig) -> Self {
        Self { config, ..self }
    }
}

impl<Tr> ClientBuilder<Token, Tr>
where
    Tr: BlockingTransport + 'static,
{
    /// Builds a blocking client.
    pub fn build(self) -> Result<CocApi, ApiError> {
        CocApi::from_parts(&self.token.0, self.transport, self.config)
    }
}

impl<Tr> ClientBuilder<Token, Tr>
where
    Tr: Transport + 'static,
{
    /// Builds an asynchronous client.
    pub fn build_async(self) -> Result<AsyncCocApi, ApiError> {
        AsyncCocApi::from_parts(&self.token.0, self.transport, self.config)
    }
}

/// Shapes a call result for the caller.
///
/// With structured status every outcome is `Ok`: objects gain a
/// `status_code` field, other payloads are wrapped as `{"data", "status_code"}`
/// and errors become `{"result": "error", "message", "error_type", "status_code"}`
/// with `0` when no response was received.
pub(crate) fn shape(
    status_code: bool,
    result: Result<ApiResponse, ApiError>,
) -> Result<Value, ApiError> {
    if !status_code {
        return result.map(|response| response.payload);
    }
    let value = match result {
        Ok(ApiResponse {
            status,
            payload: Value::Object(mut map),
            ..
        }) => {
            map.insert("status_code".to_owned(), json!(status));
            Value::Object(map)
        }
        Ok(ApiResponse {
            status, payload, ..
        }) => json!({ "data": payload, "status_code": status }),
        Err(error) => {
            let mut value = error.to_value();
            if let Value::Object(map) = &mut value {
                map.insert("status_code".to_owned(), json!(error.status().unwrap_or(0)));
            }
            value
        }
    };
    Ok(value)
}

/// Rejects a base URL change away from the official API unless acknowledged.
pub(crate) fn check_base_url_change(url: &str, acknowledge_risk: bool) -> Result<(), ApiError> {
    if url.trim_end_matches('/') != crate::config::DEFAULT_BASE_URL && !acknowledge_risk {
        return Err(ApiError::InvalidConfiguration(format!(
            "refusing to change the base URL to {url:?} without acknowledge_risk"
        )));
    }
    Ok(())
}

/// Management methods shared by both clients.
macro_rules! impl_client_management {
    ($client:ty) => {
        impl $client {
            /// Configuration the client was built with, base URL kept current.
            pub fn config(&self) -> &$crate::config::ApiConfig {
                &self.config
            }

            /// Base URL calls are sent to.
            pub fn base_url(&self) -> &str {
                self.executor.base_url()
            }

            /// Points later calls at another API host.
            ///
            /// Any URL other than the official one is refused unless
            /// `acknowledge_risk` is set.
            pub fn set_base_url(
                &mut self,
                url: &str,
                acknowledge_risk: bool,
            ) -> Result<(), $crate::error::ApiError> {
                $crate::client::check_base_url_change(url, acknowledge_risk)?;
                let previous = self.executor.base_url().to_owned();
                self.executor.set_base_url(url)?;
                self.config.base_url = self.executor.base_url().to_owned();
                ::tracing::info!(from = %previous, to = %self.config.base_url, "base URL changed");
                Ok(())
            }

            /// Restores the official base URL.
            pub fn reset_base_url(&mut self) {
                if let Err(error) = self.set_base_url($crate::config::DEFAULT_BASE_URL, true) {
                    ::tracing::warn!(%error, "failed to reset base URL");
                }
            }

            /// Response cache.
            pub fn cache(&self) -> &$crate::cache::CacheStore {
                self.executor.cache()
            }

            /// Cache statistics.
            pub fn cache_stats(&self) -> $crate::cache::CacheStats {
                self.executor.cache().stats()
            }

            /// Drops every cached response, returning how many were removed.
            pub fn clear_cache(&self) -> usize {
                self.executor.cache().clear()
            }

            /// Metrics window.
            pub fn metrics(&self) -> &$crate::metrics::MetricsRecorder {
                self.executor.metrics()
            }

            /// Aggregates over the metrics window.
            pub fn metrics_summary(&self) -> $crate::metrics::MetricsSummary {
                self.executor.metrics().summary()
            }

            /// Empties the metrics window.
            pub fn clear_metrics(&self) {
                self.executor.metrics().clear()
            }

            /// Registers a request stage after the existing ones.
            pub fn add_request_middleware<M>(&mut self, middleware: M)
            where
                M: $crate::middleware::RequestMiddleware + 'static,
            {
                self.executor.middleware_mut().add_request(middleware);
            }

            /// Registers a response stage after the existing ones.
            pub fn add_response_middleware<M>(&mut self, middleware: M)
            where
                M: $crate::middleware::ResponseMiddleware + 'static,
            {
                self.executor.middleware_mut().add_response(middleware);
            }

            /// Removes every middleware stage.
            pub fn clear_middleware(&mut self) {
                self.executor.middleware_mut().clear_all();
            }

            /// Counts and names of the registered stages.
            pub fn middleware_info(&self) -> $crate::middleware::MiddlewareInfo {
                self.executor.middleware().info()
            }

            /// Rate limiter state, `None` when rate limiting is disabled.
            pub fn rate_limit_snapshot(&self) -> Option<$crate::rate_limit::RateLimitSnapshot> {
                self.executor.limiter().snapshot()
            }
        }
    };
}

pub(crate) use impl_client_management;

fn probe() -> ApiRequest {
    endpoints::location(None)
}

fn dynamic_record(path: &str, payload: &Value) -> Result<DynamicRecord, ApiError> {
    let schema = Schema::infer(path, payload)?;
    Ok(schema.validate(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(status: u16, payload: Value) -> Result<ApiResponse, ApiError> {
        Ok(ApiResponse {
            status,
            payload,
            cached: false,
        })
    }

    #[test]
    fn plain_shape_passes_through() {
        assert_eq!(shape(false, response(200, json!([1]))).unwrap(), json!([1]));
        assert!(shape(false, Err(ApiError::Client { status: 404 })).is_err());
    }

    #[test]
    fn structured_status_shapes() {
        assert_eq!(
            shape(true, response(200, json!({"name": "x"}))).unwrap(),
            json!({"name": "x", "status_code": 200})
        );
        assert_eq!(
            shape(true, response(200, json!([1, 2]))).unwrap(),
            json!({"data": [1, 2], "status_code": 200})
        );
        assert_eq!(
            shape(true, Err(ApiError::Client { status: 404 })).unwrap(),
            json!({
                "result": "error",
                "message": "not found (404) - check clan/player tag",
                "error_type": "client",
                "status_code": 404,
            })
        );
        let network = shape(
            true,
            Err(ApiError::Network {
                message: "refused".into(),
            }),
        )
        .unwrap();
        assert_eq!(network["status_code"], json!(0));
        assert_eq!(network["error_type"], json!("network"));
    }

    #[test]
    fn base_url_change_needs_acknowledgement() {
        assert!(check_base_url_change("http://localhost:1234", false).is_err());
        assert!(check_base_url_change("http://localhost:1234", true).is_ok());
        assert!(check_base_url_change(crate::config::DEFAULT_BASE_URL, false).is_ok());
    }
}
