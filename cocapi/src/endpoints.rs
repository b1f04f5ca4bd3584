//! Path builders for the named API endpoints.
//!
//! Every function is pure: it turns path parameters into an [`ApiRequest`]
//! and does nothing else. Clan, player and war tags may be given with or
//! without their leading `#`; they are sent as `%23<tag>`.

use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use cocapi_core::Params;

use crate::error::ApiError;

/// Characters left unescaped inside a path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A logical API call: method, path below the base URL and query parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path starting with `/`, relative to the base URL.
    pub path: String,
    /// Query parameters, empty values removed.
    pub params: Params,
    /// JSON body for `POST` calls.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// A `GET` request without parameters.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            params: Params::new(),
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(path)
        }
    }

    /// Adds parameters, dropping those with empty values.
    pub fn with_params(mut self, params: Option<Params>) -> Self {
        if let Some(params) = params {
            self.params
                .extend(params.into_iter().filter(|(_, value)| !value.is_empty()));
        }
        self
    }

    /// Adds one parameter unless its value is empty.
    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.params.insert(name.to_owned(), value);
        }
        self
    }
}

/// Strips a leading `#` from a tag.
pub fn clean_tag(tag: &str) -> &str {
    tag.strip_prefix('#').unwrap_or(tag)
}

fn tag(tag: &str) -> String {
    format!("%23{}", utf8_percent_encode(clean_tag(tag), SEGMENT))
}

fn segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Validates a caller supplied path for [`custom`].
///
/// The path must start with `/` and contain neither whitespace, a scheme,
/// a query string nor a raw `#`.
pub fn validate_path(path: &str) -> Result<(), ApiError> {
    let reason = if path.is_empty() {
        Some("path is empty")
    } else if !path.starts_with('/') {
        Some("path must start with '/'")
    } else if path.chars().any(char::is_whitespace) {
        Some("path must not contain whitespace")
    } else if path.contains("://") {
        Some("path must be relative to the base URL")
    } else if path.contains('?') {
        Some("query parameters must be passed separately")
    } else if path.contains('#') {
        Some("tags must be percent-encoded as %23")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ApiError::InvalidPath {
            path: path.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// A call to any path, for endpoints without a dedicated builder.
pub fn custom(path: &str, params: Option<Params>) -> Result<ApiRequest, ApiError> {
    validate_path(path)?;
    Ok(ApiRequest::get(path).with_params(params))
}

/// `/clans/{tag}`
pub fn clan_tag(clan_tag: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}", tag(clan_tag))).with_params(params)
}

/// `/clans/{tag}/members`
pub fn clan_members(clan_tag: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}/members", tag(clan_tag))).with_params(params)
}

/// `/clans/{tag}/currentwar`
pub fn clan_current_war(clan_tag: &str) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}/currentwar", tag(clan_tag)))
}

/// `/clans/{tag}/warlog`
pub fn clan_war_log(clan_tag: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}/warlog", tag(clan_tag))).with_params(params)
}

/// `/clans/{tag}/currentwar/leaguegroup`
pub fn clan_leaguegroup(clan_tag: &str) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}/currentwar/leaguegroup", tag(clan_tag)))
}

/// `/clans/{tag}/capitalraidseasons`
pub fn clan_capitalraidseasons(clan_tag: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/clans/{}/capitalraidseasons", tag(clan_tag))).with_params(params)
}

/// `/players/{tag}`
pub fn players(player_tag: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/players/{}", tag(player_tag))).with_params(params)
}

/// `/clans?name=..&limit=..`, the clan search.
pub fn clan(name: &str, limit: u32, params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/clans")
        .with_params(params)
        .with_param("name", name)
        .with_param("limit", limit)
}

/// `/clanwarleagues/wars/{tag}`
pub fn warleague(war_tag: &str) -> ApiRequest {
    ApiRequest::get(format!("/clanwarleagues/wars/{}", tag(war_tag)))
}

/// `/locations`
pub fn location(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/locations").with_params(params)
}

/// `/locations/{id}`
pub fn location_id(location_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/locations/{}", segment(location_id)))
}

fn ranking(location_id: &str, ranking: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!(
        "/locations/{}/rankings/{ranking}",
        segment(location_id)
    ))
    .with_params(params)
}

/// `/locations/{id}/rankings/clans`
pub fn location_id_clan_rank(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "clans", params)
}

/// `/locations/{id}/rankings/players`
pub fn location_id_player_rank(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "players", params)
}

/// `/locations/{id}/rankings/clans-versus`
pub fn location_clan_versus(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "clans-versus", params)
}

/// `/locations/{id}/rankings/players-versus`
pub fn location_player_versus(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "players-versus", params)
}

/// `/locations/{id}/rankings/clans-builder-base`
pub fn location_clans_builder_base(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "clans-builder-base", params)
}

/// `/locations/{id}/rankings/players-builder-base`
pub fn location_players_builder_base(location_id: &str, params: Option<Params>) -> ApiRequest {
    ranking(location_id, "players-builder-base", params)
}

/// `/leagues`
pub fn league(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/leagues").with_params(params)
}

/// `/leagues/{id}`
pub fn league_id(league_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/leagues/{}", segment(league_id)))
}

/// `/leagues/{id}/seasons`
pub fn league_season(league_id: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!("/leagues/{}/seasons", segment(league_id))).with_params(params)
}

/// `/leagues/{id}/seasons/{season}`
pub fn league_season_id(league_id: &str, season_id: &str, params: Option<Params>) -> ApiRequest {
    ApiRequest::get(format!(
        "/leagues/{}/seasons/{}",
        segment(league_id),
        segment(season_id)
    ))
    .with_params(params)
}

/// `/warleagues`
pub fn warleagues() -> ApiRequest {
    ApiRequest::get("/warleagues")
}

/// `/warleagues/{id}`
pub fn warleagues_id(league_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/warleagues/{}", segment(league_id)))
}

/// `/labels/clans`
pub fn labels_clans(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/labels/clans").with_params(params)
}

/// `/labels/players`
pub fn labels_players(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/labels/players").with_params(params)
}

/// `/capitalleagues`
pub fn capitalleagues(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/capitalleagues").with_params(params)
}

/// `/capitalleagues/{id}`
pub fn capitalleagues_id(league_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/capitalleagues/{}", segment(league_id)))
}

/// `/builderbaseleagues`
pub fn builderbaseleagues(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/builderbaseleagues").with_params(params)
}

/// `/builderbaseleagues/{id}`
pub fn builderbaseleagues_id(league_id: &str) -> ApiRequest {
    ApiRequest::get(format!("/builderbaseleagues/{}", segment(league_id)))
}

/// `/goldpass/seasons/current`
pub fn goldpass(params: Option<Params>) -> ApiRequest {
    ApiRequest::get("/goldpass/seasons/current").with_params(params)
}
