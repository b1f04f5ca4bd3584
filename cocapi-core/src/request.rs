//! Request context threaded through the middleware chain.
//!
//! A [`RequestContext`] is the logical description of one outbound call:
//! method, absolute URL without query string, headers and query parameters.
//! Middleware receive it by value and hand back a (possibly modified) copy.
//!
//! Parameters are stored in a [`BTreeMap`], so iteration order is always
//! sorted by name. The cache key derived from a context is therefore
//! independent of the order parameters were inserted in.

use std::collections::BTreeMap;

use http::Method;

use crate::key::{CacheKey, KeyPart, KeyParts};

/// Query parameters, sorted by name.
pub type Params = BTreeMap<String, String>;

/// Request headers. Names are stored lowercase when set through
/// [`RequestContext::set_header`].
pub type Headers = BTreeMap<String, String>;

/// Prefix of every key produced by [`RequestContext::cache_key`].
pub const CACHE_KEY_PREFIX: &str = "cocapi";

/// Version of the key layout. Bump to invalidate keys built by older code.
pub const CACHE_KEY_VERSION: u32 = 1;

/// The mutable description of a single API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// HTTP method, `GET` for every named endpoint.
    pub method: Method,
    /// Absolute URL without the query string.
    pub url: String,
    /// Request headers.
    pub headers: Headers,
    /// Query parameters.
    pub params: Params,
}

impl RequestContext {
    /// Creates a context with no headers and no parameters.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            params: Params::new(),
        }
    }

    /// Shorthand for a `GET` context.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets a header, lowercasing its name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`set_header`](Self::set_header).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Merges the given parameters into the context.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Builds the canonical cache key for this request.
    ///
    /// The key is made of the method, the URL and every query parameter in
    /// name order. Headers never contribute, so per-request values such as
    /// request ids added by middleware cannot split the cache.
    pub fn cache_key(&self) -> CacheKey {
        let mut parts = KeyParts::new(CACHE_KEY_PREFIX, CACHE_KEY_VERSION);
        parts.push(KeyPart::new("method", Some(self.method.as_str())));
        parts.push(KeyPart::new("url", Some(&self.url)));
        parts.extend(
            self.params
                .iter()
                .map(|(name, value)| KeyPart::new(format!("q.{name}"), Some(value))),
        );
        parts.into_cache_key()
    }
}
