#![warn(missing_docs)]
//! # cocapi-core
//!
//! Core types shared by the cocapi client crates.
//!
//! This crate holds the vocabulary every other cocapi crate speaks, without
//! doing any I/O itself:
//!
//! - **Describe** a call with [`RequestContext`] (method, URL, headers,
//!   parameters)
//! - **Identify** it for caching with [`CacheKey`], built canonically from
//!   the method, URL and sorted parameters
//! - **Send** it through a [`Transport`] or [`BlockingTransport`], which
//!   report [`TransportResponse`] or [`TransportError`]
//!
//! HTTP client integrations (such as `cocapi-reqwest`) implement the
//! transport traits; the `cocapi` crate drives them.

pub mod key;
pub mod request;
pub mod transport;

pub use key::{CacheKey, KeyPart, KeyParts};
pub use request::{CACHE_KEY_PREFIX, CACHE_KEY_VERSION, Headers, Params, RequestContext};
pub use transport::{
    BlockingTransport, BoxError, MAX_RETRY_AFTER, Transport, TransportError, TransportRequest,
    TransportResponse,
};

#[doc(hidden)]
pub use http::{Method, StatusCode};
