#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod blocking;
mod convert;
mod transport;

pub use blocking::BlockingReqwestTransport;
pub use transport::ReqwestTransport;

/// Re-export of the underlying HTTP client crate.
pub use reqwest;
