//! Conversions between cocapi transport types and reqwest.

use std::time::Duration;

use cocapi_core::{Headers, TransportError, TransportRequest};
use http::HeaderMap;
use reqwest::Url;

/// Absolute URL with the query parameters appended.
pub(crate) fn request_url(request: &TransportRequest) -> Result<Url, TransportError> {
    Url::parse_with_params(&request.url, &request.params)
        .map_err(|error| TransportError::Request(Box::new(error)))
}

/// Classifies a reqwest failure.
///
/// Only builder errors become [`TransportError::Request`]; `is_request()`
/// also covers connections dropped mid-send, which stay retryable.
pub(crate) fn map_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_builder() {
        TransportError::Request(Box::new(error))
    } else if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect(Box::new(error))
    } else {
        TransportError::Other(Box::new(error))
    }
}

/// Response headers with lowercase names. Values that are not valid UTF-8
/// are skipped; repeated headers keep the last value.
pub(crate) fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cocapi_core::{Params, RequestContext};
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn url_keeps_encoded_tag_and_appends_sorted_params() {
        let params: Params = [("name", "war clan"), ("limit", "5")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        let context =
            RequestContext::get("https://api.example/v1/clans/%232PP").with_params(params);
        let request = TransportRequest::from_context(context, Duration::from_secs(1));

        let url = request_url(&request).unwrap();
        assert_eq!(url.path(), "/v1/clans/%232PP");
        assert_eq!(url.query(), Some("limit=5&name=war+clan"));
    }

    #[test]
    fn invalid_url_is_a_request_error() {
        let request =
            TransportRequest::from_context(RequestContext::get("not a url"), Duration::ZERO);
        assert!(matches!(request_url(&request), Err(TransportError::Request(_))));
    }

    #[test]
    fn builder_errors_are_request_errors() {
        let error = reqwest::Client::new()
            .get("https://api.example/v1/locations")
            .header("bad header name", "value")
            .build()
            .unwrap_err();
        assert!(error.is_builder());
        assert!(matches!(
            map_error(error, Duration::from_secs(1)),
            TransportError::Request(_)
        ));
    }

    #[test]
    fn headers_are_collected() {
        let mut map = HeaderMap::new();
        map.insert("Retry-After", HeaderValue::from_static("3"));
        map.insert("x-bin", HeaderValue::from_bytes(b"\xff").unwrap());
        let headers = collect_headers(&map);
        assert_eq!(headers.get("retry-after").map(String::as_str), Some("3"));
        assert!(!headers.contains_key("x-bin"));
    }
}
