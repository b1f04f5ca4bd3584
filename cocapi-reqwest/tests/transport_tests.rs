//! Integration tests for the reqwest transports using wiremock.

use std::time::Duration;

use cocapi_core::{
    BlockingTransport, Params, RequestContext, Transport, TransportError, TransportRequest,
};
use cocapi_reqwest::{BlockingReqwestTransport, ReqwestTransport};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(url: String, params: &[(&str, &str)]) -> TransportRequest {
    let params: Params = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let context = RequestContext::get(url)
        .with_params(params)
        .with_header("Authorization", "Bearer token");
    TransportRequest::from_context(context, Duration::from_secs(5))
}

#[tokio::test]
async fn sends_query_headers_and_reads_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/clans/%232PP/members"))
        .and(query_param("limit", "5"))
        .and(header("authorization", "Bearer token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"items":[]}"#)
                .insert_header("x-ratelimit", "9"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let url = format!("{}/v1/clans/%232PP/members", server.uri());
    let response = transport.send(request(url, &[("limit", "5")])).await.unwrap();

    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body_text(), r#"{"items":[]}"#);
    assert_eq!(response.header("X-RateLimit"), Some("9"));
}

#[tokio::test]
async fn error_status_is_a_response_not_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();
    let response = transport
        .send(request(format!("{}/v1/locations", server.uri()), &[]))
        .await
        .unwrap();
    assert_eq!(response.status.as_u16(), 429);
    assert_eq!(response.retry_after(), Some(Duration::from_secs(2)));
}

#[tokio::test]
async fn posts_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/players/%23P/verifytoken"))
        .and(body_string(r#"{"token":"abc"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let context = RequestContext::new(
        http::Method::POST,
        format!("{}/v1/players/%23P/verifytoken", server.uri()),
    );
    let request = TransportRequest::from_context(context, Duration::from_secs(5))
        .with_body(r#"{"token":"abc"}"#);
    let response = ReqwestTransport::new().send(request).await.unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let mut slow = request(format!("{}/v1/locations", server.uri()), &[]);
    slow.timeout = Duration::from_millis(100);
    let error = ReqwestTransport::new().send(slow).await.unwrap_err();
    assert!(matches!(error, TransportError::Timeout(t) if t == Duration::from_millis(100)));
}

#[tokio::test]
async fn refused_connection_is_connect_error() {
    let error = ReqwestTransport::new()
        .send(request("http://127.0.0.1:1/v1/locations".to_owned(), &[]))
        .await
        .unwrap_err();
    assert!(matches!(error, TransportError::Connect(_)), "{error:?}");
}

#[test]
fn blocking_transport_round_trip() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/leagues"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[1]}"#))
            .expect(1)
            .mount(&server)
            .await;
        server
    });

    let transport = BlockingReqwestTransport::new();
    let response = transport
        .send(request(format!("{}/v1/leagues", server.uri()), &[]))
        .unwrap();
    assert_eq!(response.status.as_u16(), 200);
    assert_eq!(response.body_text(), r#"{"items":[1]}"#);

    runtime.block_on(async move { server.verify().await });
}
