//! End-to-end behaviour of the blocking client over scripted transports.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cocapi::middleware::{RequestId, ResponseSize, request_fn, response_fn};
use cocapi::metrics::CallOutcome;
use cocapi::{ApiConfig, ApiError, ApiMethods, ErrorKind};
use common::{Scripted, Step, blocking_client, test_config};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn repeated_call_is_served_from_cache() {
    let transport = Scripted::ok(r##"{"tag":"#2PP","name":"Clan"}"##);
    let mut api = blocking_client(Arc::clone(&transport), test_config());

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    api.add_request_middleware(request_fn("count", move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ctx)
    }));

    let first = api.clan_tag("#2PP", None).unwrap();
    let second = api.clan_tag("2PP", None).unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.calls(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let stats = api.cache_stats();
    assert_eq!(stats.counters.hits, 1);
    assert_eq!(stats.counters.misses, 1);
    assert_eq!(stats.total_entries, 1);
    assert!(stats.hit_rate > 0.0, "{}", stats.hit_rate);

    let outcomes: Vec<_> = api.metrics().records().iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![CallOutcome::Success, CallOutcome::CacheHit]);
}

#[test]
fn disabled_cache_sends_every_call() {
    let transport = Scripted::ok(r#"{"name":"X"}"#);
    let config = ApiConfig {
        enable_caching: false,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    assert_eq!(api.location_id("32000006").unwrap(), json!({"name": "X"}));
    assert_eq!(api.location_id("32000006").unwrap(), json!({"name": "X"}));
    assert_eq!(transport.calls(), 2);

    let stats = api.cache_stats();
    assert!(!stats.enabled);
    assert_eq!(stats.total_entries, 0);
}

#[test]
fn transient_errors_are_retried_until_success() {
    let transport = Scripted::new([
        Step::Respond(503, ""),
        Step::Refused,
        Step::Respond(200, r#"{"items":[]}"#),
    ]);
    let api = blocking_client(Arc::clone(&transport), test_config());

    assert_eq!(api.location(None).unwrap(), json!({"items": []}));
    assert_eq!(transport.calls(), 3);

    let records = api.metrics().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].outcome, CallOutcome::Success);
    assert_eq!(records[0].retries, 2);
}

#[test]
fn not_found_is_not_retried() {
    let transport = Scripted::new([Step::Respond(404, r#"{"reason":"notFound"}"#)]);
    let api = blocking_client(Arc::clone(&transport), test_config());

    let error = api.players("#NOPE", None).unwrap_err();
    assert!(matches!(error, ApiError::Client { status: 404 }));
    assert_eq!(transport.calls(), 1);
    assert_eq!(api.cache().len(), 0);

    let errors = api.metrics().recent_errors(10);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].status, Some(404));
    assert_eq!(errors[0].error_kind, Some(ErrorKind::Client));
}

#[test]
fn persistent_server_error_exhausts_retries() {
    let transport = Scripted::new([Step::Respond(500, "")]);
    let config = ApiConfig {
        max_retries: 2,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    let error = api.league(None).unwrap_err();
    match &error {
        ApiError::RetriesExhausted { attempts, source } => {
            assert_eq!(*attempts, 3);
            assert!(matches!(**source, ApiError::Server { status: 500 }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.status(), Some(500));
    assert_eq!(transport.calls(), 3);
    assert_eq!(api.metrics().len(), 1);
}

#[test]
fn zero_retries_means_one_attempt() {
    let transport = Scripted::new([Step::Timeout]);
    let config = ApiConfig {
        max_retries: 0,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    let error = api.goldpass(None).unwrap_err();
    assert!(matches!(error, ApiError::RetriesExhausted { attempts: 1, .. }));
    assert_eq!(transport.calls(), 1);
}

#[test]
fn malformed_request_fails_without_retrying() {
    let transport = Scripted::new([Step::Malformed]);
    let config = ApiConfig {
        max_retries: 3,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    let error = api.location(None).unwrap_err();
    assert!(matches!(error, ApiError::InvalidRequest { .. }), "{error:?}");
    assert!(!error.is_retryable());
    assert_eq!(transport.calls(), 1);
    assert_eq!(
        api.metrics().recent_errors(1)[0].error_kind,
        Some(ErrorKind::InvalidRequest)
    );
}

#[test]
fn auth_failure_is_not_retried() {
    let transport = Scripted::new([Step::Respond(403, "")]);
    let api = blocking_client(Arc::clone(&transport), test_config());

    let error = api.warleagues().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Auth);
    assert_eq!(transport.calls(), 1);
}

#[test]
fn invalid_json_is_not_retried_or_cached() {
    let transport = Scripted::new([Step::Respond(200, "<html>maintenance</html>")]);
    let api = blocking_client(Arc::clone(&transport), test_config());

    assert!(matches!(api.labels_clans(None), Err(ApiError::Decode(_))));
    assert_eq!(transport.calls(), 1);
    assert!(api.cache().is_empty());
}

#[test]
fn request_middleware_runs_in_order_and_sees_auth() {
    let transport = Scripted::ok("{}");
    let mut api = blocking_client(Arc::clone(&transport), test_config());
    api.add_request_middleware(request_fn("first", |mut ctx| {
        assert!(ctx.header("authorization").is_some());
        ctx.set_header("x-trace", "a");
        Ok(ctx)
    }));
    api.add_request_middleware(request_fn("second", |mut ctx| {
        let trace = format!("{}b", ctx.header("x-trace").unwrap_or_default());
        ctx.set_header("x-trace", trace);
        Ok(ctx)
    }));

    api.location_id("32000006").unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.headers.get("x-trace").map(String::as_str), Some("ab"));
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer test-token")
    );
    assert_eq!(
        request.url,
        "https://api.clashofclans.com/v1/locations/32000006"
    );
    assert_eq!(api.middleware_info().request_names, vec!["first", "second"]);
}

#[test]
fn response_middleware_output_is_what_gets_cached() {
    let transport = Scripted::ok(r#"{"name":"x"}"#);
    let mut api = blocking_client(Arc::clone(&transport), test_config());
    api.add_response_middleware(response_fn("tag", |mut value| {
        value["seen"] = json!(true);
        Ok(value)
    }));
    api.add_response_middleware(ResponseSize);

    let fresh = api.clan_tag("#A", None).unwrap();
    let cached = api.clan_tag("#A", None).unwrap();

    assert_eq!(fresh["seen"], json!(true));
    assert!(fresh["_response_size_bytes"].as_u64().is_some());
    assert_eq!(fresh, cached);
    assert_eq!(transport.calls(), 1);
}

#[test]
fn volatile_request_ids_do_not_split_the_cache() {
    let transport = Scripted::ok("{}");
    let mut api = blocking_client(Arc::clone(&transport), test_config());
    api.add_request_middleware(RequestId);

    api.clan_members("#A", None).unwrap();
    api.clan_members("#A", None).unwrap();
    assert_eq!(transport.calls(), 1);
}

#[test]
fn failing_middleware_aborts_before_transport() {
    let transport = Scripted::ok("{}");
    let mut api = blocking_client(Arc::clone(&transport), test_config());
    api.add_request_middleware(request_fn("guard", |_| {
        Err(cocapi::middleware::MiddlewareError::new("blocked"))
    }));

    let error = api.location(None).unwrap_err();
    assert!(matches!(&error, ApiError::Middleware { stage, .. } if stage == "guard"));
    assert_eq!(transport.calls(), 0);
    assert_eq!(api.metrics().recent_errors(1)[0].error_kind, Some(ErrorKind::Middleware));
}

#[test]
fn structured_status_turns_errors_into_values() {
    let transport = Scripted::new([
        Step::Respond(200, r#"{"name":"x"}"#),
        Step::Respond(404, ""),
    ]);
    let config = ApiConfig {
        status_code: true,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    assert_eq!(
        api.clan_tag("#A", None).unwrap(),
        json!({"name": "x", "status_code": 200})
    );
    let error = api.clan_tag("#B", None).unwrap();
    assert_eq!(error["result"], json!("error"));
    assert_eq!(error["error_type"], json!("client"));
    assert_eq!(error["status_code"], json!(404));

    let invalid = api.custom_endpoint("no-slash", None).unwrap();
    assert_eq!(invalid["error_type"], json!("invalid_path"));
    assert_eq!(invalid["status_code"], json!(0));
}

#[test]
fn custom_endpoint_takes_the_same_path() {
    let transport = Scripted::ok(r#"{"items":[]}"#);
    let api = blocking_client(Arc::clone(&transport), test_config());

    let mut params = cocapi::Params::new();
    params.insert("limit".into(), "3".into());
    params.insert("after".into(), String::new());

    api.custom_endpoint("/clans/%23ABC/new-thing", Some(params.clone())).unwrap();
    api.custom_endpoint("/clans/%23ABC/new-thing", Some(params)).unwrap();

    assert_eq!(transport.calls(), 1);
    let request = &transport.requests()[0];
    assert_eq!(request.params.get("limit").map(String::as_str), Some("3"));
    assert!(!request.params.contains_key("after"));

    let error = api.custom_endpoint("https://evil.example/x", None).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidPath);
    assert_eq!(transport.calls(), 1);
}

#[test]
fn metrics_window_keeps_only_recent_calls() {
    let transport = Scripted::ok("{}");
    let config = ApiConfig {
        metrics_window_size: 3,
        enable_caching: false,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);

    for id in ["1", "2", "3", "4", "5"] {
        api.league_id(id).unwrap();
    }
    let summary = api.metrics_summary();
    assert_eq!(summary.total_requests, 3);
    assert_eq!(summary.endpoint_metrics["/leagues/{id}"].count, 3);
    assert_eq!(transport.calls(), 5);

    api.clear_metrics();
    assert_eq!(api.metrics_summary().total_requests, 0);
}

#[test]
fn disabled_metrics_record_nothing() {
    let transport = Scripted::ok("{}");
    let config = ApiConfig {
        enable_metrics: false,
        ..test_config()
    };
    let api = blocking_client(Arc::clone(&transport), config);
    api.location(None).unwrap();
    assert!(api.metrics().is_empty());
}

#[test]
fn base_url_change_redirects_calls() {
    let transport = Scripted::ok("{}");
    let mut api = blocking_client(Arc::clone(&transport), test_config());
    api.set_base_url("http://localhost:8080/v1", true).unwrap();
    api.location(None).unwrap();
    assert_eq!(transport.requests()[0].url, "http://localhost:8080/v1/locations");

    assert!(matches!(
        api.set_base_url("http://other:1/v1", false),
        Err(ApiError::InvalidConfiguration(_))
    ));
}

#[test]
fn connection_probe() {
    let healthy = blocking_client(Scripted::ok(r#"{"items":[]}"#), test_config());
    assert!(healthy.test());

    let denied = blocking_client(Scripted::new([Step::Respond(403, "")]), test_config());
    assert!(!denied.test());
}
