//! Request executor behavior against an in-process backend: retries for
//! idempotent reads, single attempts for writes, API error decoding and the
//! bearer token.

mod common;

use common::{refused_url, test_timeouts, MockResponse, MockServer};
use pocket_link::{
    is_transient, Method, PocketLinkClient, PocketLinkError, RequestOptions, RetryPolicy,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handler that passes the zero-based hit number to `f`.
fn counting<F>(
    f: F,
) -> (
    Arc<AtomicUsize>,
    impl Fn(&common::RecordedRequest) -> MockResponse + Send + Sync + 'static,
)
where
    F: Fn(usize) -> MockResponse + Send + Sync + 'static,
{
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let handler = move |_: &common::RecordedRequest| f(counter.fetch_add(1, Ordering::SeqCst));
    (hits, handler)
}

#[tokio::test]
async fn test_get_retries_5xx_until_success() {
    let (hits, handler) = counting(|n| match n {
        0 | 1 => MockResponse::json(503, json!({"message": "unavailable"})),
        _ => MockResponse::json(200, json!({"ok": true})),
    });
    let server = MockServer::start(handler).await;
    let client = server.client();

    let started = Instant::now();
    let value: Value = client
        .send(Method::GET, "/api/thing", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap();

    assert_eq!(value, json!({"ok": true}));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // 150ms + 300ms of backoff
    assert!(
        started.elapsed() >= Duration::from_millis(450),
        "retries came too fast: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_get_retries_when_connection_closes_before_response() {
    let (hits, handler) = counting(|n| match n {
        0 => MockResponse::Hangup,
        _ => MockResponse::json(200, json!({"ok": true})),
    });
    let server = MockServer::start(handler).await;
    let client = server.client();

    let value: Value = client
        .send(Method::GET, "/api/thing", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap();

    assert_eq!(value, json!({"ok": true}));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_post_is_never_retried() {
    let (hits, handler) = counting(|_| MockResponse::json(503, json!({"message": "busy"})));
    let server = MockServer::start(handler).await;
    let client = server.client();

    let err = client
        .send::<_, Value>(
            Method::POST,
            "/api/collections/posts/records",
            &RequestOptions::default(),
            Some(&json!({"title": "hello"})),
        )
        .await
        .unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let api = err.api_error().expect("api error");
    assert_eq!(api.status, 503);
    assert_eq!(api.message, "busy");
    assert!(matches!(err, PocketLinkError::Api(_)));
}

#[tokio::test]
async fn test_get_does_not_retry_client_errors() {
    let (hits, handler) = counting(|_| MockResponse::json(404, json!({"message": "missing"})));
    let server = MockServer::start(handler).await;
    let client = server.client();

    let err = client
        .send::<_, Value>(Method::GET, "/api/nope", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "http 404: missing");
}

#[tokio::test]
async fn test_api_error_carries_message_and_data() {
    let server = MockServer::start(|_| {
        MockResponse::json(
            400,
            json!({
                "code": 400,
                "message": "Failed to create record.",
                "data": {"title": {"code": "validation_required", "message": "Missing required value."}}
            }),
        )
    })
    .await;
    let client = server.client();

    let err = client
        .collection::<Value>("posts")
        .create(&json!({}), &RequestOptions::default())
        .await
        .unwrap_err();

    let api = err.api_error().expect("api error");
    assert_eq!(api.status, 400);
    assert_eq!(api.message, "Failed to create record.");
    assert_eq!(api.data["title"]["code"], "validation_required");
    assert!(!api.body.is_empty());
    assert!(!is_transient(&err));
}

#[tokio::test]
async fn test_malformed_error_body_keeps_raw_bytes() {
    let server = MockServer::start(|_| MockResponse::raw(400, "<html>bad gateway</html>")).await;
    let client = server.client();

    let err = client
        .send::<_, Value>(Method::DELETE, "/api/x", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    let api = err.api_error().expect("api error");
    assert_eq!(api.status, 400);
    assert!(api.message.is_empty());
    assert!(api.data.is_empty());
    assert_eq!(&api.body[..], b"<html>bad gateway</html>");
}

#[tokio::test]
async fn test_get_exhausts_retries_on_persistent_5xx() {
    let (hits, handler) = counting(|_| MockResponse::json(502, json!({"message": "down"})));
    let server = MockServer::start(handler).await;
    let client = server.client();

    let err = client
        .send::<_, Value>(Method::GET, "/api/health", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    match &err {
        PocketLinkError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last.status(), Some(502));
        },
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    // the last failure stays reachable through the wrapper
    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn test_get_exhausts_retries_on_refused_connection() {
    let client = PocketLinkClient::builder()
        .base_url(refused_url().await)
        .timeouts(test_timeouts())
        .build()
        .unwrap();

    let started = Instant::now();
    let err = client
        .send::<_, Value>(Method::GET, "/api/health", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    match &err {
        PocketLinkError::RetriesExhausted { attempts, last } => {
            assert_eq!(*attempts, 3);
            assert!(is_transient(last), "last error should be transient: {:?}", last);
        },
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_millis(450));
}

#[tokio::test]
async fn test_refused_write_fails_once_without_wrapper() {
    let client = PocketLinkClient::builder()
        .base_url(refused_url().await)
        .timeouts(test_timeouts())
        .build()
        .unwrap();

    let err = client
        .send::<_, Value>(Method::POST, "/api/batch", &RequestOptions::default(), Some(&json!({})))
        .await
        .unwrap_err();

    assert!(matches!(err, PocketLinkError::Http(_)), "got {:?}", err);
    assert!(is_transient(&err));
}

#[tokio::test]
async fn test_no_retry_policy_returns_plain_error() {
    let (hits, handler) = counting(|_| MockResponse::json(500, json!({"message": "boom"})));
    let server = MockServer::start(handler).await;
    let client = server.client_with(test_timeouts(), RetryPolicy::no_retry());

    let err = client
        .send::<_, Value>(Method::GET, "/api/x", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(matches!(err, PocketLinkError::Api(_)));
}

#[tokio::test]
async fn test_bearer_token_and_query_are_sent() {
    let server = MockServer::start(|_| MockResponse::json(200, json!({"items": []}))).await;
    let client = server.client();
    client.set_token("tok-123");

    let _: Value = client
        .send(
            Method::GET,
            "/api/collections/posts/records",
            &RequestOptions::query("?filter=(a=1)&sort=-created"),
            None::<&()>,
        )
        .await
        .unwrap();

    client.clear_token();
    let _: Value = client
        .send(Method::GET, "/api/health", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].header("authorization"), Some("Bearer tok-123"));
    assert_eq!(requests[0].query(), Some("filter=(a=1)&sort=-created"));
    assert_eq!(requests[1].header("authorization"), None);
}

#[tokio::test]
async fn test_request_body_is_json() {
    let server = MockServer::start(|_| MockResponse::json(200, json!({"id": "r1"}))).await;
    let client = server.client();

    let _: Value = client
        .send(
            Method::PATCH,
            "/api/collections/posts/records/r1",
            &RequestOptions::default(),
            Some(&json!({"title": "edited"})),
        )
        .await
        .unwrap();

    let request = &server.requests()[0];
    assert_eq!(request.method, "PATCH");
    assert_eq!(request.header("content-type"), Some("application/json"));
    assert_eq!(request.json(), json!({"title": "edited"}));
}

#[tokio::test]
async fn test_cancellation_interrupts_backoff() {
    let server = MockServer::start(|_| MockResponse::json(503, json!({}))).await;
    let client = server.client_with(
        test_timeouts(),
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(30),
        },
    );

    let token = client.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = Instant::now();
    let err = client
        .send::<_, Value>(Method::GET, "/api/x", &RequestOptions::default(), None::<&()>)
        .await
        .unwrap_err();

    assert!(matches!(err, PocketLinkError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
}
