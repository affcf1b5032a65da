// Router-level tests for the HTTP surface, driven through
// tower::ServiceExt::oneshot against the in-memory store.

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use common::{init_tracing, items, Harness, Scripted};
use rss_dispatcher::api::{self, AppState};
use rss_dispatcher::{
    RecordingPublisher, SweepConfig, SweepOrchestrator, SweepTrigger, WatermarkStore,
};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt as _;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(h: &Harness<RecordingPublisher>) -> Router {
    let orchestrator = SweepOrchestrator::new(h.engine(), SweepConfig::default());
    let trigger = SweepTrigger::new(Arc::new(orchestrator));
    api::router(AppState::new(h.store.clone(), trigger))
}

fn post_json(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST request")
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json body")
}

#[tokio::test]
async fn api_health_returns_ok() {
    let h = Harness::new(RecordingPublisher::new());
    let req = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = test_router(&h).oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn api_register_feed_returns_created() {
    init_tracing();
    let h = Harness::new(RecordingPublisher::new());

    let resp = test_router(&h)
        .oneshot(post_json("/feeds", json!({ "url": " https://a.example.com/rss " })))
        .await
        .expect("oneshot /feeds");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let v = json_body(resp).await;
    assert_eq!(v["url"], "https://a.example.com/rss");

    let records = h.store.list_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(v["id"], records[0].feed_id.to_string());
    assert!(records[0].last_seen_id.is_none());
}

#[tokio::test]
async fn api_register_rejects_missing_and_invalid_urls() {
    init_tracing();
    let h = Harness::new(RecordingPublisher::new());

    for payload in [json!({}), json!({ "url": "" }), json!({ "url": "ftp://a.example.com/rss" })] {
        let resp = test_router(&h)
            .oneshot(post_json("/feeds", payload.clone()))
            .await
            .expect("oneshot /feeds");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "payload {}", payload);
        assert!(json_body(resp).await.get("error").is_some());
    }
    assert!(h.store.list_records().await.unwrap().is_empty());
}

#[tokio::test]
async fn api_register_duplicate_is_conflict() {
    init_tracing();
    let h = Harness::new(RecordingPublisher::new());
    let existing = h.feed("https://a.example.com/rss", None).await;

    let resp = test_router(&h)
        .oneshot(post_json("/feeds", json!({ "url": "https://a.example.com/rss" })))
        .await
        .expect("oneshot /feeds");

    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["id"], existing.feed_id.to_string());
}

#[tokio::test]
async fn api_list_feeds_shows_watermarks() {
    let h = Harness::new(RecordingPublisher::new());
    h.feed("https://a.example.com/rss", Some("i3")).await;
    h.feed("https://b.example.com/rss", None).await;

    let req = Request::builder()
        .uri("/feeds")
        .body(Body::empty())
        .expect("build GET /feeds");
    let resp = test_router(&h).oneshot(req).await.expect("oneshot /feeds");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let feeds = v.as_array().expect("array of feeds");
    assert_eq!(feeds.len(), 2);
    assert_eq!(feeds[0]["url"], "https://a.example.com/rss");
    assert_eq!(feeds[0]["last_seen_id"], "i3");
    assert!(feeds[1]["last_seen_id"].is_null());
}

#[tokio::test]
async fn api_sweep_returns_per_feed_outcomes() {
    init_tracing();
    let h = Harness::new(RecordingPublisher::new());
    let ok = h.feed("https://a.example.com/rss", None).await;
    let down = h.feed("https://b.example.com/rss", None).await;
    h.source.set(&ok.url, Scripted::Items(items(2))).await;
    h.source.set(&down.url, Scripted::NetworkDown).await;

    let resp = test_router(&h)
        .oneshot(post_json("/sweep", json!({})))
        .await
        .expect("oneshot /sweep");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    let outcomes = v["outcomes"].as_array().expect("outcomes");
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["outcome"]["status"], "published");
    assert_eq!(outcomes[0]["outcome"]["count"], 2);
    assert_eq!(outcomes[1]["outcome"]["status"], "failed");
    assert_eq!(outcomes[1]["outcome"]["reason"]["kind"], "fetch");
}

#[tokio::test]
async fn api_sweep_unavailable_when_feeds_cannot_be_listed() {
    init_tracing();
    let h = Harness::new(RecordingPublisher::new());
    h.store.fail_listing.store(true, Ordering::SeqCst);

    let resp = test_router(&h)
        .oneshot(post_json("/sweep", json!({})))
        .await
        .expect("oneshot /sweep");

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}
