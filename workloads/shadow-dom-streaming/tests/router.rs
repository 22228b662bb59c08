//! HTTP surface tests.
//!
//! Drives the router directly with `oneshot`; no socket is opened.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use edge_sdk::prelude::*;
use shadow_dom_streaming::{router, AppState};
use tower::ServiceExt;

fn test_state() -> AppState {
    AppState::new(StreamConfig::new(3, Duration::ZERO)).with_max_items(50)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn page_streams_with_unbuffered_headers() {
    let resp = router(test_state()).oneshot(get("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers["content-type"], "text/html; charset=utf-8");
    assert_eq!(headers["x-accel-buffering"], "no");
    assert_eq!(headers["cache-control"], "no-cache");
    assert!(!headers["x-request-id"].is_empty());

    let body = body_text(resp).await;
    for i in 0..3 {
        assert!(body.contains(&format!("<slot name=\"item-{}\">", i)));
        assert!(body.contains(&format!("slot=\"item-{}\">Item {} loaded", i, i)));
    }
    assert!(body.contains("<title>Shadow DOM streaming</title>"));
    assert!(body.trim_end().ends_with("</html>"));
}

#[tokio::test]
async fn request_id_is_propagated() {
    let req = Request::builder()
        .uri("/?n=1")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let resp = router(test_state()).oneshot(req).await.unwrap();
    assert_eq!(resp.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn title_is_escaped() {
    let state = test_state().with_title("<Streams & Slots>");
    let resp = router(state).oneshot(get("/?n=0")).await.unwrap();

    let body = body_text(resp).await;
    assert!(body.contains("<h1>&lt;Streams &amp; Slots&gt;</h1>"));
    assert!(body.contains("<p>Nothing to stream.</p>"));
}

#[tokio::test]
async fn blocking_mode_matches_cooperative() {
    let app = router(test_state());

    let cooperative = app
        .clone()
        .oneshot(get("/?n=8&seed=21&flush=3"))
        .await
        .unwrap();
    let blocking = app
        .oneshot(get("/?n=8&seed=21&flush=3&mode=blocking"))
        .await
        .unwrap();

    assert_eq!(body_text(cooperative).await, body_text(blocking).await);
}

#[tokio::test]
async fn out_of_range_overrides_are_rejected() {
    let app = router(test_state());

    let resp = app.clone().oneshot(get("/?n=51")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.clone().oneshot(get("/?flush=2&flush_bytes=10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.oneshot(get("/?mode=parallel")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(resp).await.contains("unknown mode"));
}

#[tokio::test]
async fn metrics_count_finished_sessions() {
    let state = test_state();
    let app = router(state.clone());

    let resp = app.clone().oneshot(get("/?n=2")).await.unwrap();
    let page = body_text(resp).await;

    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let snapshot: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();

    assert_eq!(snapshot["sessions_started"], 1);
    assert_eq!(snapshot["sessions_completed"], 1);
    assert_eq!(snapshot["sessions_active"], 0);
    assert_eq!(snapshot["bytes_sent"], page.len() as u64);
    assert_eq!(state.counters.snapshot().sessions_completed, 1);
}
