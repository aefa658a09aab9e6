//! Exercises the axum edge end to end: auth rejection, a scripted scrape
//! round trip, and the sliding-window rate limiter tripping a 429.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use webpeel::fetch::FetchMethod;
use webpeel::http::build_router;

use common::{always_ok, ScriptedFetcher};

#[tokio::test]
async fn scrape_without_credential_is_unauthorized() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let state = common::test_state(plain.clone(), plain.clone(), plain, 60);
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/scrape")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"url": "http://example.com"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn scrape_with_credential_returns_scripted_body() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let calls = plain.calls.clone();
    let state = common::test_state(plain.clone(), plain.clone(), plain, 60);
    let app = build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/scrape")
        .header("content-type", "application/json")
        .header("authorization", "Bearer test-key")
        .body(Body::from(r#"{"url": "http://example.com"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], 200);
    assert_eq!(json["method"], "simple");
}

#[tokio::test]
async fn fourth_request_in_window_is_rate_limited() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let state = common::test_state(plain.clone(), plain.clone(), plain, 3);
    let app = build_router(state);

    for _ in 0..3 {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/scrape")
            .header("content-type", "application/json")
            .header("authorization", "Bearer test-key")
            .body(Body::from(r#"{"url": "http://example.com"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .method("POST")
        .uri("/v1/scrape")
        .header("content-type", "application/json")
        .header("authorization", "Bearer test-key")
        .body(Body::from(r#"{"url": "http://example.com"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn unregistered_watch_route_reports_not_implemented() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let state = common::test_state(plain.clone(), plain.clone(), plain, 60);
    let app = build_router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/v1/watch")
        .header("authorization", "Bearer test-key")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}
