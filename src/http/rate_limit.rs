//! Rate-limit middleware (section 4.4 HTTP boundary): identifier selection
//! (API key > `CF-Connecting-IP` > `X-Real-IP` > peer address > `"unknown"`)
//! and the standard `X-RateLimit-*` / `Retry-After` headers.
//!
//! Runs behind `auth::require_auth` (outermost `route_layer` runs first),
//! so an authenticated request always carries `ApiKeyInfo` by the time it
//! reaches here.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use super::auth::ApiKeyInfo;
use super::AppState;

fn identifier(request: &Request) -> String {
    if let Some(info) = request.extensions().get::<ApiKeyInfo>() {
        return info.key.clone();
    }
    if let Some(v) = request.headers().get("CF-Connecting-IP").and_then(|v| v.to_str().ok()) {
        return v.to_string();
    }
    if let Some(v) = request.headers().get("X-Real-IP").and_then(|v| v.to_str().ok()) {
        return v.to_string();
    }
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    "unknown".to_string()
}

pub async fn enforce_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let id = identifier(&request);
    let limit = state.config.default_rate_limit;
    let decision = state.rate_limiter.check_limit(&id, limit);

    let now_secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let reset = now_secs + decision.retry_after_secs.max(1);

    if !decision.allowed {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            axum::Json(serde_json::json!({
                "error": "rate_limited",
                "message": "too many requests",
                "retryAfter": decision.retry_after_secs,
            })),
        )
            .into_response();
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(reset));
        headers.insert("Retry-After", HeaderValue::from(decision.retry_after_secs));
        return response;
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset));
    response
}
