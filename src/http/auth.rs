//! Authentication seam (section 9): the identity store itself is an
//! external collaborator; this installs only the request-side contract —
//! resolve a credential, reject with `401` when absent or unknown.

use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyInfo {
    /// The credential itself (API key or bearer token), used as the
    /// rate-limit identifier so each caller gets its own admission bucket.
    pub key: String,
    pub plan: String,
}

#[async_trait]
pub trait ApiKeyResolver: Send + Sync {
    async fn resolve(&self, key: &str) -> Option<ApiKeyInfo>;
}

/// Accepts any non-empty key with a fixed plan; stands in for the real
/// identity store in tests and local runs.
pub struct InMemoryApiKeyResolver;

#[async_trait]
impl ApiKeyResolver for InMemoryApiKeyResolver {
    async fn resolve(&self, key: &str) -> Option<ApiKeyInfo> {
        if key.is_empty() {
            None
        } else {
            Some(ApiKeyInfo { key: key.to_string(), plan: "default".to_string() })
        }
    }
}

fn extract_credential(request: &Request) -> Option<String> {
    if let Some(auth) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(s) = auth.to_str() {
            if let Some(token) = s.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }
    request
        .headers()
        .get("X-Api-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(credential) = extract_credential(&request) else {
        return unauthorized();
    };

    match state.api_keys.resolve(&credential).await {
        Some(info) => {
            request.extensions_mut().insert(info);
            next.run(request).await
        }
        None => unauthorized(),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(serde_json::json!({
            "error": "authentication_required",
            "message": "missing or invalid credential",
        })),
    )
        .into_response()
}
