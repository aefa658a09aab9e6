//! `/v1/scrape` and `/v1/peel`: single-URL fetch, aliased per section 6.
//!
//! Extraction into markdown/metadata is an external collaborator (section
//! 1 Non-goals); this handler returns the raw `FetchResult` the core
//! promises and leaves `extracted` absent.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::fetch::FetchOptions;
use crate::http::AppState;

use super::error_response;

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    #[serde(flatten)]
    pub options: FetchOptions,
}

pub async fn handle(State(state): State<AppState>, Json(req): Json<ScrapeRequest>) -> Response {
    if !crate::utils::is_valid_url(&req.url) {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_url", "message": "url must be http(s)"})),
        )
            .into_response();
    }

    let production = state.config.production;
    match state.escalation.fetch(&req.url, req.options).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => error_response(&err, production),
    }
}
