//! `/v1/map`: domain URL enumeration via sitemap fetch + link discovery.
//! Reuses the escalation engine for the sitemap fetch and the URL
//! normalizer for dedup; no new core component (section's "supplemented
//! features" note).

use std::collections::HashSet;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::fetch::FetchOptions;
use crate::http::AppState;
use crate::url_normalize::normalize;

use super::error_response;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MapRequest {
    pub url: String,
    #[serde(default)]
    pub include_subdomains: bool,
}

pub async fn handle(State(state): State<AppState>, Json(req): Json<MapRequest>) -> Response {
    if !crate::utils::is_valid_url(&req.url) {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_url", "message": "url must be http(s)"})),
        )
            .into_response();
    }

    let Ok(base) = url::Url::parse(&req.url) else {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_url", "message": "url could not be parsed"})),
        )
            .into_response();
    };
    let sitemap_url = format!("{}://{}/sitemap.xml", base.scheme(), base.host_str().unwrap_or_default());

    let mut urls: HashSet<String> = HashSet::new();

    if let Ok(result) = state.escalation.fetch(&sitemap_url, FetchOptions::default()).await {
        for loc in extract_sitemap_locs(&result.body_as_str()) {
            urls.insert(normalize(&loc));
        }
    }

    match state.escalation.fetch(&req.url, FetchOptions::default()).await {
        Ok(result) => {
            for link in extract_links(&result.body_as_str(), &result.final_url) {
                if req.include_subdomains || same_registrable_host(&base, &link) {
                    urls.insert(normalize(&link));
                }
            }
        }
        Err(err) => return error_response(&err, state.config.production),
    }

    Json(serde_json::json!({"url": req.url, "links": urls.into_iter().collect::<Vec<_>>()})).into_response()
}

fn extract_sitemap_locs(xml: &str) -> Vec<String> {
    let mut locs = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<loc>") {
        rest = &rest[start + 5..];
        let Some(end) = rest.find("</loc>") else { break };
        locs.push(rest[..end].trim().to_string());
        rest = &rest[end..];
    }
    locs
}

fn extract_links(html: &str, base: &str) -> Vec<String> {
    let Ok(base_url) = url::Url::parse(base) else { return Vec::new() };
    let mut links = Vec::new();
    let mut rest = html;
    while let Some(idx) = rest.find("href=") {
        rest = &rest[idx + 5..];
        let Some(first) = rest.chars().next() else { break };
        let (open, close) = match first {
            '"' => ('"', '"'),
            '\'' => ('\'', '\''),
            _ => continue,
        };
        let Some(body) = rest.strip_prefix(open) else { continue };
        let Some(end) = body.find(close) else { continue };
        if let Ok(resolved) = base_url.join(&body[..end]) {
            if matches!(resolved.scheme(), "http" | "https") {
                links.push(resolved.to_string());
            }
        }
        rest = &body[end..];
    }
    links
}

fn same_registrable_host(base: &url::Url, candidate: &str) -> bool {
    let Ok(candidate_url) = url::Url::parse(candidate) else { return false };
    base.host_str() == candidate_url.host_str()
}
