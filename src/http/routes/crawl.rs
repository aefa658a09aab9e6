//! `/v1/crawl` and `/v1/crawl/:jobId`: starts a crawl job (C7) driving the
//! checkpointer (C8) for resumability, and polls its progress.

use std::collections::{HashSet, VecDeque};

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::checkpoint::{generate_job_id, CompletedEntry, CrawlCheckpoint};
use crate::fetch::FetchOptions;
use crate::http::AppState;
use crate::job_queue::{JobPatch, JobStatus, JobType};
use crate::url_normalize::normalize;

use super::error_response;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CrawlRequest {
    pub start_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    #[serde(default)]
    pub options: FetchOptions,
    #[serde(default)]
    pub webhook: Option<crate::webhook::WebhookConfig>,
}

fn default_max_pages() -> u64 {
    100
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CrawlRequest>) -> Response {
    if !crate::utils::is_valid_url(&req.start_url) {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_url", "message": "startUrl must be http(s)"})),
        )
            .into_response();
    }

    let job = state.job_queue.create(JobType::Crawl, req.webhook.clone());
    let resumable_id = generate_job_id(&req.start_url, &serde_json::json!({"maxPages": req.max_pages}));

    let existing = state.checkpointer.load(&resumable_id).await;

    let state_for_task = state.clone();
    let job_id = job.id;
    let start_url = req.start_url.clone();
    let max_pages = req.max_pages;
    let options = req.options.clone();

    tokio::spawn(async move {
        run_crawl(state_for_task, job_id, resumable_id, start_url, max_pages, options, existing).await;
    });

    Json(job).into_response()
}

pub async fn poll(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    match state.job_queue.get(job_id) {
        Some(job) => Json(job).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "invalid_request", "message": "unknown job id"})),
        )
            .into_response(),
    }
}

async fn run_crawl(
    state: AppState,
    job_id: Uuid,
    resumable_id: String,
    start_url: String,
    max_pages: u64,
    options: FetchOptions,
    resume: Option<CrawlCheckpoint>,
) {
    state.job_queue.update(
        job_id,
        JobPatch { status: Some(JobStatus::Processing), total: Some(max_pages), ..Default::default() },
    );

    let mut completed: std::collections::HashMap<String, CompletedEntry> =
        resume.as_ref().map(|c| c.completed.clone()).unwrap_or_default();
    let mut pending: VecDeque<String> = resume
        .as_ref()
        .map(|c| c.pending.iter().cloned().collect())
        .unwrap_or_else(|| VecDeque::from([start_url.clone()]));
    let mut discovered: HashSet<String> =
        resume.map(|c| c.discovered.into_iter().collect()).unwrap_or_default();
    discovered.insert(normalize(&start_url));

    let started_at = chrono::Utc::now();

    while let Some(url) = pending.pop_front() {
        if completed.len() as u64 >= max_pages {
            break;
        }
        let key = normalize(&url);
        if completed.contains_key(&key) {
            continue;
        }

        match state.escalation.fetch(&url, options.clone()).await {
            Ok(result) => {
                completed.insert(
                    key.clone(),
                    CompletedEntry {
                        status: result.status,
                        content_length: result.body.len() as u64,
                        timestamp: chrono::Utc::now(),
                    },
                );

                for link in discover_links(&result.body_as_str(), &result.final_url) {
                    let link_key = normalize(&link);
                    if discovered.insert(link_key.clone()) && !completed.contains_key(&link_key) {
                        pending.push_back(link);
                    }
                }

                state.job_queue.update(
                    job_id,
                    JobPatch {
                        completed: Some(completed.len() as u64),
                        push_data: Some(serde_json::json!({"url": url, "status": result.status})),
                        ..Default::default()
                    },
                );
            }
            Err(err) => {
                tracing::warn!(%url, %err, "crawl page fetch failed, continuing");
            }
        }

        let checkpoint = CrawlCheckpoint {
            job_id: resumable_id.clone(),
            start_url: start_url.clone(),
            completed: completed.clone(),
            pending: pending.iter().cloned().collect(),
            discovered: discovered.iter().cloned().collect(),
            options: serde_json::json!({"maxPages": max_pages}),
            started_at,
            last_checkpoint: chrono::Utc::now(),
            max_pages,
        };
        state.checkpointer.save(&checkpoint).await;
    }

    state.job_queue.update(
        job_id,
        JobPatch { status: Some(JobStatus::Completed), ..Default::default() },
    );
}

/// Best-effort `href` discovery; not an HTML parser, just enough to find
/// same-document links for crawl fan-out.
fn discover_links(html: &str, base: &str) -> Vec<String> {
    let mut links = Vec::new();
    let Ok(base_url) = url::Url::parse(base) else { return links };

    let mut rest = html;
    while let Some(idx) = rest.find("href=") {
        rest = &rest[idx + 5..];
        let quote = rest.chars().next();
        let (open, close) = match quote {
            Some('"') => ('"', '"'),
            Some('\'') => ('\'', '\''),
            _ => continue,
        };
        let Some(body) = rest.strip_prefix(open) else { continue };
        let Some(end) = body.find(close) else { continue };
        let href = &body[..end];
        if let Ok(resolved) = base_url.join(href) {
            if matches!(resolved.scheme(), "http" | "https") {
                links.push(resolved.to_string());
            }
        }
        rest = &body[end..];
    }
    links
}
