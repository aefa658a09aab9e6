//! `/v1/batch` and `/v1/batch/:jobId`: parallel multi-URL fetch job (C7),
//! no checkpointing (crawl-specific, section 4.8).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::fetch::FetchOptions;
use crate::http::AppState;
use crate::job_queue::{JobPatch, JobStatus, JobType};

const MAX_CONCURRENT: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BatchRequest {
    pub urls: Vec<String>,
    #[serde(default)]
    pub options: FetchOptions,
    #[serde(default)]
    pub webhook: Option<crate::webhook::WebhookConfig>,
}

pub async fn create(State(state): State<AppState>, Json(req): Json<BatchRequest>) -> Response {
    if req.urls.is_empty() {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_request", "message": "urls must be non-empty"})),
        )
            .into_response();
    }
    if let Some(bad) = req.urls.iter().find(|u| !crate::utils::is_valid_url(u)) {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "invalid_url", "message": format!("{bad} is not http(s)")})),
        )
            .into_response();
    }

    let job = state.job_queue.create(JobType::Batch, req.webhook.clone());
    let job_id = job.id;
    let total = req.urls.len() as u64;
    let state_for_task = state.clone();
    let urls = req.urls.clone();
    let options = req.options.clone();

    state.job_queue.update(
        job_id,
        JobPatch { status: Some(JobStatus::Processing), total: Some(total), ..Default::default() },
    );

    tokio::spawn(async move {
        run_batch(state_for_task, job_id, urls, options).await;
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

async fn run_batch(state: AppState, job_id: Uuid, urls: Vec<String>, options: FetchOptions) {
    use futures::stream::{self, StreamExt};

    let completed = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));

    stream::iter(urls)
        .for_each_concurrent(MAX_CONCURRENT, |url| {
            let state = state.clone();
            let options = options.clone();
            let completed = std::sync::Arc::clone(&completed);
            async move {
                let outcome = state.escalation.fetch(&url, options).await;
                let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;

                let data = match outcome {
                    Ok(result) => serde_json::json!({"url": url, "status": result.status}),
                    Err(err) => serde_json::json!({"url": url, "error": err.to_string()}),
                };

                state.job_queue.update(
                    job_id,
                    JobPatch { completed: Some(done), push_data: Some(data), ..Default::default() },
                );
            }
        })
        .await;

    state.job_queue.update(
        job_id,
        JobPatch { status: Some(JobStatus::Completed), ..Default::default() },
    );
}
