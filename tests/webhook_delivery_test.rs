//! End-to-end webhook delivery: a job transition fires an HMAC-signed POST
//! to a real (loopback) HTTP receiver, decoupled from the job update call.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::oneshot;

use webpeel::job_queue::{JobPatch, JobQueue, JobStatus, JobType};
use webpeel::webhook::{WebhookConfig, WebhookEvent, WebhookSender};

#[derive(Clone)]
struct Captured {
    tx: Arc<std::sync::Mutex<Option<oneshot::Sender<(String, Option<String>)>>>>,
}

async fn capture(
    State(state): State<Captured>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> axum::http::StatusCode {
    let signature = headers.get("X-WebPeel-Signature").and_then(|v| v.to_str().ok()).map(str::to_string);
    let body_str = String::from_utf8_lossy(&body).to_string();
    if let Some(tx) = state.tx.lock().unwrap().take() {
        let _ = tx.send((body_str, signature));
    }
    axum::http::StatusCode::OK
}

#[tokio::test]
async fn job_completion_delivers_signed_webhook() {
    let (tx, rx) = oneshot::channel();
    let captured = Captured { tx: Arc::new(std::sync::Mutex::new(Some(tx))) };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/hook", post(capture)).with_state(captured);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let secret = "shared-secret".to_string();
    let webhook_config = WebhookConfig {
        url: format!("http://{addr}/hook"),
        events: HashSet::from([WebhookEvent::Completed]),
        metadata: None,
        secret: Some(secret.clone()),
    };

    let sender = Arc::new(WebhookSender::new(reqwest::Client::new()));
    let queue = JobQueue::new(sender);
    let job = queue.create(JobType::Batch, Some(webhook_config));

    queue.update(job.id, JobPatch { status: Some(JobStatus::Completed), ..Default::default() });

    let (body, signature) =
        tokio::time::timeout(std::time::Duration::from_secs(5), rx).await.expect("webhook delivered in time").unwrap();

    let signature = signature.expect("signature header present");
    let expected_hex = signature.strip_prefix("sha256=").expect("sha256= prefix");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    let computed = hex::encode(mac.finalize().into_bytes());

    assert_eq!(expected_hex, computed);
    assert!(body.contains("\"event\":\"completed\""));
    assert!(body.contains(&job.id.to_string()));
}

#[tokio::test]
async fn job_update_without_matching_subscription_sends_nothing() {
    let (tx, rx) = oneshot::channel();
    let captured = Captured { tx: Arc::new(std::sync::Mutex::new(Some(tx))) };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/hook", post(capture)).with_state(captured);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let webhook_config = WebhookConfig {
        url: format!("http://{addr}/hook"),
        events: HashSet::from([WebhookEvent::Failed]),
        metadata: None,
        secret: None,
    };

    let sender = Arc::new(WebhookSender::new(reqwest::Client::new()));
    let queue = JobQueue::new(sender);
    let job = queue.create(JobType::Batch, Some(webhook_config));
    queue.update(job.id, JobPatch { status: Some(JobStatus::Completed), ..Default::default() });

    let result = tokio::time::timeout(std::time::Duration::from_millis(500), rx).await;
    assert!(result.is_err(), "no webhook should have been delivered for an unsubscribed event");
}
