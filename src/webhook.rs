//! Webhook delivery (C7 collaborator): HMAC-signed POST of job events,
//! decoupled from job-state mutation. Grounded in the HMAC-SHA256 dispatch
//! pattern from the example pack's webhook reference (axum + hmac + sha2 +
//! reqwest, signed header, exponential-backoff retry).

use std::collections::HashSet;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    Started,
    Page,
    Completed,
    Failed,
}

impl WebhookEvent {
    fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Page => "page",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub url: String,
    pub events: HashSet<WebhookEvent>,
    pub metadata: Option<serde_json::Value>,
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(rename = "jobId")]
    job_id: Uuid,
    event: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fires a decoupled delivery task when `event` is in `config.events`.
    /// Delivery failures are logged and never alter job state.
    pub fn enqueue(
        self: &std::sync::Arc<Self>,
        config: WebhookConfig,
        job_id: Uuid,
        event: WebhookEvent,
        data: Option<serde_json::Value>,
    ) {
        if !config.events.contains(&event) {
            return;
        }
        let this = std::sync::Arc::clone(self);
        tokio::spawn(async move {
            this.deliver(&config, job_id, event, data).await;
        });
    }

    async fn deliver(
        &self,
        config: &WebhookConfig,
        job_id: Uuid,
        event: WebhookEvent,
        data: Option<serde_json::Value>,
    ) {
        let payload = WebhookPayload { job_id, event: event.as_str(), data };
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                warn!(%job_id, %e, "failed to serialize webhook payload");
                return;
            }
        };

        let signature = config.secret.as_deref().map(|secret| sign(secret, &body));

        for attempt in 0..MAX_ATTEMPTS {
            let mut request = self
                .client
                .post(&config.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());

            if let Some(sig) = &signature {
                request = request.header("X-WebPeel-Signature", format!("sha256={sig}"));
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(%job_id, event = event.as_str(), "webhook delivered");
                    return;
                }
                Ok(response) => {
                    warn!(%job_id, status = %response.status(), "webhook non-2xx response");
                }
                Err(e) => {
                    warn!(%job_id, %e, attempt, "webhook delivery attempt failed");
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(attempt))).await;
            }
        }

        warn!(%job_id, event = event.as_str(), "webhook delivery exhausted retries");
    }
}

fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let a = sign("secret", b"payload");
        let b = sign("secret", b"payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_secrets_produce_different_signatures() {
        assert_ne!(sign("a", b"payload"), sign("b", b"payload"));
    }
}
