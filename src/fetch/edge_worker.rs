//! Edge-worker proxy fetch strategy (C5): routes the fetch through a
//! configured CDN-edge proxy endpoint.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{Result, WebPeelError};

use super::{FetchMethod, FetchOptions, FetchResult, FetchStrategy};

#[derive(Debug, Deserialize)]
struct EdgeEnvelope {
    status: u16,
    body: String,
    #[serde(default, rename = "finalUrl")]
    final_url: Option<String>,
    #[serde(default)]
    headers: std::collections::HashMap<String, String>,
    #[serde(default, rename = "timing")]
    timing_ms: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

pub struct EdgeWorkerFetcher {
    client: Client,
    worker_url: String,
    token: Option<String>,
}

impl EdgeWorkerFetcher {
    /// Returns `None` when `WEBPEEL_CF_WORKER_URL` is unset: the strategy is
    /// unavailable per spec section 4.5.
    #[must_use]
    pub fn from_env(client: Client) -> Option<Self> {
        let worker_url = std::env::var("WEBPEEL_CF_WORKER_URL").ok()?;
        let token = std::env::var("WEBPEEL_CF_WORKER_TOKEN").ok();
        Some(Self { client, worker_url, token })
    }
}

#[async_trait]
impl FetchStrategy for EdgeWorkerFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::EdgeWorker
    }

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let started = Instant::now();
        let mut request = self
            .client
            .post(&self.worker_url)
            .timeout(opts.timeout())
            .json(&serde_json::json!({ "url": url }));

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(WebPeelError::from)?;
        let envelope: EdgeEnvelope = response
            .json()
            .await
            .map_err(|e| WebPeelError::Network(format!("malformed edge-worker envelope: {e}")))?;

        if let Some(err) = envelope.error.filter(|e| !e.is_empty()) {
            return Err(WebPeelError::Network(format!("edge-worker error: {err}")));
        }

        Ok(FetchResult {
            final_url: envelope.final_url.unwrap_or_else(|| url.to_string()),
            status: envelope.status,
            body: envelope.body.into_bytes(),
            content_type: envelope
                .headers
                .get("content-type")
                .cloned()
                .unwrap_or_else(|| "text/html".to_string()),
            headers: envelope.headers,
            timing_ms: envelope.timing_ms.unwrap_or_else(|| started.elapsed().as_millis() as u64),
            method: FetchMethod::EdgeWorker,
            screenshot: None,
            mirror_cached_at: None,
            content_fingerprint: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_without_env_var() {
        std::env::remove_var("WEBPEEL_CF_WORKER_URL");
        let client = Client::new();
        assert!(EdgeWorkerFetcher::from_env(client).is_none());
    }
}
