//! Fetch strategies behind one interface (C5).
//!
//! `FetchStrategy` is the common capability the escalation engine switches
//! on; it is grounded on `webpipe-core::FetchBackend` from the sibling
//! example pack, adapted to the five strategies this spec names.

pub mod browser;
pub mod edge_worker;
pub mod mirror;
pub mod plain;
pub mod stealth;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WebPeelError};

/// Which concrete strategy produced a `FetchResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMethod {
    Simple,
    Browser,
    Stealth,
    Mirror,
    EdgeWorker,
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Simple => "simple",
            Self::Browser => "browser",
            Self::Stealth => "stealth",
            Self::Mirror => "mirror",
            Self::EdgeWorker => "edge-worker",
        };
        f.write_str(s)
    }
}

/// A scripted browser action, per spec section 4.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ScriptAction {
    Wait { ms: u64 },
    Click { selector: String },
    Scroll { x: i64, y: i64 },
    Type { selector: String, text: String },
    Fill { selector: String, value: String },
    Select { selector: String, value: String },
    Press { key: String },
    Hover { selector: String },
    WaitForSelector { selector: String, timeout_ms: Option<u64> },
    Screenshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceProfile {
    #[must_use]
    pub fn viewport(self) -> (u32, u32) {
        match self {
            Self::Desktop => (1920, 1080),
            Self::Mobile => (390, 844),
            Self::Tablet => (820, 1180),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceClass {
    Image,
    Stylesheet,
    Font,
    Media,
    Script,
}

/// Per-request fetch options (section 4.6 escalation engine input).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct FetchOptions {
    pub force_browser: bool,
    pub stealth: bool,
    pub screenshot: bool,
    pub wait_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub actions: Vec<ScriptAction>,
    pub keep_page_open: bool,
    pub device: Option<DeviceProfile>,
    pub block_resources: Vec<ResourceClass>,
    pub location: Option<String>,
}

impl FetchOptions {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(30_000))
    }
}

/// Outcome of a fetch attempt, immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub final_url: String,
    pub status: u16,
    #[serde(with = "serde_bytes_as_hex")]
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: HashMap<String, String>,
    pub timing_ms: u64,
    pub method: FetchMethod,
    pub screenshot: Option<Vec<u8>>,
    pub mirror_cached_at: Option<String>,
    /// SHA-256 hex digest of `body`, used by change-tracking collaborators
    /// to detect page content drift without re-fetching. Populated by the
    /// escalation engine once a strategy succeeds; individual strategies
    /// leave it blank.
    #[serde(default)]
    pub content_fingerprint: String,
}

impl FetchResult {
    #[must_use]
    pub fn body_as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

mod serde_bytes_as_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Common capability every fetch strategy implements; the escalation engine
/// dispatches on the tag rather than downcasting concrete types.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn method(&self) -> FetchMethod;

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult>;
}

/// Content fingerprint for change-tracking: a SHA-256 hex digest of the
/// response body.
#[must_use]
pub fn fingerprint(body: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(body))
}

/// Classifies an HTTP response as bot-blocked per section 4.5: 403 with
/// challenge markers, 503 with a Cloudflare marker, or an empty body on an
/// HTML content-type.
#[must_use]
pub fn classify_blocked(status: u16, content_type: &str, body: &[u8]) -> bool {
    let is_html = content_type.to_lowercase().contains("html");
    if status == 403 {
        let lower = String::from_utf8_lossy(body).to_lowercase();
        if lower.contains("captcha")
            || lower.contains("challenge")
            || lower.contains("access denied")
            || lower.contains("cf-browser-verification")
        {
            return true;
        }
    }
    if status == 503 {
        let lower = String::from_utf8_lossy(body).to_lowercase();
        if lower.contains("cloudflare") || lower.contains("cf-ray") {
            return true;
        }
    }
    if is_html && body.is_empty() {
        return true;
    }
    false
}

/// Retry helper shared by strategies that want exponential backoff: up to
/// `max_attempts`, retrying only `Network` errors that are not the
/// escalation-recoverable TLS/cloudflare variants left to the caller.
pub async fn retry_with_backoff<F, Fut>(max_attempts: u32, mut attempt: F) -> Result<FetchResult>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<FetchResult>>,
{
    let mut last_err: Option<WebPeelError> = None;
    for n in 0..max_attempts {
        match attempt().await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable_transient() && n + 1 < max_attempts => {
                let backoff = Duration::from_millis(200 * 2u64.pow(n));
                tokio::time::sleep(backoff).await;
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| WebPeelError::Internal("retry loop exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_blocked_403_with_captcha_marker() {
        assert!(classify_blocked(403, "text/html", b"please solve this captcha"));
    }

    #[test]
    fn classify_blocked_503_cloudflare() {
        assert!(classify_blocked(503, "text/html", b"cloudflare ray id 123"));
    }

    #[test]
    fn classify_not_blocked_plain_404() {
        assert!(!classify_blocked(404, "text/html", b"not found"));
    }

    #[test]
    fn classify_blocked_empty_html_body() {
        assert!(classify_blocked(200, "text/html; charset=utf-8", b""));
    }
}
