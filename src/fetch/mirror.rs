//! Third-party mirror fetch strategy (C5).
//!
//! Retrieves a cached copy of the page from a public mirror. The exact DOM
//! of a cache mirror (e.g. Google Cache) is external and unstable, so the
//! wrapper-stripping here is explicitly best-effort: fall through unchanged
//! when markers are absent, per the spec's open question on this point.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{Result, WebPeelError};

use super::{FetchMethod, FetchOptions, FetchResult, FetchStrategy};

const MIN_BODY_LEN: usize = 200;
const MIRROR_HOST: &str = "webcache.googleusercontent.com";

const NOTICE_KEYWORDS: &[&str] = &["This is Google's cache", "cached page"];
const WRAPPER_DIV_IDS: &[&str] = &["google-cache-hdr", "google-header-bar"];

pub struct MirrorFetcher {
    client: Client,
}

impl MirrorFetcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn mirror_url(target: &str) -> String {
        format!("https://{MIRROR_HOST}/search?q=cache:{target}")
    }

    /// Detects a mirror miss: 404, redirect away from the mirror host,
    /// search-results markers, or a body shorter than `MIN_BODY_LEN`.
    fn is_miss(status: u16, final_host: Option<&str>, body: &str) -> bool {
        if status == 404 {
            return true;
        }
        if let Some(host) = final_host {
            if host != MIRROR_HOST {
                return true;
            }
        }
        if body.len() < MIN_BODY_LEN {
            return true;
        }
        let lower = body.to_lowercase();
        if lower.contains("did not match any documents") || lower.contains("search results") {
            return true;
        }
        false
    }

    fn extract_cached_at(body: &str) -> Option<String> {
        let marker = "This is Google's cache of ";
        let idx = body.find(marker)?;
        let rest = &body[idx + marker.len()..];
        let snapshot_marker = "as retrieved on ";
        let snap_idx = rest.find(snapshot_marker)?;
        let after = &rest[snap_idx + snapshot_marker.len()..];
        let end = after.find('<').unwrap_or(after.len());
        Some(after[..end].trim().to_string())
    }

    /// Strips the mirror's wrapper chrome: locates the first `<hr>` after a
    /// known notice keyword and keeps the suffix; also removes known
    /// wrapper DIVs by id. Falls through unchanged when markers are absent.
    fn strip_wrapper(body: &str) -> String {
        let mut stripped = body;

        for keyword in NOTICE_KEYWORDS {
            if let Some(notice_idx) = stripped.find(keyword) {
                if let Some(hr_offset) = stripped[notice_idx..].find("<hr") {
                    let hr_idx = notice_idx + hr_offset;
                    if let Some(close_offset) = stripped[hr_idx..].find('>') {
                        stripped = &stripped[hr_idx + close_offset + 1..];
                        break;
                    }
                }
            }
        }

        let mut result = stripped.to_string();
        for id in WRAPPER_DIV_IDS {
            let needle = format!(r#"id="{id}""#);
            if let Some(div_start_offset) = result.find(&needle) {
                if let Some(tag_open) = result[..div_start_offset].rfind("<div") {
                    if let Some(close_offset) = result[div_start_offset..].find("</div>") {
                        let div_end = div_start_offset + close_offset + "</div>".len();
                        result.replace_range(tag_open..div_end, "");
                    }
                }
            }
        }
        result
    }
}

#[async_trait]
impl FetchStrategy for MirrorFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Mirror
    }

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let started = Instant::now();
        let mirror_url = Self::mirror_url(url);

        let response = self
            .client
            .get(&mirror_url)
            .timeout(opts.timeout())
            .send()
            .await
            .map_err(WebPeelError::from)?;

        let status = response.status().as_u16();
        let final_host = response.url().host_str().map(str::to_string);
        let body_bytes = response.bytes().await.map_err(WebPeelError::from)?;
        let body_str = String::from_utf8_lossy(&body_bytes).to_string();

        if Self::is_miss(status, final_host.as_deref(), &body_str) {
            return Err(WebPeelError::Network("mirror miss".to_string()));
        }

        let cached_at = Self::extract_cached_at(&body_str);
        let cleaned = Self::strip_wrapper(&body_str);

        Ok(FetchResult {
            final_url: url.to_string(),
            status: 200,
            body: cleaned.into_bytes(),
            content_type: "text/html".to_string(),
            headers: Default::default(),
            timing_ms: started.elapsed().as_millis() as u64,
            method: FetchMethod::Mirror,
            screenshot: None,
            mirror_cached_at: cached_at,
            content_fingerprint: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_is_treated_as_miss() {
        assert!(MirrorFetcher::is_miss(200, Some(MIRROR_HOST), "short"));
    }

    #[test]
    fn not_found_is_a_miss() {
        assert!(MirrorFetcher::is_miss(404, Some(MIRROR_HOST), &"x".repeat(500)));
    }

    #[test]
    fn redirect_away_from_mirror_host_is_a_miss() {
        assert!(MirrorFetcher::is_miss(200, Some("example.com"), &"x".repeat(500)));
    }

    #[test]
    fn long_body_on_mirror_host_is_a_hit() {
        assert!(!MirrorFetcher::is_miss(200, Some(MIRROR_HOST), &"x".repeat(500)));
    }

    #[test]
    fn strip_wrapper_falls_through_unchanged_without_markers() {
        let body = "<html><body>plain content</body></html>";
        assert_eq!(MirrorFetcher::strip_wrapper(body), body);
    }

    #[test]
    fn strip_wrapper_keeps_suffix_after_hr() {
        let body = "This is Google's cache of page<hr>real content here";
        assert_eq!(MirrorFetcher::strip_wrapper(body), "real content here");
    }
}
