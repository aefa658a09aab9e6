//! Direct HTTP fetch over the transport bound to the DNS cache (C2).

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;

use crate::dns_cache::DnsCache;
use crate::error::{Result, WebPeelError};

use super::{classify_blocked, retry_with_backoff, FetchMethod, FetchOptions, FetchResult, FetchStrategy};

const MAX_ATTEMPTS: u32 = 3;

pub struct PlainFetcher {
    client: Client,
}

impl PlainFetcher {
    /// Builds a client whose DNS resolution goes through `dns_cache`.
    pub fn new(dns_cache: Arc<DnsCache>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .dns_resolver(dns_cache)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    async fn attempt(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let started = Instant::now();
        let mut request = self.client.get(url).timeout(opts.timeout());

        if let Some(ua) = &opts.user_agent {
            request = request.header(reqwest::header::USER_AGENT, ua);
        } else {
            request = request.header(reqwest::header::USER_AGENT, crate::utils::constants::CHROME_USER_AGENT);
        }
        for (name, value) in &opts.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !opts.cookies.is_empty() {
            let cookie_header = opts
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(reqwest::header::COOKIE, cookie_header);
        }

        let response = request.send().await.map_err(WebPeelError::from)?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(WebPeelError::from)?.to_vec();

        if classify_blocked(status, &content_type, &body) {
            return Err(WebPeelError::Blocked(format!("status {status} classified as blocked")));
        }

        Ok(FetchResult {
            final_url,
            status,
            body,
            content_type,
            headers,
            timing_ms: started.elapsed().as_millis() as u64,
            method: FetchMethod::Simple,
            screenshot: None,
            mirror_cached_at: None,
            content_fingerprint: String::new(),
        })
    }
}

#[async_trait]
impl FetchStrategy for PlainFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Simple
    }

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        retry_with_backoff(MAX_ATTEMPTS, || self.attempt(url, opts)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_agent_is_chrome_like() {
        assert!(crate::utils::constants::CHROME_USER_AGENT.contains("Chrome"));
    }
}
