//! Escalation engine (C6): picks the initial fetcher, classifies failures,
//! and drives the fallback chain described in spec section 4.6.

use std::sync::Arc;

use regex::Regex;
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{Result, WebPeelError};
use crate::fetch::{fingerprint, FetchOptions, FetchResult, FetchStrategy};
use crate::response_cache::ResponseCache;
use crate::url_normalize::normalize;

const CLIENT_SHELL_TEXT_THRESHOLD: usize = 500;
const CLIENT_SHELL_HTML_THRESHOLD: usize = 1000;
const CLOUDFLARE_RETRY_WAIT_MS: u64 = 5000;
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;
const CIRCUIT_HALF_OPEN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

fn tag_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("static pattern"))
}

fn strip_tags(html: &str) -> String {
    tag_regex().replace_all(html, "").to_string()
}

fn is_reddit(host: &str) -> bool {
    host == "reddit.com" || host.ends_with(".reddit.com")
}

fn is_stealth_host(host: &str) -> bool {
    const HOSTS: &[&str] = &["glassdoor.com", "bloomberg.com"];
    HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase))
}

fn is_network_containing(err: &WebPeelError, needle: &str) -> bool {
    matches!(err, WebPeelError::Network(msg) if msg.to_lowercase().contains(needle))
}

fn stamp_fingerprint(mut result: FetchResult) -> FetchResult {
    result.content_fingerprint = fingerprint(&result.body);
    result
}

pub struct EscalationEngine {
    cache: Arc<ResponseCache>,
    circuit: Arc<CircuitBreaker>,
    plain: Arc<dyn FetchStrategy>,
    browser: Arc<dyn FetchStrategy>,
    stealth: Arc<dyn FetchStrategy>,
    mirror: Option<Arc<dyn FetchStrategy>>,
    edge_worker: Option<Arc<dyn FetchStrategy>>,
}

impl EscalationEngine {
    #[must_use]
    pub fn new(
        cache: Arc<ResponseCache>,
        plain: Arc<dyn FetchStrategy>,
        browser: Arc<dyn FetchStrategy>,
        stealth: Arc<dyn FetchStrategy>,
        mirror: Option<Arc<dyn FetchStrategy>>,
        edge_worker: Option<Arc<dyn FetchStrategy>>,
    ) -> Self {
        let circuit = Arc::new(CircuitBreaker::new(
            CIRCUIT_FAILURE_THRESHOLD,
            CIRCUIT_SUCCESS_THRESHOLD,
            CIRCUIT_HALF_OPEN_TIMEOUT,
        ));
        Self { cache, circuit, plain, browser, stealth, mirror, edge_worker }
    }

    /// Entry point: consults the SWR cache first, then drives the fallback
    /// chain on miss or stale-miss-without-single-flight.
    pub async fn fetch(&self, url: &str, opts: FetchOptions) -> Result<FetchResult> {
        let key = normalize(url);

        if let Some(swr) = self.cache.get_with_swr(&key) {
            if !swr.stale {
                return Ok(swr.value);
            }
            if self.cache.mark_revalidating(&key) {
                let this_url = url.to_string();
                let this_key = key.clone();
                let cache = Arc::clone(&self.cache);
                let engine = self.clone_handles();
                tokio::spawn(async move {
                    let result = engine.guarded_run_chain(&this_url, &opts).await;
                    match result {
                        Ok(fresh) => cache.set(&this_key, fresh),
                        Err(err) => warn!(url = %this_url, %err, "background revalidation failed"),
                    }
                    cache.clear_revalidating(&this_key);
                });
            }
            return Ok(swr.value);
        }

        let result = self.guarded_run_chain(url, &opts).await?;
        self.cache.set(&key, result.clone());
        Ok(result)
    }

    fn clone_handles(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            circuit: Arc::clone(&self.circuit),
            plain: Arc::clone(&self.plain),
            browser: Arc::clone(&self.browser),
            stealth: Arc::clone(&self.stealth),
            mirror: self.mirror.clone(),
            edge_worker: self.edge_worker.clone(),
        }
    }

    /// Wraps `run_chain` with the per-host circuit breaker: a domain that
    /// has failed past `CIRCUIT_FAILURE_THRESHOLD` consecutive times is
    /// short-circuited instead of re-tried through the full escalation
    /// chain, until its half-open timeout elapses.
    async fn guarded_run_chain(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let host = host_of(url).unwrap_or_default();

        if !self.circuit.should_attempt(&host) {
            return Err(WebPeelError::Blocked(format!("circuit open for {host}")));
        }

        let result = self.run_chain(url, opts).await;
        match &result {
            Ok(_) => self.circuit.record_success(&host),
            Err(err) => self.circuit.record_failure(&host, &err.to_string()),
        }
        result.map(stamp_fingerprint)
    }

    async fn run_chain(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let host = host_of(url).unwrap_or_default();

        let mut force_browser = opts.force_browser;
        let mut force_stealth = opts.stealth;

        if is_reddit(&host) {
            force_browser = true;
        }
        if is_stealth_host(&host) {
            force_stealth = true;
            force_browser = true;
        }

        let need_browser = force_browser || opts.screenshot || force_stealth;

        if !need_browser {
            match self.plain.fetch(url, opts).await {
                Ok(result) => {
                    if result.content_type.to_lowercase().contains("html") {
                        let body = result.body_as_str();
                        let raw_len = body.len();
                        if raw_len > CLIENT_SHELL_HTML_THRESHOLD {
                            let text_len = strip_tags(&body).trim().len();
                            if text_len < CLIENT_SHELL_TEXT_THRESHOLD {
                                info!(%url, "client-rendered shell detected, escalating to browser");
                                return self.browser_chain(url, opts, force_stealth).await;
                            }
                        }
                    }
                    return Ok(result);
                }
                Err(err) if err.is_recoverable_by_escalation() => {
                    info!(%url, %err, "plain fetch escalating to browser");
                }
                Err(err) => return Err(err),
            }
        }

        self.browser_chain(url, opts, force_stealth).await
    }

    async fn fetch_via(&self, stealth: bool, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        if stealth {
            self.stealth.fetch(url, opts).await
        } else {
            self.browser.fetch(url, opts).await
        }
    }

    async fn browser_chain(
        &self,
        url: &str,
        opts: &FetchOptions,
        initial_stealth: bool,
    ) -> Result<FetchResult> {
        let (failure, current_stealth) = match self.fetch_via(initial_stealth, url, opts).await {
            Ok(result) => return Ok(result),
            Err(WebPeelError::Blocked(_)) if !initial_stealth => {
                info!(%url, "browser attempt blocked, falling back to stealth");
                match self.fetch_via(true, url, opts).await {
                    Ok(result) => return Ok(result),
                    Err(err) => (err, true),
                }
            }
            Err(err) => (err, initial_stealth),
        };

        if is_network_containing(&failure, "cloudflare") {
            info!(%url, "cloudflare network error, retrying once with waitMs=5000");
            let mut retry_opts = opts.clone();
            retry_opts.wait_ms = Some(CLOUDFLARE_RETRY_WAIT_MS);
            return match self.fetch_via(current_stealth, url, &retry_opts).await {
                Ok(result) => Ok(result),
                Err(err) => self.terminal_fallback(url, opts, err).await,
            };
        }

        self.terminal_fallback(url, opts, failure).await
    }

    async fn terminal_fallback(
        &self,
        url: &str,
        opts: &FetchOptions,
        prior_err: WebPeelError,
    ) -> Result<FetchResult> {
        if let Some(mirror) = &self.mirror {
            if let Ok(result) = mirror.fetch(url, opts).await {
                info!(%url, "served from mirror after exhausting prior strategies");
                return Ok(result);
            }
        }
        if let Some(edge) = &self.edge_worker {
            if let Ok(result) = edge.fetch(url, opts).await {
                info!(%url, "served from edge-worker after exhausting prior strategies");
                return Ok(result);
            }
        }
        Err(prior_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reddit_host_is_detected() {
        assert!(is_reddit("www.reddit.com"));
        assert!(is_reddit("reddit.com"));
        assert!(!is_reddit("notreddit.com"));
    }

    #[test]
    fn stealth_hosts_detected() {
        assert!(is_stealth_host("www.glassdoor.com"));
        assert!(is_stealth_host("bloomberg.com"));
        assert!(!is_stealth_host("example.com"));
    }

    #[test]
    fn strip_tags_removes_markup() {
        assert_eq!(strip_tags("<p>hi <b>there</b></p>"), "hi there");
    }
}
