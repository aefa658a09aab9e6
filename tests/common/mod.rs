//! Shared fixtures for the integration tests: a scripted `FetchStrategy`
//! that never touches the network, and an `AppState` builder wired from it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use webpeel::checkpoint::Checkpointer;
use webpeel::config::AppConfig;
use webpeel::error::Result;
use webpeel::escalation::EscalationEngine;
use webpeel::fetch::{FetchMethod, FetchOptions, FetchResult, FetchStrategy};
use webpeel::http::auth::InMemoryApiKeyResolver;
use webpeel::http::AppState;
use webpeel::job_queue::JobQueue;
use webpeel::rate_limiter::RateLimiter;
use webpeel::response_cache::ResponseCache;
use webpeel::webhook::WebhookSender;

pub fn ok_result(body: &str, method: FetchMethod) -> Result<FetchResult> {
    Ok(FetchResult {
        final_url: "http://example.com/".to_string(),
        status: 200,
        body: body.as_bytes().to_vec(),
        content_type: "text/html".to_string(),
        headers: HashMap::new(),
        timing_ms: 1,
        method,
        screenshot: None,
        mirror_cached_at: None,
        content_fingerprint: String::new(),
    })
}

/// A fetch strategy whose response is picked by a plain function pointer,
/// so no per-test state needs to cross into an `async_trait` object.
pub struct ScriptedFetcher {
    pub method: FetchMethod,
    pub calls: Arc<AtomicUsize>,
    pub responder: fn(&str) -> Result<FetchResult>,
}

impl ScriptedFetcher {
    pub fn new(method: FetchMethod, responder: fn(&str) -> Result<FetchResult>) -> Arc<Self> {
        Arc::new(Self { method, calls: Arc::new(AtomicUsize::new(0)), responder })
    }
}

#[async_trait]
impl FetchStrategy for ScriptedFetcher {
    fn method(&self) -> FetchMethod {
        self.method
    }

    async fn fetch(&self, url: &str, _opts: &FetchOptions) -> Result<FetchResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(url)
    }
}

pub fn always_ok(_url: &str) -> Result<FetchResult> {
    ok_result("<html><body>hello</body></html>", FetchMethod::Simple)
}

/// Builds a fully wired `AppState` backed only by scripted fetchers, with a
/// generous rate limit unless overridden by the caller.
pub fn test_state(
    plain: Arc<dyn FetchStrategy>,
    browser: Arc<dyn FetchStrategy>,
    stealth: Arc<dyn FetchStrategy>,
    rate_limit: u32,
) -> AppState {
    let cache = Arc::new(ResponseCache::new());
    let escalation = Arc::new(EscalationEngine::new(cache, plain, browser, stealth, None, None));

    let client = reqwest::Client::new();
    let webhook_sender = Arc::new(WebhookSender::new(client));
    let job_queue = Arc::new(JobQueue::new(webhook_sender));

    let mut config = AppConfig::default();
    config.default_rate_limit = rate_limit;

    AppState {
        escalation,
        job_queue,
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_window)),
        checkpointer: Arc::new(Checkpointer::new(tempfile::tempdir().unwrap().into_path())),
        api_keys: Arc::new(InMemoryApiKeyResolver),
        config: Arc::new(config),
    }
}
