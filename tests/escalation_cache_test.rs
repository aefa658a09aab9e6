//! The escalation engine's stale-while-revalidate cache should shield a
//! repeated fetch of the same URL from hitting the underlying strategy.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use webpeel::error::WebPeelError;
use webpeel::escalation::EscalationEngine;
use webpeel::fetch::{FetchMethod, FetchOptions};
use webpeel::response_cache::ResponseCache;

use common::{always_ok, ok_result, ScriptedFetcher};

#[tokio::test]
async fn repeated_fetch_of_same_url_hits_cache_once() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let browser = ScriptedFetcher::new(FetchMethod::Browser, always_ok);
    let stealth = ScriptedFetcher::new(FetchMethod::Stealth, always_ok);
    let calls = plain.calls.clone();

    let cache = Arc::new(ResponseCache::new());
    let engine = EscalationEngine::new(cache, plain, browser, stealth, None, None);

    let first = engine.fetch("http://example.com/a", FetchOptions::default()).await.unwrap();
    let second = engine.fetch("http://example.com/a", FetchOptions::default()).await.unwrap();

    assert_eq!(first.status, second.status);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successful_fetch_is_stamped_with_a_content_fingerprint() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let browser = ScriptedFetcher::new(FetchMethod::Browser, always_ok);
    let stealth = ScriptedFetcher::new(FetchMethod::Stealth, always_ok);

    let cache = Arc::new(ResponseCache::new());
    let engine = EscalationEngine::new(cache, plain, browser, stealth, None, None);

    let result = engine.fetch("http://example.com/fingerprint", FetchOptions::default()).await.unwrap();

    assert_eq!(result.content_fingerprint.len(), 64);
    assert!(result.content_fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn distinct_urls_each_trigger_their_own_fetch() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, always_ok);
    let browser = ScriptedFetcher::new(FetchMethod::Browser, always_ok);
    let stealth = ScriptedFetcher::new(FetchMethod::Stealth, always_ok);
    let calls = plain.calls.clone();

    let cache = Arc::new(ResponseCache::new());
    let engine = EscalationEngine::new(cache, plain, browser, stealth, None, None);

    engine.fetch("http://example.com/a", FetchOptions::default()).await.unwrap();
    engine.fetch("http://example.com/b", FetchOptions::default()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

fn blocked_always(_url: &str) -> webpeel::error::Result<webpeel::fetch::FetchResult> {
    Err(WebPeelError::Blocked("captcha challenge".to_string()))
}

fn browser_ok(_url: &str) -> webpeel::error::Result<webpeel::fetch::FetchResult> {
    ok_result("<html><body>passed</body></html>", FetchMethod::Browser)
}

#[tokio::test]
async fn blocked_plain_fetch_escalates_to_browser() {
    let plain = ScriptedFetcher::new(FetchMethod::Simple, blocked_always);
    let browser = ScriptedFetcher::new(FetchMethod::Browser, browser_ok);
    let stealth = ScriptedFetcher::new(FetchMethod::Stealth, always_ok);
    let plain_calls = plain.calls.clone();
    let browser_calls = browser.calls.clone();

    let cache = Arc::new(ResponseCache::new());
    let engine = EscalationEngine::new(cache, plain, browser, stealth, None, None);

    let result = engine.fetch("http://example.com/retry", FetchOptions::default()).await.unwrap();

    assert_eq!(result.method, FetchMethod::Browser);
    assert_eq!(plain_calls.load(Ordering::SeqCst), 1);
    assert_eq!(browser_calls.load(Ordering::SeqCst), 1);
}
