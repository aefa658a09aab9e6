// WebPeel HTTP server: binds the fetch escalation core to an axum edge.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use webpeel::browser_pool::BrowserPool;
use webpeel::checkpoint::Checkpointer;
use webpeel::config::AppConfig;
use webpeel::dns_cache::{DnsCache, WARMUP_DOMAINS};
use webpeel::escalation::EscalationEngine;
use webpeel::fetch::browser::BrowserFetcher;
use webpeel::fetch::edge_worker::EdgeWorkerFetcher;
use webpeel::fetch::mirror::MirrorFetcher;
use webpeel::fetch::plain::PlainFetcher;
use webpeel::fetch::stealth::StealthFetcher;
use webpeel::http::auth::InMemoryApiKeyResolver;
use webpeel::http::{build_router, AppState};
use webpeel::job_queue::JobQueue;
use webpeel::rate_limiter::RateLimiter;
use webpeel::response_cache::ResponseCache;
use webpeel::webhook::WebhookSender;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("loading configuration from environment")?;

    let dns_cache = Arc::new(DnsCache::new());
    dns_cache.warmup(WARMUP_DOMAINS);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("building shared http client")?;

    let browser_pool = BrowserPool::new(config.browser_pool.clone());
    browser_pool.start().await.context("starting browser pool")?;

    let plain = Arc::new(PlainFetcher::new(Arc::clone(&dns_cache)).context("building plain fetcher")?);
    let browser = Arc::new(BrowserFetcher::new(Arc::clone(&browser_pool)));
    let stealth = Arc::new(StealthFetcher::new(Arc::clone(&browser_pool)));
    let mirror = Some(Arc::new(MirrorFetcher::new(http_client.clone())) as Arc<dyn webpeel::fetch::FetchStrategy>);
    let edge_worker = EdgeWorkerFetcher::from_env(http_client.clone())
        .map(|f| Arc::new(f) as Arc<dyn webpeel::fetch::FetchStrategy>);

    if edge_worker.is_none() {
        tracing::info!("WEBPEEL_CF_WORKER_URL not set, edge-worker fallback disabled");
    }

    let cache = Arc::new(ResponseCache::new());
    let escalation = Arc::new(EscalationEngine::new(
        Arc::clone(&cache),
        plain,
        browser,
        stealth,
        mirror,
        edge_worker,
    ));

    let webhook_sender = Arc::new(WebhookSender::new(http_client.clone()));
    let job_queue = Arc::new(JobQueue::new(Arc::clone(&webhook_sender)));
    job_queue.start().await;

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit_window));
    Arc::clone(&rate_limiter).spawn_cleanup_task(config.rate_limit_window);

    let checkpointer = Arc::new(Checkpointer::new(config.checkpoint_root.clone()));

    let state = AppState {
        escalation,
        job_queue: Arc::clone(&job_queue),
        rate_limiter,
        checkpointer,
        api_keys: Arc::new(InMemoryApiKeyResolver),
        config: Arc::new(config.clone()),
    };

    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding to {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "webpeel server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    job_queue.destroy().await;
    dns_cache.clear();
    browser_pool.shutdown().await.context("shutting down browser pool")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(%err, "failed to install ctrl-c handler"),
    }
}
