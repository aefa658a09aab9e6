//! Headless-browser fetch strategy (C5), driving a pooled Chrome instance.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::page::ScreenshotParams;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser_pool::BrowserPool;
use crate::error::{Result, WebPeelError};

use super::{FetchMethod, FetchOptions, FetchResult, FetchStrategy, ResourceClass, ScriptAction};

pub struct BrowserFetcher {
    pool: Arc<BrowserPool>,
    stealth: bool,
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool, stealth: false }
    }

    /// Same pool, but every navigation also runs `browser_setup::apply_stealth_measures`.
    #[must_use]
    pub fn new_stealth(pool: Arc<BrowserPool>) -> Self {
        Self { pool, stealth: true }
    }

    async fn run_action(&self, page: &chromiumoxide::Page, action: &ScriptAction) -> Result<()> {
        match action {
            ScriptAction::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            ScriptAction::Click { selector } => {
                let element = page
                    .find_element(selector)
                    .await
                    .map_err(|e| WebPeelError::Network(format!("selector {selector} not found: {e}")))?;
                element
                    .click()
                    .await
                    .map_err(|e| WebPeelError::Network(format!("click failed: {e}")))?;
            }
            ScriptAction::Scroll { x, y } => {
                let script = format!("window.scrollTo({x}, {y});");
                page.evaluate(script.as_str())
                    .await
                    .map_err(|e| WebPeelError::Network(format!("scroll failed: {e}")))?;
            }
            ScriptAction::Type { selector, text } | ScriptAction::Fill { selector, value: text } => {
                let element = page
                    .find_element(selector)
                    .await
                    .map_err(|e| WebPeelError::Network(format!("selector {selector} not found: {e}")))?;
                element
                    .click()
                    .await
                    .map_err(|e| WebPeelError::Network(format!("focus failed: {e}")))?;
                element
                    .type_str(text)
                    .await
                    .map_err(|e| WebPeelError::Network(format!("type failed: {e}")))?;
            }
            ScriptAction::Select { selector, value } => {
                let script = format!(
                    "(function(){{const el=document.querySelector({selector:?});if(el){{el.value={value:?};el.dispatchEvent(new Event('change'));}}}})();"
                );
                page.evaluate(script.as_str())
                    .await
                    .map_err(|e| WebPeelError::Network(format!("select failed: {e}")))?;
            }
            ScriptAction::Press { key } => {
                page.press_key(key.as_str())
                    .await
                    .map_err(|e| WebPeelError::Network(format!("press failed: {e}")))?;
            }
            ScriptAction::Hover { selector } => {
                let element = page
                    .find_element(selector)
                    .await
                    .map_err(|e| WebPeelError::Network(format!("selector {selector} not found: {e}")))?;
                element
                    .hover()
                    .await
                    .map_err(|e| WebPeelError::Network(format!("hover failed: {e}")))?;
            }
            ScriptAction::WaitForSelector { selector, timeout_ms } => {
                let deadline = Duration::from_millis(timeout_ms.unwrap_or(10_000));
                let start = Instant::now();
                loop {
                    if page.find_element(selector).await.is_ok() {
                        break;
                    }
                    if start.elapsed() > deadline {
                        return Err(WebPeelError::Timeout(deadline));
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
            ScriptAction::Screenshot => {}
        }
        Ok(())
    }

    /// Enables CDP `Fetch` interception and fails requests whose resource
    /// type is in `classes`, continuing everything else. Returns a handle
    /// to the background listener task so the caller can abort it once the
    /// page is closed.
    async fn block_resources(page: &chromiumoxide::Page, classes: &[ResourceClass]) -> Result<Option<JoinHandle<()>>> {
        if classes.is_empty() {
            return Ok(None);
        }
        let blocked: HashSet<ResourceType> = classes
            .iter()
            .map(|c| match c {
                ResourceClass::Image => ResourceType::Image,
                ResourceClass::Stylesheet => ResourceType::Stylesheet,
                ResourceClass::Font => ResourceType::Font,
                ResourceClass::Media => ResourceType::Media,
                ResourceClass::Script => ResourceType::Script,
            })
            .collect();

        let enable_params = EnableParams::builder()
            .patterns(vec![RequestPattern::builder()
                .url_pattern("*")
                .request_stage(RequestStage::Request)
                .build()
                .map_err(|e| WebPeelError::Internal(format!("request pattern config: {e}")))?])
            .build()
            .map_err(|e| WebPeelError::Internal(format!("fetch enable config: {e}")))?;

        page.execute(enable_params)
            .await
            .map_err(|e| WebPeelError::Internal(format!("fetch interception enable failed: {e}")))?;

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| WebPeelError::Internal(format!("request-paused subscription failed: {e}")))?;
        let page = page.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                if blocked.contains(&event.resource_type) {
                    let _ = page
                        .execute(FailRequestParams { request_id, error_reason: ErrorReason::BlockedByClient })
                        .await;
                    continue;
                }
                match ContinueRequestParams::builder().request_id(request_id).build() {
                    Ok(params) => {
                        let _ = page.execute(params).await;
                    }
                    Err(e) => warn!(%e, "continue-request build failed"),
                }
            }
        });

        Ok(Some(handle))
    }
}

#[async_trait]
impl FetchStrategy for BrowserFetcher {
    fn method(&self) -> FetchMethod {
        if self.stealth { FetchMethod::Stealth } else { FetchMethod::Browser }
    }

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        let started = Instant::now();
        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|e| WebPeelError::Internal(format!("browser pool acquire failed: {e}")))?;

        let page = guard
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| WebPeelError::Internal(format!("new page failed: {e}")))?;

        if let Some(device) = opts.device {
            let (width, height) = device.viewport();
            let params = SetDeviceMetricsOverrideParams::builder()
                .width(i64::from(width))
                .height(i64::from(height))
                .device_scale_factor(1.0)
                .mobile(matches!(device, super::DeviceProfile::Mobile))
                .build()
                .map_err(|e| WebPeelError::Internal(format!("viewport config: {e}")))?;
            let _ = page.execute(params).await;
        }

        let resource_blocker = Self::block_resources(&page, &opts.block_resources).await?;

        if self.stealth {
            crate::browser_setup::apply_stealth_measures(&page)
                .await
                .map_err(|e| WebPeelError::Internal(format!("stealth setup failed: {e}")))?;
        }

        page.goto(url)
            .await
            .map_err(|e| WebPeelError::Network(format!("navigation failed: {e}")))?;
        page.wait_for_navigation()
            .await
            .map_err(|e| WebPeelError::Network(format!("navigation wait failed: {e}")))?;

        if let Some(wait_ms) = opts.wait_ms {
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        for action in &opts.actions {
            self.run_action(&page, action).await?;
        }

        let screenshot = if opts.screenshot {
            match page
                .screenshot(ScreenshotParams::builder().full_page(true).build())
                .await
            {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(%url, %e, "screenshot capture failed");
                    None
                }
            }
        } else {
            None
        };

        let html = page
            .content()
            .await
            .map_err(|e| WebPeelError::Network(format!("content read failed: {e}")))?;

        let final_url = page.url().await.ok().flatten().unwrap_or_else(|| url.to_string());

        if !opts.keep_page_open {
            if let Some(handle) = resource_blocker {
                handle.abort();
            }
            let _ = page.close().await;
        }
        debug!(%url, elapsed_ms = started.elapsed().as_millis(), "browser fetch complete");

        Ok(FetchResult {
            final_url,
            status: 200,
            body: html.into_bytes(),
            content_type: "text/html".to_string(),
            headers: Default::default(),
            timing_ms: started.elapsed().as_millis() as u64,
            method: self.method(),
            screenshot,
            mirror_cached_at: None,
            content_fingerprint: String::new(),
        })
    }
}
