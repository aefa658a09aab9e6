//! Stealth fetch strategy: the browser strategy with anti-fingerprinting
//! hardening engaged (`browser_setup::apply_stealth_measures`).

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser_pool::BrowserPool;
use crate::error::Result;

use super::browser::BrowserFetcher;
use super::{FetchMethod, FetchOptions, FetchResult, FetchStrategy};

pub struct StealthFetcher {
    inner: BrowserFetcher,
}

impl StealthFetcher {
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { inner: BrowserFetcher::new_stealth(pool) }
    }
}

#[async_trait]
impl FetchStrategy for StealthFetcher {
    fn method(&self) -> FetchMethod {
        FetchMethod::Stealth
    }

    async fn fetch(&self, url: &str, opts: &FetchOptions) -> Result<FetchResult> {
        self.inner.fetch(url, opts).await
    }
}
