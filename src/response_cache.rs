//! In-memory LRU response cache with TTL, stale-while-revalidate, and
//! single-flight revalidation (C3).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Result, WebPeelError};
use crate::fetch::FetchResult;

pub const MAX_ENTRIES: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const STALE_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const REVALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct CacheEntry {
    result: FetchResult,
    timestamp: Instant,
    revalidating: bool,
    revalidating_at: Option<Instant>,
}

/// Outcome of `get_with_swr`.
#[derive(Clone)]
pub struct SwrValue {
    pub value: FetchResult,
    pub stale: bool,
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    /// LRU order, front = least-recently-used, back = most-recently-used.
    order: Vec<String>,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    fn evict_to_capacity(&mut self) {
        while self.entries.len() > MAX_ENTRIES {
            if self.order.is_empty() {
                break;
            }
            let lru_key = self.order.remove(0);
            self.entries.remove(&lru_key);
        }
    }
}

pub struct ResponseCache {
    inner: Mutex<Inner>,
    ttl: Mutex<Duration>,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { entries: HashMap::new(), order: Vec::new() }),
            ttl: Mutex::new(DEFAULT_TTL),
        }
    }

    fn ttl(&self) -> Duration {
        *self.ttl.lock()
    }

    /// Returns the value only when `age <= TTL`. An entry older than
    /// `TTL + STALE_WINDOW` is evicted on access. Reads touch LRU.
    pub fn get(&self, url: &str) -> Option<FetchResult> {
        let ttl = self.ttl();
        let mut inner = self.inner.lock();
        let age = inner.entries.get(url).map(|e| e.timestamp.elapsed())?;

        if age > ttl + STALE_WINDOW {
            inner.remove(url);
            return None;
        }
        if age > ttl {
            return None;
        }

        inner.touch(url);
        inner.entries.get(url).map(|e| e.result.clone())
    }

    /// Returns `{value, stale}` where `stale = TTL < age <= TTL + STALE`.
    pub fn get_with_swr(&self, url: &str) -> Option<SwrValue> {
        let ttl = self.ttl();
        let mut inner = self.inner.lock();
        let age = inner.entries.get(url).map(|e| e.timestamp.elapsed())?;

        if age > ttl + STALE_WINDOW {
            inner.remove(url);
            return None;
        }

        inner.touch(url);
        let result = inner.entries.get(url).map(|e| e.result.clone())?;
        Some(SwrValue { value: result, stale: age > ttl })
    }

    /// Single-flight guard: succeeds only if the entry is stale and either
    /// not currently revalidating, or its prior revalidation began more
    /// than `REVALIDATION_TIMEOUT` ago.
    pub fn mark_revalidating(&self, url: &str) -> bool {
        let ttl = self.ttl();
        let mut inner = self.inner.lock();
        inner.touch(url);

        let Some(entry) = inner.entries.get_mut(url) else { return false };
        let age = entry.timestamp.elapsed();
        if age <= ttl || age > ttl + STALE_WINDOW {
            return false;
        }

        let can_start = !entry.revalidating
            || entry
                .revalidating_at
                .map(|started| started.elapsed() > REVALIDATION_TIMEOUT)
                .unwrap_or(true);

        if can_start {
            entry.revalidating = true;
            entry.revalidating_at = Some(Instant::now());
        }
        can_start
    }

    /// Clears the single-flight guard after a revalidation completes
    /// (success or failure) so a future stale read can retry.
    pub fn clear_revalidating(&self, url: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(url) {
            entry.revalidating = false;
            entry.revalidating_at = None;
        }
    }

    /// Inserts as MRU, evicting from the LRU end until `size <= MAX_ENTRIES`.
    pub fn set(&self, url: &str, result: FetchResult) {
        let mut inner = self.inner.lock();
        inner.entries.insert(
            url.to_string(),
            CacheEntry { result, timestamp: Instant::now(), revalidating: false, revalidating_at: None },
        );
        inner.touch(url);
        if !inner.order.contains(&url.to_string()) {
            inner.order.push(url.to_string());
        }
        inner.evict_to_capacity();
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn set_ttl(&self, ms: u64) -> Result<()> {
        if ms == 0 {
            return Err(WebPeelError::Config("ttl must be > 0".to_string()));
        }
        *self.ttl.lock() = Duration::from_millis(ms);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchMethod;
    use std::collections::HashMap as Map;

    fn sample_result() -> FetchResult {
        FetchResult {
            final_url: "https://example.com/".to_string(),
            status: 200,
            body: b"hello".to_vec(),
            content_type: "text/html".to_string(),
            headers: Map::new(),
            timing_ms: 10,
            method: FetchMethod::Simple,
            screenshot: None,
            mirror_cached_at: None,
        }
    }

    #[test]
    fn set_then_get_returns_value_within_ttl() {
        let cache = ResponseCache::new();
        cache.set("u", sample_result());
        assert!(cache.get("u").is_some());
    }

    #[test]
    fn get_returns_none_past_ttl() {
        let cache = ResponseCache::new();
        cache.set_ttl(1).unwrap();
        cache.set("u", sample_result());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("u").is_none());
    }

    #[test]
    fn swr_reports_stale_between_ttl_and_stale_window() {
        let cache = ResponseCache::new();
        cache.set_ttl(1).unwrap();
        cache.set("u", sample_result());
        std::thread::sleep(Duration::from_millis(20));
        let swr = cache.get_with_swr("u").unwrap();
        assert!(swr.stale);
    }

    #[test]
    fn entry_past_stale_window_is_gone_from_both_reads() {
        let cache = ResponseCache::new();
        cache.set_ttl(1).unwrap();
        {
            let mut inner = cache.inner.lock();
            inner.entries.insert(
                "u".to_string(),
                CacheEntry {
                    result: sample_result(),
                    timestamp: Instant::now() - (STALE_WINDOW + Duration::from_secs(1)),
                    revalidating: false,
                    revalidating_at: None,
                },
            );
            inner.order.push("u".to_string());
        }
        assert!(cache.get("u").is_none());
        assert!(cache.get_with_swr("u").is_none());
    }

    #[test]
    fn mark_revalidating_is_single_flight() {
        let cache = ResponseCache::new();
        cache.set_ttl(1).unwrap();
        cache.set("u", sample_result());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.mark_revalidating("u"));
        assert!(!cache.mark_revalidating("u"));
    }

    #[test]
    fn set_ttl_rejects_zero() {
        let cache = ResponseCache::new();
        assert!(cache.set_ttl(0).is_err());
    }

    #[test]
    fn eviction_keeps_size_at_or_under_max_entries() {
        let cache = ResponseCache::new();
        for i in 0..(MAX_ENTRIES + 10) {
            cache.set(&format!("u{i}"), sample_result());
        }
        assert!(cache.len() <= MAX_ENTRIES);
    }
}
