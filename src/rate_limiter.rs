//! Sliding-window per-identifier admission control (C4).
//!
//! Grounded in the teacher's lock-free `DashMap`-per-identifier idiom
//! (`crawl_engine/rate_limiter.rs`), but implements a sliding window rather
//! than token bucket: the spec requires `retryAfter` derived from the
//! oldest timestamp in the active window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy)]
pub struct LimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    window: Duration,
    entries: DashMap<String, Mutex<VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { window, entries: DashMap::new() }
    }

    #[must_use]
    pub fn with_default_window() -> Self {
        Self::new(DEFAULT_WINDOW)
    }

    /// Atomically: drops timestamps `<= now - window`, then either denies
    /// (sequence length >= `limit`) or admits and appends `now`.
    pub fn check_limit(&self, id: &str, limit: u32) -> LimitDecision {
        let now = Instant::now();
        let window = self.window;

        let entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut seq = entry.lock();

        while let Some(&oldest) = seq.front() {
            if now.duration_since(oldest) >= window {
                seq.pop_front();
            } else {
                break;
            }
        }

        if seq.len() as u32 >= limit {
            let oldest = *seq.front().expect("len >= limit > 0 implies non-empty");
            let reset_at = oldest + window;
            let retry_after_secs = reset_at.saturating_duration_since(now).as_secs_f64().ceil() as u64;
            return LimitDecision { allowed: false, remaining: 0, retry_after_secs };
        }

        seq.push_back(now);
        LimitDecision { allowed: true, remaining: limit - seq.len() as u32, retry_after_secs: 0 }
    }

    /// Prunes expired timestamps and removes identifiers with empty
    /// sequences. Intended to be invoked periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        let mut empty_keys = Vec::new();

        for entry in self.entries.iter() {
            let mut seq = entry.value().lock();
            while let Some(&oldest) = seq.front() {
                if now.duration_since(oldest) >= window {
                    seq.pop_front();
                } else {
                    break;
                }
            }
            if seq.is_empty() {
                empty_keys.push(entry.key().clone());
            }
        }

        for key in empty_keys {
            self.entries.remove_if(&key, |_, v| v.lock().is_empty());
        }
    }

    /// Spawns a periodic cleanup task; returns its handle for shutdown.
    pub fn spawn_cleanup_task(self: std::sync::Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.cleanup();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        assert!(limiter.check_limit("k", 3).allowed);
        assert!(limiter.check_limit("k", 3).allowed);
        assert!(limiter.check_limit("k", 3).allowed);
        let fourth = limiter.check_limit("k", 3);
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
    }

    #[test]
    fn retry_after_is_derived_from_oldest_timestamp() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        for _ in 0..3 {
            limiter.check_limit("k", 3);
        }
        let denial = limiter.check_limit("k", 3);
        assert!(!denial.allowed);
        assert!(denial.retry_after_secs >= 59);
    }

    #[test]
    fn distinct_identifiers_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        assert!(limiter.check_limit("a", 1).allowed);
        assert!(limiter.check_limit("b", 1).allowed);
        assert!(!limiter.check_limit("a", 1).allowed);
    }

    #[test]
    fn cleanup_removes_identifiers_with_empty_sequences() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        limiter.check_limit("k", 5);
        std::thread::sleep(Duration::from_millis(30));
        limiter.cleanup();
        assert!(limiter.entries.is_empty());
    }
}
