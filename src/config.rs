//! Server-level configuration: one explicit record built at process start
//! and injected into every component per the no-hidden-globals design note.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser_pool::BrowserPoolConfig;
use crate::checkpoint::Checkpointer;
use crate::error::{Result, WebPeelError};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub default_rate_limit: u32,
    pub rate_limit_window: Duration,
    pub cache_ttl: Duration,
    pub browser_pool: BrowserPoolConfig,
    pub checkpoint_root: PathBuf,
    pub snapshot_root: PathBuf,
    pub production: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("valid default socket addr"),
            default_rate_limit: 60,
            rate_limit_window: crate::rate_limiter::DEFAULT_WINDOW,
            cache_ttl: crate::response_cache::DEFAULT_TTL,
            browser_pool: BrowserPoolConfig::default(),
            checkpoint_root: Checkpointer::default_root(),
            snapshot_root: Self::default_snapshot_root(),
            production: false,
        }
    }
}

impl AppConfig {
    fn default_snapshot_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".webpeel")
            .join("snapshots")
    }

    /// Reads overrides from the environment; unset variables keep the
    /// built-in default.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WEBPEEL_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| WebPeelError::Config(format!("invalid WEBPEEL_BIND_ADDR: {e}")))?;
        }
        if let Ok(limit) = std::env::var("WEBPEEL_DEFAULT_RATE_LIMIT") {
            config.default_rate_limit = limit
                .parse()
                .map_err(|e| WebPeelError::Config(format!("invalid WEBPEEL_DEFAULT_RATE_LIMIT: {e}")))?;
        }
        if let Ok(ttl) = std::env::var("WEBPEEL_CACHE_TTL_MS") {
            let ms: u64 = ttl
                .parse()
                .map_err(|e| WebPeelError::Config(format!("invalid WEBPEEL_CACHE_TTL_MS: {e}")))?;
            if ms == 0 {
                return Err(WebPeelError::Config("WEBPEEL_CACHE_TTL_MS must be > 0".to_string()));
            }
            config.cache_ttl = Duration::from_millis(ms);
        }

        config.production = matches!(
            std::env::var("NODE_ENV").as_deref(),
            Ok("production")
        );

        Ok(config)
    }

    #[must_use]
    pub fn edge_worker_configured() -> bool {
        std::env::var("WEBPEEL_CF_WORKER_URL").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_to_8080() {
        assert_eq!(AppConfig::default().bind_addr.port(), 8080);
    }

    #[test]
    fn from_env_rejects_invalid_bind_addr() {
        std::env::set_var("WEBPEEL_BIND_ADDR", "not-an-addr");
        let result = AppConfig::from_env();
        std::env::remove_var("WEBPEEL_BIND_ADDR");
        assert!(result.is_err());
    }
}
