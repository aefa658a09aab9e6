//! Unified error taxonomy shared by the fetch pipeline and the HTTP edge.
//!
//! Every fetch strategy and core component returns [`WebPeelError`]. The HTTP
//! edge maps each variant to the status code and `error` kind from spec
//! section 7 via [`WebPeelError::kind`] / [`WebPeelError::status_code`].

use std::fmt;

/// Abstract error kinds, stable across the library and the HTTP boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WebPeelError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("blocked: {0}")]
    Blocked(String),

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Stable string discriminant used in the JSON error envelope (`{"error": "<kind>"}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    InvalidUrl,
    AuthenticationRequired,
    RateLimited,
    Blocked,
    Timeout,
    Network,
    NotImplemented,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidUrl => "invalid_url",
            Self::AuthenticationRequired => "authentication_required",
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::NotImplemented => "not_implemented",
            Self::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}

impl WebPeelError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) => ErrorKind::InvalidRequest,
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::AuthenticationRequired => ErrorKind::AuthenticationRequired,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Blocked(_) => ErrorKind::Blocked,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::Network,
            Self::NotImplemented(_) | Self::Unsupported(_) => ErrorKind::NotImplemented,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InvalidRequest | ErrorKind::InvalidUrl => 400,
            ErrorKind::AuthenticationRequired => 401,
            ErrorKind::RateLimited => 429,
            ErrorKind::Blocked => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Network => 502,
            ErrorKind::NotImplemented => 501,
            ErrorKind::InternalError => 500,
        }
    }

    /// Recoverable within a single escalation attempt (spec section 7):
    /// `Blocked` and the two named `Network` sub-cases.
    #[must_use]
    pub fn is_recoverable_by_escalation(&self) -> bool {
        match self {
            Self::Blocked(_) => true,
            Self::Network(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("tls") || lower.contains("ssl") || lower.contains("cloudflare")
            }
            _ => false,
        }
    }

    /// Only `Network` errors that are not the recoverable TLS/cloudflare
    /// variants are retried by the per-strategy retry helper; `Blocked` and
    /// `Timeout` are never retried within a single strategy attempt.
    #[must_use]
    pub fn is_retryable_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<anyhow::Error> for WebPeelError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<reqwest::Error> for WebPeelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(std::time::Duration::from_secs(30))
        } else if err.is_connect() || err.is_request() {
            Self::Network(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, WebPeelError>;
