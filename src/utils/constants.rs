//! Shared constants used across fetch strategies and the browser pool.

/// Chrome user agent string for stealth mode and the plain fetcher's
/// default `User-Agent` header.
///
/// Updated: 2025-01-29 to Chrome 132 (current stable).
/// Reference: <https://chromiumdash.appspot.com/schedule>
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
