//! URL validation helpers used ahead of normalization and fetch dispatch.

/// Check if a URL is a fetchable http/https URL.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_schemes() {
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("data:text/plain,hi"));
        assert!(!is_valid_url("mailto:a@b.com"));
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_url("http://example.com"));
        assert!(is_valid_url("https://example.com/path"));
    }

    #[test]
    fn rejects_empty_and_unparseable() {
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("not a url"));
    }
}
