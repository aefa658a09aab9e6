//! Canonical URL key derivation used by the response cache, the checkpointer,
//! and crawl dedup.

use url::Url;

/// Normalizes `raw` into a canonical string: lowercase host, default ports
/// stripped, fragment removed, empty path replaced with `/`, query
/// parameters sorted lexicographically by key (stable, so duplicate keys
/// keep their original relative order).
///
/// Idempotent: `normalize(&normalize(u)) == normalize(u)`. Falls back to the
/// trimmed original string when `raw` does not parse as a URL.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);

            if let Some(host) = url.host_str() {
                let lower = host.to_lowercase();
                if lower != host {
                    let _ = url.set_host(Some(&lower));
                }
            }

            let default_port = match url.scheme() {
                "http" => Some(80),
                "https" => Some(443),
                _ => None,
            };
            if url.port() == default_port {
                let _ = url.set_port(None);
            }

            if url.path().is_empty() {
                url.set_path("/");
            }

            let mut pairs: Vec<(String, String)> = url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));

            if pairs.is_empty() {
                url.set_query(None);
            } else {
                let mut serializer = url::form_urlencoded::Serializer::new(String::new());
                for (k, v) in &pairs {
                    serializer.append_pair(k, v);
                }
                url.set_query(Some(&serializer.finish()));
            }

            url.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_host_port_query_fragment() {
        let out = normalize("HTTPS://Example.COM:443/a/?b=2&a=1#x");
        assert_eq!(out, "https://example.com/a/?a=1&b=2");
    }

    #[test]
    fn is_idempotent() {
        let once = normalize("HTTP://Foo.com:80/bar?z=1&a=2#frag");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn equivalent_urls_normalize_equal() {
        let a = normalize("http://Example.com/path");
        let b = normalize("http://example.com:80/path");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_path_becomes_slash() {
        let out = normalize("https://example.com");
        assert_eq!(out, "https://example.com/");
    }

    #[test]
    fn falls_back_on_unparseable_input() {
        let out = normalize("   not a url at all   ");
        assert_eq!(out, "not a url at all");
    }

    #[test]
    fn duplicate_query_keys_preserve_relative_order() {
        let out = normalize("https://example.com/?b=1&a=1&a=2");
        assert_eq!(out, "https://example.com/?a=1&a=2&b=1");
    }
}
