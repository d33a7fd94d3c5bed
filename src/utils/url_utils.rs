//! URL canonicalization and validation utilities.

use url::Url;

/// Canonicalize a candidate URL per the crawl engine's canonical-form rule:
/// trim whitespace, then prepend `https://` if no scheme is present.
///
/// This is the single canonicalization routine used everywhere a URL becomes
/// a deduplication key (source reading, tracker rows, sink output).
#[must_use]
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Check if a string is a syntactically valid http(s) URL.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Extract the lowercased host from a URL, or an empty string if unparseable.
#[must_use]
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

/// A schemeless domain-like token: `(label.)+tld`, at least two chars in the TLD.
#[must_use]
pub fn looks_like_schemeless_domain(candidate: &str) -> bool {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"^([a-zA-Z0-9_-]+\.)+[a-zA-Z]{2,}$")
            .expect("static domain pattern is valid")
    });
    re.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_adds_scheme() {
        assert_eq!(canonicalize_url("example.com"), "https://example.com");
        assert_eq!(
            canonicalize_url("  example.com  "),
            "https://example.com"
        );
        assert_eq!(
            canonicalize_url("http://example.com"),
            "http://example.com"
        );
        assert_eq!(
            canonicalize_url("https://example.com"),
            "https://example.com"
        );
    }

    #[test]
    fn valid_url_rejects_non_http_schemes() {
        assert!(is_valid_url("https://example.com"));
        assert!(is_valid_url("http://example.com"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("data:text/plain,hi"));
        assert!(!is_valid_url(""));
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(extract_domain("https://Example.Com/path"), "example.com");
        assert_eq!(extract_domain("not a url"), "");
    }

    #[test]
    fn schemeless_domain_pattern() {
        assert!(looks_like_schemeless_domain("example.com"));
        assert!(looks_like_schemeless_domain("sub.example.co.uk"));
        assert!(!looks_like_schemeless_domain("not a domain"));
        assert!(!looks_like_schemeless_domain("nodot"));
    }
}
