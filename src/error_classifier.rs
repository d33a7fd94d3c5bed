//! Error Classifier (§4.H)
//!
//! Maps a raw browser/network error message and the phase it occurred in
//! into a closed taxonomy of stable codes. Classification is a pure
//! function over a typed raw-error carrier so it can be exercised with
//! table-driven unit tests, without a browser or filesystem fixture.

use crate::model::ClassifiedError;

/// The phase in which an error was observed, used only to break ties between
/// rules that would otherwise match the same substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Navigation,
    Settle,
    Extraction,
}

/// A raw error as seen by the classifier: the phase plus the underlying
/// message text (from chromiumoxide/CDP or reqwest).
#[derive(Debug, Clone)]
pub struct RawError<'a> {
    pub phase: Phase,
    pub message: &'a str,
}

impl<'a> RawError<'a> {
    #[must_use]
    pub fn new(phase: Phase, message: &'a str) -> Self {
        Self { phase, message }
    }
}

struct Rule {
    code: &'static str,
    retryable: bool,
    patterns: &'static [&'static str],
}

/// Ordered rule list; first match wins. Content-class 5xx/4xx codes are
/// handled separately below since they need numeric parsing, not substrings.
const RULES: &[Rule] = &[
    // Network
    Rule { code: "DNS_RESOLUTION_FAILED", retryable: false, patterns: &["err_name_not_resolved", "dns", "name not resolved", "nxdomain"] },
    Rule { code: "CONNECTION_REFUSED", retryable: false, patterns: &["err_connection_refused", "connection refused", "econnrefused"] },
    Rule { code: "CONNECTION_TIMEOUT", retryable: true, patterns: &["err_connection_timed_out", "connection timed out"] },
    Rule { code: "ADDRESS_UNREACHABLE", retryable: false, patterns: &["err_address_unreachable", "host unreachable", "network unreachable"] },
    Rule { code: "NO_INTERNET", retryable: false, patterns: &["err_internet_disconnected", "no internet"] },
    Rule { code: "NETWORK_CHANGED", retryable: false, patterns: &["err_network_changed"] },
    // TLS
    Rule { code: "INVALID_CERTIFICATE_AUTHORITY", retryable: false, patterns: &["err_cert_authority_invalid", "unable to verify the first certificate", "self signed certificate", "self-signed certificate"] },
    Rule { code: "CERTIFICATE_EXPIRED", retryable: false, patterns: &["err_cert_date_invalid", "certificate has expired", "certificate expired"] },
    Rule { code: "CERTIFICATE_NAME_MISMATCH", retryable: false, patterns: &["err_cert_common_name_invalid", "hostname mismatch", "certificate name mismatch"] },
    Rule { code: "SSL_PROTOCOL_ERROR", retryable: false, patterns: &["err_ssl_protocol_error", "ssl protocol error", "tls handshake"] },
    // Timeout
    Rule { code: "NAVIGATION_TIMEOUT", retryable: true, patterns: &["navigation timeout", "err_timed_out"] },
    Rule { code: "ELEMENT_WAIT_TIMEOUT", retryable: true, patterns: &["waiting for selector", "wait_for_selector"] },
    Rule { code: "OPERATION_TIMEOUT", retryable: true, patterns: &["timeout", "timed out"] },
    // Browser
    Rule { code: "FRAME_DETACHED", retryable: true, patterns: &["detached frame", "frame was detached"] },
    Rule { code: "CONTEXT_DESTROYED", retryable: true, patterns: &["execution context was destroyed"] },
    Rule { code: "BROWSER_SESSION_CLOSED", retryable: true, patterns: &["session closed", "target closed"] },
    Rule { code: "BROWSER_CRASHED", retryable: true, patterns: &["browser has disconnected", "browser crashed", "target crashed"] },
    Rule { code: "PROTOCOL_ERROR", retryable: true, patterns: &["protocol error"] },
    // Access
    Rule { code: "HTTP_FORBIDDEN", retryable: false, patterns: &["403"] },
    Rule { code: "HTTP_UNAUTHORIZED", retryable: false, patterns: &["401"] },
    Rule { code: "CAPTCHA_REQUIRED", retryable: false, patterns: &["captcha"] },
    Rule { code: "RATE_LIMITED", retryable: false, patterns: &["429", "too many requests", "rate limit"] },
    Rule { code: "IP_BLOCKED", retryable: false, patterns: &["ip blocked", "access denied"] },
    Rule { code: "CDN_PROTECTION", retryable: false, patterns: &["cloudflare", "cdn protection", "checking your browser"] },
    // Content
    Rule { code: "PAGE_UNAVAILABLE", retryable: false, patterns: &["page_unavailable", "domain parked", "for sale", "this domain is parked"] },
    Rule { code: "PAGE_NOT_FOUND", retryable: false, patterns: &["404"] },
    // Extraction
    Rule { code: "JS_EVALUATION_FAILED", retryable: false, patterns: &["evaluation failed", "failed to execute"] },
    Rule { code: "JS_PROPERTY_ERROR", retryable: false, patterns: &["cannot read propert", "is not defined", "undefined is not an object"] },
];

/// Classify a raw error into a `(code, retryable)` pair, then wrap it with
/// the original message into a `ClassifiedError`.
#[must_use]
pub fn classify(error: &RawError<'_>) -> ClassifiedError {
    let lower = error.message.to_lowercase();

    if let Some(code) = http_status_code(&lower) {
        let (classified_code, retryable) = classify_http_status(code);
        return ClassifiedError {
            code: classified_code.to_string(),
            retryable,
            message: error.message.to_string(),
        };
    }

    for rule in RULES {
        if rule.patterns.iter().any(|p| lower.contains(p)) {
            return ClassifiedError {
                code: rule.code.to_string(),
                retryable: rule.retryable,
                message: error.message.to_string(),
            };
        }
    }

    ClassifiedError {
        code: "UNKNOWN_ERROR".to_string(),
        retryable: false,
        message: error.message.to_string(),
    }
}

/// Pull a bare 3-digit HTTP status out of a message like "HTTP 503" or
/// "status code 500", distinct from the substring rules above which only
/// fire on specific well-known codes (403/401/429/404).
fn http_status_code(lower: &str) -> Option<u16> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"\b(5\d{2}|408)\b").expect("static status pattern is valid")
    });
    if !lower.contains("http") && !lower.contains("status") && !lower.contains("server") {
        return None;
    }
    re.captures(lower)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn classify_http_status(code: u16) -> (&'static str, bool) {
    match code {
        503 => ("SERVICE_UNAVAILABLE", true),
        500..=599 => ("SERVER_ERROR", true),
        408 => ("CONNECTION_TIMEOUT", true),
        _ => ("UNKNOWN_ERROR", false),
    }
}

/// Which sidecar file (§4.I) an error code is routed to.
#[must_use]
pub fn sidecar_file(code: &str) -> &'static str {
    match code {
        "DNS_RESOLUTION_FAILED" | "CONNECTION_REFUSED" | "ADDRESS_UNREACHABLE"
        | "NO_INTERNET" | "NETWORK_CHANGED" => "navigation_errors.txt",
        "INVALID_CERTIFICATE_AUTHORITY" | "CERTIFICATE_EXPIRED" | "SSL_PROTOCOL_ERROR"
        | "CERTIFICATE_NAME_MISMATCH" => "ssl_errors.txt",
        "CONNECTION_TIMEOUT" | "NAVIGATION_TIMEOUT" | "OPERATION_TIMEOUT"
        | "ELEMENT_WAIT_TIMEOUT" => "timeout_errors.txt",
        "FRAME_DETACHED" | "CONTEXT_DESTROYED" | "BROWSER_SESSION_CLOSED"
        | "BROWSER_CRASHED" | "PROTOCOL_ERROR" | "WORKER_CRASH" => "browser_errors.txt",
        "HTTP_FORBIDDEN" | "HTTP_UNAUTHORIZED" | "CAPTCHA_REQUIRED" | "RATE_LIMITED"
        | "IP_BLOCKED" | "CDN_PROTECTION" => "access_errors.txt",
        "PAGE_UNAVAILABLE" | "PAGE_NOT_FOUND" | "SERVER_ERROR" | "SERVICE_UNAVAILABLE" => {
            "content_errors.txt"
        }
        "JS_EVALUATION_FAILED" | "JS_PROPERTY_ERROR" => "extraction_errors.txt",
        _ => "error_processing.txt",
    }
}

/// Benign-transient process-level messages (§7) that must not terminate the
/// run when surfaced outside the Probe boundary (e.g. from the chromiumoxide
/// handler task).
#[must_use]
pub fn is_benign_transient(message: &str) -> bool {
    let lower = message.to_lowercase();
    crate::utils::constants::BENIGN_TRANSIENT_MESSAGES
        .iter()
        .any(|p| lower.contains(&p.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(phase: Phase, msg: &str) -> ClassifiedError {
        classify(&RawError::new(phase, msg))
    }

    #[test]
    fn dns_failure_is_non_retryable() {
        let c = code_of(Phase::Navigation, "net::ERR_NAME_NOT_RESOLVED");
        assert_eq!(c.code, "DNS_RESOLUTION_FAILED");
        assert!(!c.retryable);
    }

    #[test]
    fn navigation_timeout_is_retryable() {
        let c = code_of(Phase::Navigation, "Navigation timeout of 60000 ms exceeded");
        assert_eq!(c.code, "NAVIGATION_TIMEOUT");
        assert!(c.retryable);
    }

    #[test]
    fn frame_detached_is_retryable() {
        let c = code_of(Phase::Extraction, "Execution context was destroyed, most likely because of a navigation");
        assert_eq!(c.code, "CONTEXT_DESTROYED");
        assert!(c.retryable);
    }

    #[test]
    fn server_error_5xx_retryable_but_4xx_not() {
        let c = code_of(Phase::Navigation, "HTTP status 503 from server");
        assert_eq!(c.code, "SERVICE_UNAVAILABLE");
        assert!(c.retryable);

        let c = code_of(Phase::Navigation, "HTTP 403 Forbidden");
        assert_eq!(c.code, "HTTP_FORBIDDEN");
        assert!(!c.retryable);
    }

    #[test]
    fn unrecognized_message_falls_back() {
        let c = code_of(Phase::Navigation, "some bizarre never-seen-before failure");
        assert_eq!(c.code, "UNKNOWN_ERROR");
        assert!(!c.retryable);
    }

    #[test]
    fn benign_transient_messages_are_recognized() {
        assert!(is_benign_transient("Protocol error (Page.navigate): Session closed."));
        assert!(!is_benign_transient("disk is full"));
    }
}
