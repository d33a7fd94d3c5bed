//! Shared configuration constants for citescan
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default crawl rate: 2 requests per second
///
/// Conservative rate that respects server resources while maintaining
/// reasonable crawl speed. Most servers can handle this rate without issue.
pub const DEFAULT_CRAWL_RATE_RPS: f64 = 2.0;

/// Default maximum retry attempts for a transient page failure.
pub const DEFAULT_MAX_PAGE_RETRIES: u8 = 3;

/// Default pooled-mode worker concurrency.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default chunk size for batch runs (0 / unset means "single chunk of all URLs").
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Default operation timeout for evaluate/mouse calls inside the probe.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 55;

/// Default navigation timeout.
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 60;

/// Settle-phase bounded wait, in seconds.
pub const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 6;

/// Delay between the two navigation attempts.
pub const NAVIGATION_RETRY_DELAY_MS: u64 = 1_000;

/// Grace period allowed for in-flight tasks after a cancel signal.
pub const DEFAULT_CANCEL_GRACE_SECS: u64 = 30;

/// Inter-chunk pause in batch mode, to let browser resources settle.
pub const DEFAULT_INTER_CHUNK_PAUSE_SECS: u64 = 10;

/// User agent string the crawler identifies itself with.
///
/// Declared, not spoofed: this crawler behaves like a well-known crawl bot
/// rather than attempting to pass as a desktop browser.
pub const CRAWLER_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// Ad-tech globals the extraction script checks for presence of, beyond Prebid.
pub const KNOWN_AD_TECH_GLOBALS: &[&str] = &["apstag", "googletag", "ats"];

/// Benign-transient process-level error substrings, derived from observed
/// chromiumoxide/CDP failure modes. Recoverable; they must not terminate the run.
pub const BENIGN_TRANSIENT_MESSAGES: &[&str] = &[
    "detached frame",
    "execution context was destroyed",
    "session closed",
    "target closed",
    "protocol error",
    "closed socket",
    "EPIPE",
    "ECONNRESET",
];
