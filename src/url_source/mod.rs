//! URL Source Reader (§4.A)
//!
//! Parses a local file or fetches a remote URL list, producing a finite,
//! deduplicated, ordered sequence of canonical URLs. Failure yields an empty
//! sequence and a diagnostic rather than aborting the run (§4.A "Failure").

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::{InputSource, RangeSpec};
use crate::utils::url_utils::{canonicalize_url, looks_like_schemeless_domain};

/// File-type-driven parsing rule, applied to both local files and the bytes
/// of a fetched remote file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    TxtOrMd,
    Json,
    Csv,
}

impl FileKind {
    fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".txt") || lower.ends_with(".md") {
            Some(Self::TxtOrMd)
        } else if lower.ends_with(".json") {
            Some(Self::Json)
        } else if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else {
            None
        }
    }
}

/// The result of ingestion: the canonical URL sequence plus whether range
/// was already materialized against it (remote paginated listings apply
/// range at fetch time; everything else still needs it applied once by the
/// caller). This flag exists precisely to make "range applied exactly once"
/// (§8) mechanically enforceable rather than a convention to remember.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub urls: Vec<String>,
    pub range_already_applied: bool,
}

/// Read and canonicalize a candidate URL list from `source`.
///
/// `max_urls` is only honored when `range` is `None`: an explicit range
/// fully determines the bounds of the run (§8 scenario 6 — a range over a
/// million-URL remote list must not be clipped by the default `numUrls`).
pub async fn ingest(
    client: &reqwest::Client,
    source: &InputSource,
    max_urls: usize,
    range: Option<RangeSpec>,
) -> Result<IngestResult> {
    match source {
        InputSource::Local(path) => ingest_local(path, max_urls, range).await,
        InputSource::Remote(url) => ingest_remote(client, url, max_urls, range).await,
    }
}

async fn ingest_local(path: &Path, max_urls: usize, range: Option<RangeSpec>) -> Result<IngestResult> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!("URL source file {} unreadable: {e}", path.display());
            return Ok(IngestResult { urls: Vec::new(), range_already_applied: true });
        }
    };

    let kind = FileKind::from_name(&path.to_string_lossy()).unwrap_or(FileKind::TxtOrMd);
    let candidates = parse_bytes(kind, &bytes);
    let deduped = dedup_preserve_order(candidates);
    let bounded = apply_range_then_cap(deduped, max_urls, range);

    Ok(IngestResult { urls: bounded, range_already_applied: true })
}

async fn ingest_remote(
    client: &reqwest::Client,
    url: &str,
    max_urls: usize,
    range: Option<RangeSpec>,
) -> Result<IngestResult> {
    if let Some(kind) = FileKind::from_name(url) {
        let bytes = fetch_bytes(client, url).await?;
        let candidates = parse_bytes(kind, &bytes);
        let deduped = dedup_preserve_order(candidates);
        let bounded = apply_range_then_cap(deduped, max_urls, range);
        return Ok(IngestResult { urls: bounded, range_already_applied: true });
    }

    // Directory listing: enumerate entries, keep recognized file extensions,
    // and fetch+accumulate until the range end (or max_urls, absent a range)
    // is satisfied. Range is applied here, at fetch time, so the caller must
    // not re-slice the result.
    let listing_html = fetch_bytes(client, url).await?;
    let entries = extract_listing_entries(url, &String::from_utf8_lossy(&listing_html));

    let target_len = range.map(|r| r.end.unwrap_or(usize::MAX)).unwrap_or(max_urls);

    let mut accumulated = Vec::new();
    let mut seen = HashSet::new();
    for entry_url in entries {
        if accumulated.len() >= target_len {
            break;
        }
        let Some(kind) = FileKind::from_name(&entry_url) else {
            continue;
        };
        let bytes = match fetch_bytes(client, &entry_url).await {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to fetch remote listing entry {entry_url}: {e}");
                continue;
            }
        };
        for candidate in parse_bytes(kind, &bytes) {
            if seen.insert(candidate.clone()) {
                accumulated.push(candidate);
                if accumulated.len() >= target_len {
                    break;
                }
            }
        }
    }

    let sliced = if let Some(r) = range {
        let (start, end) = r.clamp(accumulated.len());
        if start > accumulated.len() {
            Vec::new()
        } else {
            accumulated[(start - 1).min(accumulated.len())..end.min(accumulated.len())].to_vec()
        }
    } else {
        accumulated.into_iter().take(max_urls).collect()
    };

    Ok(IngestResult { urls: sliced, range_already_applied: true })
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to fetch URL list from {url}"))?;
    let bytes = resp
        .error_for_status()
        .with_context(|| format!("remote list {url} returned an error status"))?
        .bytes()
        .await
        .with_context(|| format!("failed to read response body from {url}"))?;
    Ok(bytes.to_vec())
}

/// Pull `href="...ext"` entries out of a directory listing page, resolved
/// against `base`, for the recognized extensions only.
fn extract_listing_entries(base: &str, html: &str) -> Vec<String> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r#"href="([^"]+\.(?:txt|md|json|csv))""#)
            .expect("static listing pattern is valid")
    });

    let base_url = url::Url::parse(base).ok();
    let mut out = Vec::new();
    for cap in re.captures_iter(html) {
        let href = &cap[1];
        let resolved = match &base_url {
            Some(b) => b.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        };
        out.push(resolved);
    }
    out
}

fn parse_bytes(kind: FileKind, bytes: &[u8]) -> Vec<String> {
    match kind {
        FileKind::TxtOrMd => parse_txt(bytes),
        FileKind::Json => parse_json(bytes),
        FileKind::Csv => parse_csv(bytes),
    }
}

fn accept_candidate(token: &str) -> Option<String> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    if looks_like_schemeless_domain(trimmed) {
        return Some(canonicalize_url(trimmed));
    }
    None
}

fn parse_txt(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(accept_candidate)
        .collect()
}

fn parse_csv(bytes: &[u8]) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut out = Vec::new();
    for result in reader.records() {
        let Ok(record) = result else { continue };
        if let Some(first) = record.get(0)
            && let Some(url) = accept_candidate(first)
        {
            out.push(url);
        }
    }
    out
}

fn parse_json(bytes: &[u8]) -> Vec<String> {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => {
            let mut out = Vec::new();
            walk_json_strings(&value, &mut out);
            out
        }
        Err(e) => {
            debug!("JSON URL source failed to parse ({e}); falling back to regex sweep");
            regex_sweep(&String::from_utf8_lossy(bytes))
        }
    }
}

fn walk_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => {
            if is_http_url(s) {
                out.push(s.clone());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk_json_strings(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for v in map.values() {
                walk_json_strings(v, out);
            }
        }
        _ => {}
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn regex_sweep(raw: &str) -> Vec<String> {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r#"https?://[^\s"'<>\\]+"#).expect("static sweep pattern is valid")
    });
    re.find_iter(raw).map(|m| m.as_str().to_string()).collect()
}

fn dedup_preserve_order(candidates: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut out = Vec::with_capacity(candidates.len());
    for c in candidates {
        if seen.insert(c.clone()) {
            out.push(c);
        }
    }
    out
}

/// Apply range exactly once, then cap to `max_urls` only if no range was
/// given (§8: an explicit range is authoritative over the default count).
fn apply_range_then_cap(urls: Vec<String>, max_urls: usize, range: Option<RangeSpec>) -> Vec<String> {
    match range {
        Some(r) => {
            let (start, end) = r.clamp(urls.len());
            if start > urls.len() {
                Vec::new()
            } else {
                urls[(start - 1).min(urls.len())..end.min(urls.len())].to_vec()
            }
        }
        None => urls.into_iter().take(max_urls).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_txt_accepts_schemeless_and_prefixed_urls() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("urls.txt");
        tokio::fs::write(&path, "example.com\nhttps://already.test\n\n  spaced.test  \nnot a url\n")
            .await
            .expect("write");

        let result = ingest_local(&path, 100, None).await.expect("ingest");
        assert_eq!(
            result.urls,
            vec![
                "https://example.com".to_string(),
                "https://already.test".to_string(),
                "https://spaced.test".to_string(),
            ]
        );
        assert!(result.range_already_applied);
    }

    #[tokio::test]
    async fn missing_local_file_yields_empty_sequence_not_error() {
        let result = ingest_local(Path::new("/nonexistent/path/urls.txt"), 100, None)
            .await
            .expect("ingest should not fail the run");
        assert!(result.urls.is_empty());
    }

    #[tokio::test]
    async fn csv_takes_first_column_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("urls.csv");
        tokio::fs::write(&path, "https://a.test,ignored\nhttps://b.test,also ignored\n")
            .await
            .expect("write");

        let result = ingest_local(&path, 100, None).await.expect("ingest");
        assert_eq!(result.urls, vec!["https://a.test", "https://b.test"]);
    }

    #[tokio::test]
    async fn json_array_of_strings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("urls.json");
        tokio::fs::write(&path, r#"{"sites": ["https://a.test", "not-a-url", "https://b.test"]}"#)
            .await
            .expect("write");

        let result = ingest_local(&path, 100, None).await.expect("ingest");
        assert_eq!(result.urls, vec!["https://a.test", "https://b.test"]);
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_regex_sweep() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("urls.json");
        tokio::fs::write(&path, r#"{"sites": ["https://a.test", "#)
            .await
            .expect("write");

        let result = ingest_local(&path, 100, None).await.expect("ingest");
        assert_eq!(result.urls, vec!["https://a.test"]);
    }

    #[test]
    fn range_is_authoritative_over_default_max_urls() {
        let urls: Vec<String> = (1..=1_000_000).map(|i| format!("https://site-{i}.test")).collect();
        let range = RangeSpec { start: 500_000, end: Some(500_002) };
        let bounded = apply_range_then_cap(urls, 100, Some(range));
        assert_eq!(bounded.len(), 3);
        assert_eq!(bounded[0], "https://site-500000.test");
        assert_eq!(bounded[2], "https://site-500002.test");
    }

    #[test]
    fn range_start_past_end_yields_empty() {
        let urls: Vec<String> = (1..=10).map(|i| format!("https://site-{i}.test")).collect();
        let range = RangeSpec { start: 50, end: Some(60) };
        let bounded = apply_range_then_cap(urls, 100, Some(range));
        assert!(bounded.is_empty());
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let urls = vec!["https://a.test".to_string(), "https://b.test".to_string(), "https://a.test".to_string()];
        assert_eq!(dedup_preserve_order(urls), vec!["https://a.test", "https://b.test"]);
    }
}
