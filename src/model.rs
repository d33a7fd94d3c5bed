//! Core data model shared across the crawl engine: the canonical record
//! shapes that flow from ingestion through the tracker, scheduler, probe,
//! and sink.
//!
//! These types mirror the corpus's `page_extractor::schema` module in shape
//! (plain serde structs, `Default` where useful) but carry ad-tech detection
//! fields instead of generic page-scrape fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Processing status of a tracked URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Success,
    NoData,
    Error,
    Retry,
}

impl UrlStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NoData => "no_data",
            Self::Error => "error",
            Self::Retry => "retry",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "no_data" => Some(Self::NoData),
            "error" => Some(Self::Error),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

/// A single `window._pbjsGlobals` entry read off the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrebidInstance {
    #[serde(rename = "globalVarName")]
    pub global_var_name: String,
    pub version: String,
    pub modules: Vec<String>,
}

/// Initialization state of one Prebid instance, as observed during extraction.
/// Not part of the bit-stable result schema; used internally by the probe to
/// decide whether an instance counts as evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrebidInitState {
    Complete,
    Partial,
    Queue,
}

/// Output of a successful probe: the bit-stable result record (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub url: String,
    pub date: String,
    pub libraries: Vec<String>,
    #[serde(rename = "prebidInstances")]
    pub prebid_instances: Vec<PrebidInstance>,
}

impl PageData {
    #[must_use]
    pub fn has_prebid(&self) -> bool {
        self.prebid_instances
            .iter()
            .any(|i| !i.version.trim().is_empty())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty() && self.prebid_instances.is_empty()
    }
}

/// A classified probe failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub code: String,
    pub retryable: bool,
    pub message: String,
}

/// The sum type produced by the Page Probe for exactly one URL.
#[derive(Debug, Clone)]
pub enum TaskResult {
    Success(PageData),
    NoData { url: String },
    Error { url: String, error: ClassifiedError },
}

impl TaskResult {
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success(data) => &data.url,
            Self::NoData { url } | Self::Error { url, .. } => url,
        }
    }
}

/// Durable per-URL processing record (§3 "Processed record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub url: String,
    pub status: UrlStatus,
    pub timestamp: DateTime<Utc>,
    pub error_code: Option<String>,
    pub retry_count: u32,
    pub has_prebid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contiguous slice of the canonical URL sequence, 1-based and stable
/// across resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub number: usize,
    pub urls: Vec<String>,
}

/// Ordered batch plan: one Planner output per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchPlan {
    pub chunks: Vec<Chunk>,
}

impl BatchPlan {
    #[must_use]
    pub fn total_urls(&self) -> usize {
        self.chunks.iter().map(|c| c.urls.len()).sum()
    }
}

/// Batch-mode progress record, persisted after each chunk completes (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub range: (usize, usize),
    pub chunk_size: usize,
    pub completed_chunks: Vec<usize>,
    pub failed_chunks: Vec<usize>,
    pub started_at: DateTime<Utc>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    #[must_use]
    pub fn new(range: (usize, usize), chunk_size: usize) -> Self {
        Self {
            range,
            chunk_size,
            completed_chunks: Vec::new(),
            failed_chunks: Vec::new(),
            started_at: Utc::now(),
            last_completed_at: None,
        }
    }

    pub fn mark_completed(&mut self, chunk: usize) {
        if !self.completed_chunks.contains(&chunk) {
            self.completed_chunks.push(chunk);
        }
        self.failed_chunks.retain(|c| *c != chunk);
        self.last_completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, chunk: usize) {
        if !self.failed_chunks.contains(&chunk) {
            self.failed_chunks.push(chunk);
        }
    }

    #[must_use]
    pub fn is_completed(&self, chunk: usize) -> bool {
        self.completed_chunks.contains(&chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_data_has_prebid_requires_nonempty_version() {
        let mut data = PageData {
            url: "https://a.test".into(),
            date: "2026-07-28".into(),
            libraries: vec![],
            prebid_instances: vec![PrebidInstance {
                global_var_name: "pbjs".into(),
                version: String::new(),
                modules: vec![],
            }],
        };
        assert!(!data.has_prebid());
        data.prebid_instances[0].version = "8.0.0".into();
        assert!(data.has_prebid());
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            UrlStatus::Success,
            UrlStatus::NoData,
            UrlStatus::Error,
            UrlStatus::Retry,
        ] {
            assert_eq!(UrlStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn progress_record_tracks_completed_and_failed() {
        let mut p = ProgressRecord::new((1, 500), 100);
        p.mark_failed(2);
        p.mark_completed(2);
        assert!(p.is_completed(2));
        assert!(p.failed_chunks.is_empty());
    }
}
