//! Core configuration types (§6 CLI flags, §10 ambient configuration concern).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the candidate URL sequence comes from (§4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InputSource {
    Local(PathBuf),
    Remote(String),
}

/// Which of the two Worker Pool / Scheduler strategies (§4.G) drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// One persistent browser, new page per URL, no parallelism.
    Sequential,
    /// N independent browser contexts processed concurrently.
    Pooled,
}

/// An inclusive, 1-based, optionally open-ended range over the ingested
/// URL sequence (`N-M` or `N-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub start: usize,
    pub end: Option<usize>,
}

impl RangeSpec {
    /// Parse a `scan --range` value in the `N-M` or `N-` grammar.
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let (start_str, end_str) = s
            .split_once('-')
            .ok_or_else(|| anyhow::anyhow!("range '{s}' must be of the form N-M or N-"))?;
        let start: usize = start_str
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("range '{s}' has a non-numeric start"))?;
        if start == 0 {
            return Err(anyhow::anyhow!("range start is 1-based and must be >= 1"));
        }
        let end = if end_str.trim().is_empty() {
            None
        } else {
            Some(
                end_str
                    .trim()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("range '{s}' has a non-numeric end"))?,
            )
        };
        Ok(Self { start, end })
    }

    /// Clamp this range to a sequence of length `len`, per §8 boundary rules:
    /// a range beyond length clamps to `[start, len]`; a start past `len`
    /// yields an empty span, represented here as `start > end`.
    #[must_use]
    pub fn clamp(&self, len: usize) -> (usize, usize) {
        let end = self.end.unwrap_or(len).min(len);
        (self.start, end)
    }
}

/// Fully resolved run configuration. Constructed only via
/// [`super::builder::OptionsBuilder`], so a config missing a required field
/// fails to compile rather than to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub source: InputSource,
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub tracker_path: PathBuf,

    pub max_urls: usize,
    pub range: Option<RangeSpec>,

    pub execution_mode: ExecutionMode,
    pub concurrency: usize,
    pub headless: bool,

    pub skip_processed: bool,
    pub prefilter_processed: bool,
    pub force_reprocess: bool,
    pub reset_tracking: bool,
    pub preflight: bool,

    pub batch_mode: bool,
    pub batch_size: usize,
    pub total_urls: Option<usize>,
    pub start_url: usize,
    pub resume_batch: Option<usize>,
    pub chunk_size: usize,

    pub max_retries: u32,
    pub operation_timeout_secs: u64,
    pub navigation_timeout_secs: u64,
    pub settle_timeout_secs: u64,
    pub cancel_grace_secs: u64,
    pub inter_chunk_pause_secs: u64,
    pub preflight_timeout_secs: u64,
}

impl Options {
    #[must_use]
    pub fn builder() -> super::builder::OptionsBuilder<super::builder::NeedsSource> {
        super::builder::OptionsBuilder::default()
    }
}
