//! Typestate builder for [`Options`], mirroring the corpus's
//! `CrawlConfigBuilder<State>` pattern: required fields (input source,
//! output directory) are encoded as builder states so a config missing
//! them fails to compile, not to run.

use std::marker::PhantomData;
use std::path::PathBuf;

use anyhow::Result;

use super::types::{ExecutionMode, InputSource, Options, RangeSpec};
use crate::utils::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CANCEL_GRACE_SECS, DEFAULT_CONCURRENCY,
    DEFAULT_INTER_CHUNK_PAUSE_SECS, DEFAULT_MAX_PAGE_RETRIES, DEFAULT_NAVIGATION_TIMEOUT_SECS,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_SETTLE_TIMEOUT_SECS,
};

// Builder type states.
pub struct NeedsSource;
pub struct NeedsOutputDir;
pub struct Complete;

pub struct OptionsBuilder<State = NeedsSource> {
    source: Option<InputSource>,
    output_dir: Option<PathBuf>,
    log_dir: PathBuf,
    tracker_path: Option<PathBuf>,
    max_urls: usize,
    range: Option<RangeSpec>,
    execution_mode: ExecutionMode,
    concurrency: usize,
    headless: bool,
    skip_processed: bool,
    prefilter_processed: bool,
    force_reprocess: bool,
    reset_tracking: bool,
    preflight: bool,
    batch_mode: bool,
    batch_size: usize,
    total_urls: Option<usize>,
    start_url: usize,
    resume_batch: Option<usize>,
    chunk_size: usize,
    max_retries: u32,
    operation_timeout_secs: u64,
    navigation_timeout_secs: u64,
    settle_timeout_secs: u64,
    cancel_grace_secs: u64,
    inter_chunk_pause_secs: u64,
    preflight_timeout_secs: u64,
    _phantom: PhantomData<State>,
}

impl Default for OptionsBuilder<NeedsSource> {
    fn default() -> Self {
        Self {
            source: None,
            output_dir: None,
            log_dir: PathBuf::from("logs"),
            tracker_path: None,
            max_urls: 100,
            range: None,
            execution_mode: ExecutionMode::Pooled,
            concurrency: DEFAULT_CONCURRENCY,
            headless: true,
            skip_processed: false,
            prefilter_processed: false,
            force_reprocess: false,
            reset_tracking: false,
            preflight: false,
            batch_mode: false,
            batch_size: DEFAULT_BATCH_SIZE,
            total_urls: None,
            start_url: 1,
            resume_batch: None,
            chunk_size: 0,
            max_retries: u32::from(DEFAULT_MAX_PAGE_RETRIES),
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            navigation_timeout_secs: DEFAULT_NAVIGATION_TIMEOUT_SECS,
            settle_timeout_secs: DEFAULT_SETTLE_TIMEOUT_SECS,
            cancel_grace_secs: DEFAULT_CANCEL_GRACE_SECS,
            inter_chunk_pause_secs: DEFAULT_INTER_CHUNK_PAUSE_SECS,
            preflight_timeout_secs: 5,
            _phantom: PhantomData,
        }
    }
}

macro_rules! carry_fields {
    ($self:expr) => {
        OptionsBuilder {
            source: $self.source,
            output_dir: $self.output_dir,
            log_dir: $self.log_dir,
            tracker_path: $self.tracker_path,
            max_urls: $self.max_urls,
            range: $self.range,
            execution_mode: $self.execution_mode,
            concurrency: $self.concurrency,
            headless: $self.headless,
            skip_processed: $self.skip_processed,
            prefilter_processed: $self.prefilter_processed,
            force_reprocess: $self.force_reprocess,
            reset_tracking: $self.reset_tracking,
            preflight: $self.preflight,
            batch_mode: $self.batch_mode,
            batch_size: $self.batch_size,
            total_urls: $self.total_urls,
            start_url: $self.start_url,
            resume_batch: $self.resume_batch,
            chunk_size: $self.chunk_size,
            max_retries: $self.max_retries,
            operation_timeout_secs: $self.operation_timeout_secs,
            navigation_timeout_secs: $self.navigation_timeout_secs,
            settle_timeout_secs: $self.settle_timeout_secs,
            cancel_grace_secs: $self.cancel_grace_secs,
            inter_chunk_pause_secs: $self.inter_chunk_pause_secs,
            preflight_timeout_secs: $self.preflight_timeout_secs,
            _phantom: PhantomData,
        }
    };
}

impl<State> OptionsBuilder<State> {
    #[must_use]
    pub fn output_dir_hint(&self) -> Option<&PathBuf> {
        self.output_dir.as_ref()
    }

    #[must_use]
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    #[must_use]
    pub fn tracker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tracker_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn max_urls(mut self, n: usize) -> Self {
        self.max_urls = n;
        self
    }

    #[must_use]
    pub fn range(mut self, range: RangeSpec) -> Self {
        self.range = Some(range);
        self
    }

    #[must_use]
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    #[must_use]
    pub fn skip_processed(mut self, v: bool) -> Self {
        self.skip_processed = v;
        self
    }

    #[must_use]
    pub fn prefilter_processed(mut self, v: bool) -> Self {
        self.prefilter_processed = v;
        self
    }

    #[must_use]
    pub fn force_reprocess(mut self, v: bool) -> Self {
        self.force_reprocess = v;
        self
    }

    #[must_use]
    pub fn reset_tracking(mut self, v: bool) -> Self {
        self.reset_tracking = v;
        self
    }

    #[must_use]
    pub fn preflight(mut self, v: bool) -> Self {
        self.preflight = v;
        self
    }

    #[must_use]
    pub fn batch_mode(mut self, v: bool) -> Self {
        self.batch_mode = v;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    #[must_use]
    pub fn total_urls(mut self, n: usize) -> Self {
        self.total_urls = Some(n);
        self
    }

    #[must_use]
    pub fn start_url(mut self, n: usize) -> Self {
        self.start_url = n.max(1);
        self
    }

    #[must_use]
    pub fn resume_batch(mut self, n: usize) -> Self {
        self.resume_batch = Some(n);
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
}

impl OptionsBuilder<NeedsSource> {
    #[must_use]
    pub fn local_source(self, path: impl Into<PathBuf>) -> OptionsBuilder<NeedsOutputDir> {
        let mut next = carry_fields!(self);
        next.source = Some(InputSource::Local(path.into()));
        next
    }

    #[must_use]
    pub fn remote_source(self, url: impl Into<String>) -> OptionsBuilder<NeedsOutputDir> {
        let mut next = carry_fields!(self);
        next.source = Some(InputSource::Remote(url.into()));
        next
    }
}

impl OptionsBuilder<NeedsOutputDir> {
    #[must_use]
    pub fn output_dir(self, dir: impl Into<PathBuf>) -> OptionsBuilder<Complete> {
        let mut next = carry_fields!(self);
        next.output_dir = Some(dir.into());
        next
    }
}

impl OptionsBuilder<Complete> {
    /// Finalize the configuration, performing one-time validation work
    /// (range parsing already happened at `range()` call time; here we only
    /// check cross-field invariants) rather than in hot paths.
    pub fn build(self) -> Result<Options> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("input source is required"))?;
        let output_dir = self
            .output_dir
            .ok_or_else(|| anyhow::anyhow!("output directory is required"))?;

        if self.force_reprocess && self.skip_processed {
            return Err(anyhow::anyhow!(
                "force_reprocess and skip_processed are mutually exclusive"
            ));
        }

        // §8/§9: range must be applied exactly once. A remote source with an
        // explicit range applies it at fetch time (§4.A); prefiltering
        // against the Tracker before that fetch would mean range gets
        // re-materialized against a shorter, already-filtered sequence on a
        // later listing page. Surface this as a hard configuration error
        // rather than silently double-filtering.
        if matches!(source, InputSource::Remote(_))
            && self.range.is_some()
            && self.prefilter_processed
        {
            return Err(anyhow::anyhow!(
                "range and prefilter_processed cannot both apply to a remote source: range is materialized at fetch time, so pre-filtering here would double-apply it"
            ));
        }

        let tracker_path = self
            .tracker_path
            .unwrap_or_else(|| PathBuf::from("data/url-tracker.sqlite3"));

        Ok(Options {
            source,
            output_dir,
            log_dir: self.log_dir,
            tracker_path,
            max_urls: self.max_urls,
            range: self.range,
            execution_mode: self.execution_mode,
            concurrency: self.concurrency,
            headless: self.headless,
            skip_processed: self.skip_processed,
            prefilter_processed: self.prefilter_processed,
            force_reprocess: self.force_reprocess,
            reset_tracking: self.reset_tracking,
            preflight: self.preflight,
            batch_mode: self.batch_mode,
            batch_size: self.batch_size,
            total_urls: self.total_urls,
            start_url: self.start_url,
            resume_batch: self.resume_batch,
            chunk_size: self.chunk_size,
            max_retries: self.max_retries,
            operation_timeout_secs: self.operation_timeout_secs,
            navigation_timeout_secs: self.navigation_timeout_secs,
            settle_timeout_secs: self.settle_timeout_secs,
            cancel_grace_secs: self.cancel_grace_secs,
            inter_chunk_pause_secs: self.inter_chunk_pause_secs,
            preflight_timeout_secs: self.preflight_timeout_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_build_succeeds_with_defaults() {
        let opts = Options::builder()
            .local_source("urls.txt")
            .output_dir("store")
            .build()
            .expect("build");
        assert_eq!(opts.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(opts.chunk_size, 0);
    }

    #[test]
    fn force_reprocess_and_skip_processed_conflict() {
        let err = Options::builder()
            .local_source("urls.txt")
            .output_dir("store")
            .force_reprocess(true)
            .skip_processed(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn remote_range_with_prefilter_is_rejected() {
        let err = Options::builder()
            .remote_source("https://example.com/urls.txt")
            .output_dir("store")
            .range(RangeSpec { start: 1, end: Some(10) })
            .prefilter_processed(true)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("double-apply"));
    }

    #[test]
    fn range_parses_open_ended() {
        let r = RangeSpec::parse("500000-").expect("parse");
        assert_eq!(r.start, 500_000);
        assert_eq!(r.end, None);
        assert_eq!(r.clamp(1_000_000), (500_000, 1_000_000));
    }

    #[test]
    fn range_parses_closed_and_clamps() {
        let r = RangeSpec::parse("500000-500002").expect("parse");
        assert_eq!(r.clamp(1_000_000), (500_000, 500_002));
    }
}
