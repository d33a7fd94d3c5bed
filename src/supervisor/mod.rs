//! Batch Supervisor (§4.J)
//!
//! Drives a multi-chunk run end to end: Planner -> Scheduler -> Sink per
//! chunk, with a resumable progress file written after each chunk
//! completes. A chunk that fails doesn't abort the run; it's marked failed
//! in the progress file and the supervisor moves on to the next one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::browser_capability::{BrowserCapability, SequentialBrowser};
use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
use crate::config::{ExecutionMode, InputSource, Options};
use crate::model::{BatchPlan, Chunk, ProgressRecord};
use crate::scheduler::{self, CancelSignal};
use crate::sink;
use crate::tracker::Tracker;

/// Run every chunk of `plan` against `options`, resuming from whatever
/// `progress_path` already records.
pub async fn run_batch(
    options: &Options,
    plan: &BatchPlan,
    tracker: &Tracker,
    progress_path: &Path,
    cancel: &CancelSignal,
) -> Result<ProgressRecord> {
    let mut progress = load_or_new_progress(progress_path, 1, plan.total_urls(), options.chunk_size).await?;

    for chunk in &plan.chunks {
        if progress.is_completed(chunk.number) {
            info!("batch: chunk {} already completed, skipping", chunk.number);
            continue;
        }
        if cancel.is_cancelled() {
            info!("batch: cancellation observed before chunk {}, stopping run", chunk.number);
            break;
        }

        match run_one_chunk(options, chunk, tracker, cancel).await {
            Ok(()) => progress.mark_completed(chunk.number),
            Err(e) => {
                warn!("batch: chunk {} failed: {e:#}", chunk.number);
                progress.mark_failed(chunk.number);
            }
        }

        save_progress(progress_path, &progress).await?;

        let is_last = chunk.number == plan.chunks.len();
        if options.batch_mode && !is_last && options.inter_chunk_pause_secs > 0 {
            tokio::time::sleep(Duration::from_secs(options.inter_chunk_pause_secs)).await;
        }
    }

    Ok(progress)
}

async fn run_one_chunk(options: &Options, chunk: &Chunk, tracker: &Tracker, cancel: &CancelSignal) -> Result<()> {
    let capability = build_capability(options).await.with_context(|| format!("chunk {}: failed to start a browser", chunk.number))?;

    let results = scheduler::run_chunk(Arc::new(capability), &chunk.urls, options, cancel).await;

    if let InputSource::Local(path) = &options.source {
        let processed: std::collections::HashSet<String> = results.iter().map(|r| r.url().to_string()).collect();
        if let Err(e) = sink::rewrite_input_list(path, &processed).await {
            warn!("batch: failed to rewrite input list after chunk {}: {e:#}", chunk.number);
        }
    }

    sink::write_chunk(&options.output_dir, &results, tracker).await
}

async fn build_capability(options: &Options) -> Result<BrowserCapability> {
    match options.execution_mode {
        ExecutionMode::Sequential => {
            let seq = SequentialBrowser::launch(options.headless).await?;
            Ok(BrowserCapability::Sequential(Arc::new(seq)))
        }
        ExecutionMode::Pooled => {
            let pool = BrowserPool::new(BrowserPoolConfig {
                headless: options.headless,
                min_pool_size: options.concurrency.min(2).max(1),
                max_pool_size: options.concurrency.max(1),
                ..BrowserPoolConfig::default()
            });
            pool.start().await.context("failed to start the browser pool")?;
            Ok(BrowserCapability::Pooled(pool))
        }
    }
}

async fn load_or_new_progress(path: &Path, start: usize, end: usize, chunk_size: usize) -> Result<ProgressRecord> {
    if let Ok(contents) = tokio::fs::read_to_string(path).await {
        match serde_json::from_str::<ProgressRecord>(&contents) {
            Ok(record) => {
                info!("batch: resuming from progress file {}", path.display());
                return Ok(record);
            }
            Err(e) => warn!("batch: progress file {} unreadable ({e}), starting fresh", path.display()),
        }
    }
    Ok(ProgressRecord::new((start, end), chunk_size))
}

async fn save_progress(path: &Path, progress: &ProgressRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let json = serde_json::to_string_pretty(progress).context("failed to serialize progress record")?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, json).await.context("failed to write progress temp file")?;
    tokio::fs::rename(&tmp_path, path).await.context("failed to rename progress file into place")?;
    Ok(())
}

/// Name of the resumable progress file for a batch covering `[start, end]`,
/// matching the convention `batch-progress-<start>-<end>.json`.
#[must_use]
pub fn progress_file_name(start: usize, end: usize) -> String {
    format!("batch-progress-{start}-{end}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_file_name_matches_convention() {
        assert_eq!(progress_file_name(1, 500), "batch-progress-1-500.json");
    }

    #[tokio::test]
    async fn load_or_new_progress_falls_back_on_missing_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("batch-progress-1-10.json");
        let progress = load_or_new_progress(&path, 1, 10, 5).await.expect("progress");
        assert_eq!(progress.range, (1, 10));
        assert!(progress.completed_chunks.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_progress() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("batch-progress-1-10.json");
        let mut progress = ProgressRecord::new((1, 10), 5);
        progress.mark_completed(1);
        save_progress(&path, &progress).await.expect("save");

        let loaded = load_or_new_progress(&path, 1, 10, 5).await.expect("load");
        assert!(loaded.is_completed(1));
    }
}
