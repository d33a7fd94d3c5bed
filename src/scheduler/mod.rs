//! Worker Pool / Scheduler (§4.G)
//!
//! Drains one chunk of URLs to completion under one of the two execution
//! modes. Pooled concurrency is bounded with a semaphore and drained with
//! an unordered join set, the same pattern the corpus's crawl orchestrator
//! uses for its concurrent page tasks; a worker panic is caught at the task
//! boundary and folded into a `WORKER_CRASH` result rather than losing the
//! URL or poisoning the rest of the chunk.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::browser_capability::BrowserCapability;
use crate::config::{ExecutionMode, Options};
use crate::model::{ClassifiedError, TaskResult};
use crate::probe::{self, ProbeOptions};

/// Cooperative cancellation flag shared between the Batch Supervisor and a
/// running chunk. Checked between tasks; never pre-empts one in flight.
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run every URL in `urls` to completion, at most once each, returning one
/// `TaskResult` per distinct URL actually scheduled.
pub async fn run_chunk(
    capability: Arc<BrowserCapability>,
    urls: &[String],
    options: &Options,
    cancel: &CancelSignal,
) -> Vec<TaskResult> {
    let opts = ProbeOptions::from_options(options);
    let mut seen = HashSet::with_capacity(urls.len());
    let deduped: Vec<String> = urls.iter().filter(|u| seen.insert((*u).clone())).cloned().collect();

    match options.execution_mode {
        ExecutionMode::Sequential => run_sequential(&capability, &deduped, &opts, cancel).await,
        ExecutionMode::Pooled => {
            run_pooled(capability, &deduped, &opts, options.concurrency, options.cancel_grace_secs, cancel).await
        }
    }
}

async fn run_sequential(
    capability: &BrowserCapability,
    urls: &[String],
    opts: &ProbeOptions,
    cancel: &CancelSignal,
) -> Vec<TaskResult> {
    let mut results = Vec::with_capacity(urls.len());
    let mut iter = urls.iter();
    for url in iter.by_ref() {
        if cancel.is_cancelled() {
            info!("cancellation observed, stopping sequential chunk early");
            break;
        }
        results.push(probe::probe_url(capability, url, opts, cancel).await);
    }
    // Every URL handed to this chunk still needs exactly one TaskResult
    // (§4.G "return-value integrity"); the ones never started because
    // cancellation was observed mid-loop are reported CANCELED rather than
    // silently dropped.
    for url in iter {
        results.push(TaskResult::Error {
            url: url.clone(),
            error: ClassifiedError {
                code: "CANCELED".to_string(),
                retryable: true,
                message: "cancellation observed before this URL was scheduled".to_string(),
            },
        });
    }
    results
}

async fn run_pooled(
    capability: Arc<BrowserCapability>,
    urls: &[String],
    opts: &ProbeOptions,
    concurrency: usize,
    cancel_grace_secs: u64,
    cancel: &CancelSignal,
) -> Vec<TaskResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = FuturesUnordered::new();
    let mut abort_handles: Vec<(String, tokio::task::AbortHandle)> = Vec::new();
    let mut results = Vec::with_capacity(urls.len());

    let mut iter = urls.iter();
    for url in iter.by_ref() {
        if cancel.is_cancelled() {
            info!("cancellation observed, not scheduling the remaining URLs in this chunk");
            break;
        }
        let capability = Arc::clone(&capability);
        let semaphore = Arc::clone(&semaphore);
        let opts = opts.clone();
        let cancel = cancel.clone();
        let url = url.clone();
        let task_url = url.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("chunk semaphore is never closed");
            let fut = probe::probe_url(&capability, &task_url, &opts, &cancel);
            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => TaskResult::Error {
                    url: task_url,
                    error: ClassifiedError {
                        code: "WORKER_CRASH".to_string(),
                        retryable: true,
                        message: "worker task panicked while probing this URL".to_string(),
                    },
                },
            }
        });
        abort_handles.push((url.clone(), handle.abort_handle()));
        tasks.push(async move { (url, handle.await) });
    }

    // Every URL never scheduled because cancellation was observed mid-loop
    // still needs exactly one TaskResult (§4.G "return-value integrity").
    for url in iter {
        results.push(TaskResult::Error {
            url: url.clone(),
            error: ClassifiedError {
                code: "CANCELED".to_string(),
                retryable: true,
                message: "cancellation observed before this URL was scheduled".to_string(),
            },
        });
    }

    let mut grace_started = false;
    let grace = tokio::time::sleep(Duration::from_secs(cancel_grace_secs));
    tokio::pin!(grace);

    loop {
        if cancel.is_cancelled() && !grace_started {
            grace_started = true;
            warn!(
                "cancellation observed mid-chunk: allowing up to {cancel_grace_secs}s for {} in-flight task(s)",
                tasks.len()
            );
            grace.as_mut().reset(tokio::time::Instant::now() + Duration::from_secs(cancel_grace_secs));
        }

        if grace_started {
            tokio::select! {
                next = tasks.next() => match next {
                    Some((url, joined)) => {
                        abort_handles.retain(|(u, _)| u != &url);
                        push_joined(&mut results, url, joined);
                    }
                    None => break,
                },
                () = &mut grace => {
                    warn!("cancel grace period elapsed, force-releasing {} remaining task(s)", abort_handles.len());
                    for (url, handle) in abort_handles.drain(..) {
                        handle.abort();
                        results.push(TaskResult::Error {
                            url,
                            error: ClassifiedError {
                                code: "CANCELED".to_string(),
                                retryable: true,
                                message: "cancellation grace period elapsed before this task finished".to_string(),
                            },
                        });
                    }
                    break;
                }
            }
        } else {
            match tasks.next().await {
                Some((url, joined)) => {
                    abort_handles.retain(|(u, _)| u != &url);
                    push_joined(&mut results, url, joined);
                }
                None => break,
            }
        }
    }

    results
}

fn push_joined(results: &mut Vec<TaskResult>, url: String, joined: Result<TaskResult, tokio::task::JoinError>) {
    match joined {
        Ok(result) => results.push(result),
        Err(join_err) => {
            // The spawned task already catches its own panics and converts
            // them to a WORKER_CRASH TaskResult; a JoinError here only
            // happens when this scheduler itself aborted the handle, which
            // only occurs in the grace-period-elapsed path above (and that
            // path never reaches tasks.next() again for the aborted task).
            // Treat any other JoinError defensively as a worker crash rather
            // than losing the URL.
            error!("worker task join failed unexpectedly for {url}: {join_err}");
            results.push(TaskResult::Error {
                url,
                error: ClassifiedError {
                    code: "WORKER_CRASH".to_string(),
                    retryable: true,
                    message: format!("worker task join failed: {join_err}"),
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signal_starts_uncancelled() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());
        signal.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn dedup_preserves_first_occurrence_order() {
        let urls = vec!["https://a.test".to_string(), "https://b.test".to_string(), "https://a.test".to_string()];
        let mut seen = HashSet::new();
        let deduped: Vec<String> = urls.iter().filter(|u| seen.insert((*u).clone())).cloned().collect();
        assert_eq!(deduped, vec!["https://a.test", "https://b.test"]);
    }
}
