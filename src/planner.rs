//! Planner (§4.D)
//!
//! Converts ingested URLs plus run options into an ordered batch plan:
//! a skip set (from the Tracker and/or the Domain Validator), and chunk
//! boundaries. Range has already been applied exactly once upstream by the
//! URL Source Reader (§4.A); the Planner never re-slices by range.

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::Options;
use crate::domain_validator::{self, Preflight};
use crate::model::{BatchPlan, Chunk};
use crate::tracker::Tracker;

/// Build the ordered batch plan for one run.
///
/// `candidate_urls` must already have range applied exactly once (by the
/// URL Source Reader). This function only: (1) removes pattern-invalid
/// hostnames, (2) applies the Tracker pre/post-filter per `options`, (3)
/// optionally runs the DNS/TLS preflight, and (4) slices into chunks.
pub async fn build_plan(options: &Options, candidate_urls: Vec<String>, tracker: &Tracker) -> Result<BatchPlan> {
    let before = candidate_urls.len();
    let mut urls: Vec<String> = candidate_urls
        .into_iter()
        .filter(|u| domain_validator::validate_pattern(u).is_ok())
        .collect();
    let rejected_by_pattern = before - urls.len();
    if rejected_by_pattern > 0 {
        debug!("Planner: {rejected_by_pattern} URLs rejected by the pattern validator");
    }

    if options.force_reprocess {
        debug!("Planner: force_reprocess set, skip set is forced empty");
    } else if options.prefilter_processed || options.skip_processed {
        let before = urls.len();
        urls = tracker.filter_unprocessed(&urls).await?;
        info!(
            "Planner: Tracker filter removed {} already-processed URLs ({} remain)",
            before - urls.len(),
            urls.len()
        );
    }

    if options.preflight {
        urls = apply_preflight(urls, options).await;
    }

    let chunk_size = if options.chunk_size == 0 { urls.len().max(1) } else { options.chunk_size };
    let chunks = chunk_urls(urls, chunk_size);

    Ok(BatchPlan { chunks })
}

/// Run the DNS/TLS preflight concurrently (bounded) and drop URLs that fail
/// it; failures do not abort the run, they simply shrink the plan.
async fn apply_preflight(urls: Vec<String>, options: &Options) -> Vec<String> {
    let preflight = Preflight::new(
        std::time::Duration::from_secs(options.preflight_timeout_secs),
        true,
    );

    let results: Vec<Option<String>> = stream::iter(urls)
        .map(|url| {
            let preflight = &preflight;
            async move {
                match preflight.check(&url).await {
                    Ok(()) => Some(url),
                    Err(code) => {
                        warn!("Planner preflight rejected {url}: {code}");
                        None
                    }
                }
            }
        })
        .buffer_unordered(16)
        .collect()
        .await;

    results.into_iter().flatten().collect()
}

/// Split a URL sequence into contiguous, 1-based, stably-numbered chunks.
/// `chunk_size = 0` was already normalized to "one chunk of everything" by
/// the caller (§8: "`chunkSize = 0` or omitted: single chunk of all URLs").
fn chunk_urls(urls: Vec<String>, chunk_size: usize) -> Vec<Chunk> {
    if urls.is_empty() {
        return Vec::new();
    }
    urls.chunks(chunk_size.max(1))
        .enumerate()
        .map(|(idx, slice)| Chunk { number: idx + 1, urls: slice.to_vec() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputSource, Options};
    use crate::model::UrlStatus;

    fn base_options() -> Options {
        Options::builder()
            .local_source("urls.txt")
            .output_dir("store")
            .build()
            .expect("build")
    }

    #[test]
    fn chunk_urls_single_chunk_when_size_equals_len() {
        let urls: Vec<String> = (0..3).map(|i| format!("https://s{i}.test")).collect();
        let chunks = chunk_urls(urls, 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].number, 1);
    }

    #[test]
    fn chunk_urls_splits_into_numbered_chunks() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://s{i}.test")).collect();
        let chunks = chunk_urls(urls, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(chunks[2].urls.len(), 1);
    }

    #[test]
    fn chunk_urls_empty_input_yields_no_chunks() {
        assert!(chunk_urls(Vec::new(), 100).is_empty());
    }

    #[tokio::test]
    async fn skip_processed_filters_out_prior_successes() {
        let tracker = Tracker::open_in_memory(3).await.expect("tracker");
        tracker.mark("https://seen.test", UrlStatus::Success, None, false).await.expect("mark");

        let mut options = base_options();
        options.skip_processed = true;
        options.source = InputSource::Local("urls.txt".into());

        let plan = build_plan(
            &options,
            vec!["https://seen.test".to_string(), "https://fresh.test".to_string()],
            &tracker,
        )
        .await
        .expect("plan");

        let all_urls: Vec<String> = plan.chunks.iter().flat_map(|c| c.urls.clone()).collect();
        assert_eq!(all_urls, vec!["https://fresh.test"]);
    }

    #[tokio::test]
    async fn force_reprocess_ignores_tracker_state() {
        let tracker = Tracker::open_in_memory(3).await.expect("tracker");
        tracker.mark("https://seen.test", UrlStatus::Success, None, false).await.expect("mark");

        let mut options = base_options();
        options.skip_processed = false;
        options.force_reprocess = true;

        let plan = build_plan(&options, vec!["https://seen.test".to_string()], &tracker)
            .await
            .expect("plan");
        let all_urls: Vec<String> = plan.chunks.iter().flat_map(|c| c.urls.clone()).collect();
        assert_eq!(all_urls, vec!["https://seen.test"]);
    }

    #[tokio::test]
    async fn pattern_invalid_urls_are_dropped() {
        let tracker = Tracker::open_in_memory(3).await.expect("tracker");
        let options = base_options();

        let plan = build_plan(
            &options,
            vec!["https://localhost".to_string(), "https://real-site.test".to_string()],
            &tracker,
        )
        .await
        .expect("plan");
        let all_urls: Vec<String> = plan.chunks.iter().flat_map(|c| c.urls.clone()).collect();
        assert_eq!(all_urls, vec!["https://real-site.test"]);
    }
}
