//! Batch-mode crash/resume: a run that only gets through chunks 1-3 before
//! being interrupted, then resumed against the same progress file, must
//! finish chunks 4-5 without redoing 1-3, and the final progress record
//! must list every chunk as completed.
//!
//! Requires a Chromium/Chrome binary reachable the way `browser_setup`
//! looks for one.

use citescan::config::{ExecutionMode, Options};
use citescan::model::{BatchPlan, Chunk};
use citescan::scheduler::CancelSignal;
use citescan::supervisor;
use citescan::tracker::Tracker;
use mockito::Server;
use tempfile::TempDir;

#[tokio::test]
async fn resuming_a_batch_only_processes_the_chunks_left_incomplete() {
    let mut server = Server::new_async().await;
    let page_body = r#"<!DOCTYPE html><html><head><title>Plain page</title></head><body>nothing here</body></html>"#;
    for path in ["/p1", "/p2", "/p3", "/p4", "/p5"] {
        let _mock = server.mock("GET", path).with_status(200).with_body(page_body).create_async().await;
    }

    let urls: Vec<String> = ["/p1", "/p2", "/p3", "/p4", "/p5"].iter().map(|p| format!("{}{p}", server.url())).collect();
    let all_chunks: Vec<Chunk> = urls.iter().enumerate().map(|(i, u)| Chunk { number: i + 1, urls: vec![u.clone()] }).collect();

    let dir = TempDir::new().expect("tempdir");
    let options = Options::builder()
        .local_source(dir.path().join("urls.txt"))
        .output_dir(dir.path().join("store"))
        .execution_mode(ExecutionMode::Sequential)
        .batch_mode(true)
        .chunk_size(1)
        .build()
        .expect("build options");

    let tracker = Tracker::open_in_memory(options.max_retries).await.expect("tracker");
    let progress_path = dir.path().join("batch-progress-1-5.json");
    let cancel = CancelSignal::new();

    // First run only gets a plan covering chunks 1-3, simulating a process
    // that crashed (or was killed) before chunk 4 ever started.
    let partial_plan = BatchPlan { chunks: all_chunks[..3].to_vec() };
    let first_progress = supervisor::run_batch(&options, &partial_plan, &tracker, &progress_path, &cancel)
        .await
        .expect("first run");
    let mut completed = first_progress.completed_chunks.clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3]);
    assert!(first_progress.failed_chunks.is_empty());

    // Resume against the same progress file with the full plan; chunks 1-3
    // must be skipped, only 4 and 5 actually run.
    let full_plan = BatchPlan { chunks: all_chunks.clone() };
    let second_progress = supervisor::run_batch(&options, &full_plan, &tracker, &progress_path, &cancel)
        .await
        .expect("resumed run");
    let mut completed = second_progress.completed_chunks.clone();
    completed.sort_unstable();
    assert_eq!(completed, vec![1, 2, 3, 4, 5]);
    assert!(second_progress.failed_chunks.is_empty());

    // Every URL should show up exactly once in the no_prebid sidecar: chunks
    // 1-3 were written during the first run, 4-5 during the resumed one.
    let no_prebid = tokio::fs::read_to_string(options.output_dir.join("errors").join("no_prebid.txt"))
        .await
        .expect("no_prebid.txt");
    for url in &urls {
        assert_eq!(no_prebid.matches(url.as_str()).count(), 1, "{url} should appear exactly once, not be reprocessed");
    }
}
