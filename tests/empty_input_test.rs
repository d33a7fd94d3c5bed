//! An input source that yields no URLs must stop the run cleanly: an empty
//! batch plan, no chunks for the Scheduler to drain, and no output created.

use citescan::config::Options;
use citescan::tracker::Tracker;
use citescan::{planner, url_source};
use tempfile::TempDir;

#[tokio::test]
async fn missing_local_input_file_produces_an_empty_plan() {
    let dir = TempDir::new().expect("tempdir");
    let input_path = dir.path().join("urls.txt");
    let output_dir = dir.path().join("store");

    let options = Options::builder()
        .local_source(&input_path)
        .output_dir(&output_dir)
        .build()
        .expect("build options");

    let client = reqwest::Client::new();
    let ingested = url_source::ingest(&client, &options.source, options.max_urls, options.range)
        .await
        .expect("ingest should not fail the run even when the file is missing");
    assert!(ingested.urls.is_empty());

    let tracker = Tracker::open_in_memory(options.max_retries).await.expect("tracker");
    let plan = planner::build_plan(&options, ingested.urls, &tracker).await.expect("plan");
    assert!(plan.chunks.is_empty());
    assert_eq!(plan.total_urls(), 0);

    assert!(!output_dir.exists(), "nothing should be written to the output directory for an empty run");
}

#[tokio::test]
async fn empty_local_file_produces_an_empty_plan() {
    let dir = TempDir::new().expect("tempdir");
    let input_path = dir.path().join("urls.txt");
    tokio::fs::write(&input_path, "").await.expect("write empty file");

    let options = Options::builder()
        .local_source(&input_path)
        .output_dir(dir.path().join("store"))
        .build()
        .expect("build options");

    let client = reqwest::Client::new();
    let ingested = url_source::ingest(&client, &options.source, options.max_urls, options.range)
        .await
        .expect("ingest");
    assert!(ingested.urls.is_empty());

    let tracker = Tracker::open_in_memory(options.max_retries).await.expect("tracker");
    let plan = planner::build_plan(&options, ingested.urls, &tracker).await.expect("plan");
    assert!(plan.chunks.is_empty());
}
