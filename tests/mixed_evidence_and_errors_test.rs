//! End-to-end through a live (headless) browser: one chunk mixing a page
//! with ad-tech evidence, a parked domain, a page with no evidence at all,
//! and an unresolvable host, verified against the dated result store and
//! the error sidecar files the Result Sink writes.
//!
//! Requires a Chromium/Chrome binary reachable the way `browser_setup`
//! looks for one (`CHROMIUM_PATH`, a well-known install path, or `which`).

use std::sync::Arc;

use citescan::browser_capability::{BrowserCapability, SequentialBrowser};
use citescan::config::Options;
use citescan::scheduler::{self, CancelSignal};
use citescan::sink;
use citescan::tracker::Tracker;
use mockito::Server;
use tempfile::TempDir;

#[tokio::test]
async fn chunk_with_mixed_evidence_and_a_dns_failure_lands_in_the_right_buckets() {
    let mut server = Server::new_async().await;

    let with_evidence_body = r#"<!DOCTYPE html><html><head><title>Ad-supported publisher</title>
        <script>
            window.googletag = window.googletag || {};
            window._pbjsGlobals = ['pbjs'];
            window.pbjs = { version: '8.1.0', installedModules: ['core', 'rubiconBidAdapter'] };
        </script></head><body>Welcome</body></html>"#;
    let parked_body = r#"<!DOCTYPE html><html><head><title>This Domain is Parked</title></head>
        <body>Buy this domain. For sale by owner.</body></html>"#;
    let plain_body = r#"<!DOCTYPE html><html><head><title>Just a page</title></head>
        <body><p>Nothing ad-tech related here.</p></body></html>"#;

    let _evidence_mock =
        server.mock("GET", "/with-evidence").with_status(200).with_body(with_evidence_body).create_async().await;
    let _parked_mock = server.mock("GET", "/parked").with_status(200).with_body(parked_body).create_async().await;
    let _plain_mock = server.mock("GET", "/plain").with_status(200).with_body(plain_body).create_async().await;

    let urls = vec![
        format!("{}/with-evidence", server.url()),
        format!("{}/parked", server.url()),
        format!("{}/plain", server.url()),
        "http://this-host-does-not-exist.invalid/".to_string(),
    ];

    let dir = TempDir::new().expect("tempdir");
    let options = Options::builder()
        .local_source(dir.path().join("urls.txt"))
        .output_dir(dir.path().join("store"))
        .execution_mode(citescan::config::ExecutionMode::Sequential)
        .build()
        .expect("build options");

    let browser = SequentialBrowser::launch(true).await.expect("launch headless browser");
    let capability = Arc::new(BrowserCapability::Sequential(Arc::new(browser)));
    let cancel = CancelSignal::new();

    let results = scheduler::run_chunk(capability, &urls, &options, &cancel).await;
    assert_eq!(results.len(), 4);

    let tracker = Tracker::open_in_memory(options.max_retries).await.expect("tracker");
    sink::write_chunk(&options.output_dir, &results, &tracker).await.expect("write_chunk");

    let month_dir = options.output_dir.join(chrono::Local::now().format("%b-%Y").to_string());
    let mut success_lines = String::new();
    let mut entries = tokio::fs::read_dir(&month_dir).await.expect("read month dir");
    while let Some(entry) = entries.next_entry().await.expect("next entry") {
        if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
            success_lines = tokio::fs::read_to_string(entry.path()).await.expect("read dated file");
        }
    }
    assert!(success_lines.contains("with-evidence"), "page with evidence should land in the success store");
    assert!(success_lines.contains("googletag"));
    assert!(success_lines.contains("8.1.0"));

    let no_prebid =
        tokio::fs::read_to_string(options.output_dir.join("errors").join("no_prebid.txt")).await.expect("no_prebid.txt");
    assert!(no_prebid.contains("/plain"));

    let content_errors = tokio::fs::read_to_string(options.output_dir.join("errors").join("content_errors.txt"))
        .await
        .expect("content_errors.txt");
    assert!(content_errors.contains("/parked"));
    assert!(content_errors.contains("PAGE_UNAVAILABLE"));

    let navigation_errors = tokio::fs::read_to_string(options.output_dir.join("errors").join("navigation_errors.txt"))
        .await
        .expect("navigation_errors.txt");
    assert!(navigation_errors.contains("this-host-does-not-exist.invalid"));
    assert!(navigation_errors.contains("DNS_RESOLUTION_FAILED"));

    assert!(tracker.is_processed(&urls[0]).await.expect("is_processed"));
    assert!(tracker.is_processed(&urls[2]).await.expect("is_processed"));
    assert!(!tracker.is_processed(&urls[3]).await.expect("is_processed"), "a retryable-looking DNS failure is terminal, but not a 'processed' success/no-data state");
}
