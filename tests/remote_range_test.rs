//! A range applied to a large remote URL list must be authoritative over the
//! default `maxUrls` cap, and must be materialized exactly once against the
//! sequence actually fetched over HTTP (not a pre-trimmed copy).

use citescan::config::{InputSource, RangeSpec};
use citescan::url_source;
use mockito::Server;

#[tokio::test]
async fn range_over_a_million_url_remote_list_yields_exactly_the_slice() {
    let mut server = Server::new_async().await;

    let body: String = (1..=1_000_000).map(|i| format!("https://site-{i}.test\n")).collect();
    let _mock = server
        .mock("GET", "/urls.txt")
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let source = InputSource::Remote(format!("{}/urls.txt", server.url()));
    let range = RangeSpec::parse("500000-500002").expect("parse range");

    let client = reqwest::Client::new();
    let ingested = url_source::ingest(&client, &source, 100, Some(range)).await.expect("ingest");

    assert_eq!(ingested.urls.len(), 3);
    assert_eq!(ingested.urls[0], "https://site-500000.test");
    assert_eq!(ingested.urls[2], "https://site-500002.test");
    assert!(ingested.range_already_applied);
}

#[tokio::test]
async fn open_ended_range_runs_to_the_end_of_the_fetched_list() {
    let mut server = Server::new_async().await;

    let body: String = (1..=10).map(|i| format!("https://site-{i}.test\n")).collect();
    let _mock = server.mock("GET", "/urls.txt").with_status(200).with_body(body).create_async().await;

    let source = InputSource::Remote(format!("{}/urls.txt", server.url()));
    let range = RangeSpec::parse("8-").expect("parse range");

    let client = reqwest::Client::new();
    let ingested = url_source::ingest(&client, &source, 2, Some(range)).await.expect("ingest");

    assert_eq!(ingested.urls, vec!["https://site-8.test", "https://site-9.test", "https://site-10.test"]);
}
