//! Result Sink (§4.I)
//!
//! Durable output for one chunk: dated JSON-lines result files, sidecar
//! error files bucketed by category, a Tracker update, and (for a local
//! input file) an atomic rewrite of the URL list with processed entries
//! removed.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error_classifier;
use crate::model::{PageData, TaskResult};
use crate::tracker::Tracker;

const NO_PREBID_FILE: &str = "no_prebid.txt";

/// Persist one chunk's results: the success store, the error sidecars, and
/// the Tracker. Does not touch the input list; call
/// [`rewrite_input_list`] separately once the URLs have been marked.
pub async fn write_chunk(output_dir: &Path, results: &[TaskResult], tracker: &Tracker) -> Result<()> {
    append_success_records(output_dir, results).await?;
    append_error_sidecars(output_dir, results).await?;
    tracker.update_batch(results).await.context("tracker update_batch failed for this chunk")?;
    Ok(())
}

async fn append_success_records(output_dir: &Path, results: &[TaskResult]) -> Result<()> {
    let successes: Vec<&PageData> =
        results.iter().filter_map(|r| if let TaskResult::Success(data) = r { Some(data) } else { None }).collect();
    if successes.is_empty() {
        return Ok(());
    }

    let now = Local::now();
    let month_dir = output_dir.join(now.format("%b-%Y").to_string());
    tokio::fs::create_dir_all(&month_dir).await.context("failed to create month output directory")?;
    let file_path = month_dir.join(format!("{}.json", now.format("%Y-%m-%d")));

    let mut buffer = String::new();
    for data in &successes {
        buffer.push_str(&serde_json::to_string(data).context("failed to serialize page data")?);
        buffer.push('\n');
    }

    append_to_file(&file_path, &buffer).await?;
    debug!("sink: appended {} success record(s) to {}", successes.len(), file_path.display());
    Ok(())
}

async fn append_error_sidecars(output_dir: &Path, results: &[TaskResult]) -> Result<()> {
    let errors_dir = output_dir.join("errors");
    tokio::fs::create_dir_all(&errors_dir).await.context("failed to create errors directory")?;

    let mut no_data_buffer = String::new();
    let mut by_sidecar: HashMap<&'static str, String> = HashMap::new();

    for result in results {
        match result {
            TaskResult::NoData { url } => {
                no_data_buffer.push_str(url);
                no_data_buffer.push('\n');
            }
            TaskResult::Error { url, error } => {
                let sidecar = error_classifier::sidecar_file(&error.code);
                let entry = by_sidecar.entry(sidecar).or_default();
                entry.push_str(&format!("{url},{}\n", error.code));
            }
            TaskResult::Success(_) => {}
        }
    }

    if !no_data_buffer.is_empty() {
        append_to_file(&errors_dir.join(NO_PREBID_FILE), &no_data_buffer).await?;
    }
    for (file_name, buffer) in by_sidecar {
        append_to_file(&errors_dir.join(file_name), &buffer).await?;
    }
    Ok(())
}

async fn append_to_file(path: &Path, contents: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open {} for append", path.display()))?;
    file.write_all(contents.as_bytes()).await.with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Atomically rewrite the local input file to drop every URL that now has a
/// `TaskResult` (success, no-data, or terminal error), leaving only what's
/// still unprocessed. Temp-file-then-rename keeps a crash mid-write from
/// corrupting the list a resumed run would read next.
pub async fn rewrite_input_list(list_path: &Path, processed: &HashSet<String>) -> Result<()> {
    let contents = tokio::fs::read_to_string(list_path)
        .await
        .with_context(|| format!("failed to read input list {}", list_path.display()))?;

    let remaining: Vec<&str> = contents.lines().filter(|line| !processed.contains(line.trim())).collect();

    let tmp_path = list_path.with_extension("tmp");
    {
        let mut tmp = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;
        let mut body = remaining.join("\n");
        if !remaining.is_empty() {
            body.push('\n');
        }
        tmp.write_all(body.as_bytes()).await.context("failed to write temp input list")?;
        tmp.sync_all().await.context("failed to fsync temp input list")?;
    }
    tokio::fs::rename(&tmp_path, list_path)
        .await
        .with_context(|| format!("failed to rename {} into place", list_path.display()))?;

    info!("sink: rewrote {} with {} URL(s) remaining", list_path.display(), remaining.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassifiedError;
    use tempfile::TempDir;

    fn success(url: &str) -> TaskResult {
        TaskResult::Success(PageData {
            url: url.to_string(),
            date: "2026-07-28".to_string(),
            libraries: vec!["googletag".to_string()],
            prebid_instances: vec![],
        })
    }

    #[tokio::test]
    async fn write_chunk_creates_dated_store_and_updates_tracker() {
        let dir = TempDir::new().expect("tempdir");
        let tracker = Tracker::open_in_memory(3).await.expect("tracker");

        let results = vec![
            success("https://a.test"),
            TaskResult::NoData { url: "https://b.test".to_string() },
            TaskResult::Error {
                url: "https://c.test".to_string(),
                error: ClassifiedError { code: "DNS_RESOLUTION_FAILED".to_string(), retryable: false, message: "net::ERR_NAME_NOT_RESOLVED".to_string() },
            },
        ];

        write_chunk(dir.path(), &results, &tracker).await.expect("write_chunk");

        let month_dir = dir.path().join(Local::now().format("%b-%Y").to_string());
        let mut found_json = false;
        let mut entries = tokio::fs::read_dir(&month_dir).await.expect("read month dir");
        while let Some(entry) = entries.next_entry().await.expect("next entry") {
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                found_json = true;
            }
        }
        assert!(found_json);

        let no_prebid = tokio::fs::read_to_string(dir.path().join("errors").join(NO_PREBID_FILE)).await.expect("no_prebid file");
        assert!(no_prebid.contains("https://b.test"));

        let navigation_errors =
            tokio::fs::read_to_string(dir.path().join("errors").join("navigation_errors.txt")).await.expect("navigation errors file");
        assert!(navigation_errors.contains("https://c.test"));

        assert!(tracker.is_processed("https://a.test").await.expect("is_processed"));
    }

    #[tokio::test]
    async fn rewrite_input_list_drops_processed_urls() {
        let dir = TempDir::new().expect("tempdir");
        let list_path = dir.path().join("urls.txt");
        tokio::fs::write(&list_path, "https://a.test\nhttps://b.test\nhttps://c.test\n").await.expect("write list");

        let mut processed = HashSet::new();
        processed.insert("https://a.test".to_string());
        processed.insert("https://c.test".to_string());

        rewrite_input_list(&list_path, &processed).await.expect("rewrite");

        let remaining = tokio::fs::read_to_string(&list_path).await.expect("read back");
        assert_eq!(remaining, "https://b.test\n");
    }
}
