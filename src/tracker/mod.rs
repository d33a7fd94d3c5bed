//! Processed-URL Tracker (§4.B)
//!
//! A durable, SQLite-backed key→status index for processed URLs. Mirrors the
//! corpus's `LinkIndex` (WAL-mode SQLite pool, schema-as-const-string,
//! idempotent `CREATE TABLE IF NOT EXISTS`) but owns the crawl's
//! deduplication state rather than a link graph.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::model::{TaskResult, UrlStatus};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS processed_urls (
    url TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    error_code TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0,
    has_prebid INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_processed_status ON processed_urls(status);
CREATE INDEX IF NOT EXISTS idx_processed_updated_at ON processed_urls(updated_at);
"#;

/// The durable per-URL processing-state index (§4.B). All mutations go
/// through this API; internal connection pooling + SQLite's own locking
/// guarantee atomic upserts under concurrent `mark`/`update_batch` calls
/// from multiple workers.
#[derive(Clone)]
pub struct Tracker {
    pool: SqlitePool,
    max_retries: u32,
}

impl Tracker {
    /// Open (creating if needed) the tracker database at `path`.
    pub async fn open(path: &Path, max_retries: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create tracker directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open tracker database at {}", path.display()))?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize tracker schema")?;

        Ok(Self { pool, max_retries })
    }

    /// In-memory tracker for tests and short-lived tooling runs.
    pub async fn open_in_memory(max_retries: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory tracker database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("failed to initialize tracker schema")?;

        Ok(Self { pool, max_retries })
    }

    /// `is_processed(url) -> bool`: true iff a row exists with
    /// `status in {success, no_data}`.
    pub async fn is_processed(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT status FROM processed_urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("is_processed query failed")?;

        Ok(match row {
            Some(row) => {
                let status: String = row.get("status");
                matches!(UrlStatus::parse(&status), Some(UrlStatus::Success | UrlStatus::NoData))
            }
            None => false,
        })
    }

    /// `filter_unprocessed(urls) -> urls`: batch-scan, preserves order.
    pub async fn filter_unprocessed(&self, urls: &[String]) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.context("begin filter_unprocessed tx")?;
        let mut processed = std::collections::HashSet::new();

        // SQLite has a default parameter-count ceiling; chunk large inputs.
        for chunk in urls.chunks(500) {
            let placeholders = std::iter::repeat_n("?", chunk.len()).collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT url FROM processed_urls WHERE url IN ({placeholders}) AND status IN ('success','no_data')"
            );
            let mut query = sqlx::query(&sql);
            for u in chunk {
                query = query.bind(u);
            }
            let rows = query.fetch_all(&mut *tx).await.context("filter_unprocessed batch query")?;
            for row in rows {
                let url: String = row.get("url");
                processed.insert(url);
            }
        }
        tx.commit().await.context("commit filter_unprocessed tx")?;

        Ok(urls.iter().filter(|u| !processed.contains(*u)).cloned().collect())
    }

    /// `mark(url, status, error_code?)`: idempotent upsert. If `status =
    /// retry`, increments `retry_count`; preserves `created_at` and the
    /// sticky-true property of `has_prebid`.
    pub async fn mark(&self, url: &str, status: UrlStatus, error_code: Option<&str>, has_prebid: bool) -> Result<()> {
        let now = Utc::now();
        let retry_increment = i64::from(status == UrlStatus::Retry);

        sqlx::query(
            r#"
            INSERT INTO processed_urls (url, status, timestamp, error_code, retry_count, has_prebid, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                status = excluded.status,
                timestamp = excluded.timestamp,
                error_code = excluded.error_code,
                retry_count = processed_urls.retry_count + ?,
                has_prebid = (processed_urls.has_prebid = 1 OR excluded.has_prebid = 1),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(url)
        .bind(status.as_str())
        .bind(now.to_rfc3339())
        .bind(error_code)
        .bind(retry_increment)
        .bind(has_prebid)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(retry_increment)
        .execute(&self.pool)
        .await
        .context("mark upsert failed")?;

        Ok(())
    }

    /// `update_batch(results)`: apply classified results atomically. A
    /// permanent error writes `status=error` with no retry eligibility; a
    /// transient error writes `status=retry` if `retry_count < max_retries`,
    /// else `status=error`.
    pub async fn update_batch(&self, results: &[TaskResult]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin update_batch tx")?;
        let now = Utc::now();

        for result in results {
            apply_one(&mut tx, result, self.max_retries, now).await?;
        }

        tx.commit().await.context("commit update_batch tx")?;
        Ok(())
    }

    /// `urls_for_retry(limit) -> urls`: oldest-`updated_at` first among
    /// retry-eligible rows.
    pub async fn urls_for_retry(&self, limit: usize) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT url FROM processed_urls WHERE status = 'retry' AND retry_count < ? ORDER BY updated_at ASC LIMIT ?",
        )
        .bind(i64::from(self.max_retries))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("urls_for_retry query failed")?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("url")).collect())
    }

    /// `import_existing(store_dir)`: for every JSON-lines result file under
    /// the store, mark each entry's URL `success`. Idempotent: re-running
    /// against the same store produces the same tracker state.
    pub async fn import_existing(&self, store_dir: &Path) -> Result<usize> {
        let mut imported = 0usize;
        let mut stack = vec![store_dir.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Ok(contents) = tokio::fs::read_to_string(&path).await else {
                    continue;
                };
                for line in contents.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
                        warn!("import_existing: skipping malformed line in {}", path.display());
                        continue;
                    };
                    let Some(url) = value.get("url").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let has_prebid = value
                        .get("prebidInstances")
                        .and_then(|v| v.as_array())
                        .is_some_and(|arr| !arr.is_empty());
                    self.mark(url, UrlStatus::Success, None, has_prebid).await?;
                    imported += 1;
                }
            }
        }

        debug!("import_existing: marked {imported} URLs success from {}", store_dir.display());
        Ok(imported)
    }

    /// `reset()`: remove all rows.
    pub async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM processed_urls").execute(&self.pool).await.context("reset failed")?;
        Ok(())
    }

    #[cfg(test)]
    async fn row_count(&self) -> i64 {
        sqlx::query("SELECT COUNT(*) as c FROM processed_urls")
            .fetch_one(&self.pool)
            .await
            .expect("count query")
            .get("c")
    }

    #[cfg(test)]
    async fn fetch(&self, url: &str) -> Option<(UrlStatus, u32, bool)> {
        let row = sqlx::query("SELECT status, retry_count, has_prebid FROM processed_urls WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .expect("fetch query");
        row.map(|r| {
            let status: String = r.get("status");
            let retry_count: i64 = r.get("retry_count");
            let has_prebid: bool = r.get("has_prebid");
            (UrlStatus::parse(&status).expect("valid status"), retry_count as u32, has_prebid)
        })
    }
}

async fn apply_one(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    result: &TaskResult,
    max_retries: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let (url, status, error_code, has_prebid, bump_retry) = match result {
        TaskResult::Success(data) => (data.url.clone(), UrlStatus::Success, None, data.has_prebid(), false),
        TaskResult::NoData { url } => (url.clone(), UrlStatus::NoData, None, false, false),
        TaskResult::Error { url, error } => {
            if error.retryable {
                let existing_retry_count: i64 = sqlx::query("SELECT retry_count FROM processed_urls WHERE url = ?")
                    .bind(url)
                    .fetch_optional(&mut **tx)
                    .await
                    .context("read retry_count for update_batch")?
                    .map(|r| r.get("retry_count"))
                    .unwrap_or(0);

                if (existing_retry_count as u32) < max_retries {
                    (url.clone(), UrlStatus::Retry, Some(error.code.clone()), false, true)
                } else {
                    (url.clone(), UrlStatus::Error, Some(error.code.clone()), false, false)
                }
            } else {
                (url.clone(), UrlStatus::Error, Some(error.code.clone()), false, false)
            }
        }
    };

    let retry_increment = i64::from(bump_retry);
    sqlx::query(
        r#"
        INSERT INTO processed_urls (url, status, timestamp, error_code, retry_count, has_prebid, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(url) DO UPDATE SET
            status = excluded.status,
            timestamp = excluded.timestamp,
            error_code = excluded.error_code,
            retry_count = processed_urls.retry_count + ?,
            has_prebid = (processed_urls.has_prebid = 1 OR excluded.has_prebid = 1),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&url)
    .bind(status.as_str())
    .bind(now.to_rfc3339())
    .bind(error_code)
    .bind(retry_increment)
    .bind(has_prebid)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(retry_increment)
    .execute(&mut **tx)
    .await
    .context("update_batch upsert failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassifiedError, PageData, PrebidInstance};

    #[tokio::test]
    async fn mark_then_is_processed() {
        let tracker = Tracker::open_in_memory(3).await.expect("open");
        tracker.mark("https://a.test", UrlStatus::Success, None, true).await.expect("mark");
        assert!(tracker.is_processed("https://a.test").await.expect("is_processed"));
        assert!(!tracker.is_processed("https://b.test").await.expect("is_processed"));
    }

    #[tokio::test]
    async fn filter_unprocessed_preserves_order() {
        let tracker = Tracker::open_in_memory(3).await.expect("open");
        tracker.mark("https://b.test", UrlStatus::Success, None, false).await.expect("mark");

        let urls = vec!["https://a.test".to_string(), "https://b.test".to_string(), "https://c.test".to_string()];
        let unprocessed = tracker.filter_unprocessed(&urls).await.expect("filter");
        assert_eq!(unprocessed, vec!["https://a.test", "https://c.test"]);
    }

    #[tokio::test]
    async fn has_prebid_is_sticky_true() {
        let tracker = Tracker::open_in_memory(3).await.expect("open");
        tracker.mark("https://a.test", UrlStatus::Success, None, true).await.expect("mark");
        tracker.mark("https://a.test", UrlStatus::Error, Some("SERVER_ERROR"), false).await.expect("mark again");

        let (_, _, has_prebid) = tracker.fetch("https://a.test").await.expect("row exists");
        assert!(has_prebid, "has_prebid must never revert to false");
    }

    #[tokio::test]
    async fn update_batch_retries_until_max_then_errors() {
        let tracker = Tracker::open_in_memory(2).await.expect("open");

        let retryable = ClassifiedError { code: "NAVIGATION_TIMEOUT".into(), retryable: true, message: "timeout".into() };
        let result = TaskResult::Error { url: "https://a.test".into(), error: retryable.clone() };

        tracker.update_batch(std::slice::from_ref(&result)).await.expect("batch 1");
        let (status, retry_count, _) = tracker.fetch("https://a.test").await.expect("row");
        assert_eq!(status, UrlStatus::Retry);
        assert_eq!(retry_count, 1);

        tracker.update_batch(std::slice::from_ref(&result)).await.expect("batch 2");
        let (status, retry_count, _) = tracker.fetch("https://a.test").await.expect("row");
        assert_eq!(status, UrlStatus::Retry);
        assert_eq!(retry_count, 2);

        tracker.update_batch(std::slice::from_ref(&result)).await.expect("batch 3");
        let (status, _, _) = tracker.fetch("https://a.test").await.expect("row");
        assert_eq!(status, UrlStatus::Error, "exceeding max_retries converts to a terminal error");
    }

    #[tokio::test]
    async fn permanent_error_never_marks_retry() {
        let tracker = Tracker::open_in_memory(3).await.expect("open");
        let permanent = ClassifiedError { code: "DNS_RESOLUTION_FAILED".into(), retryable: false, message: "nxdomain".into() };
        let result = TaskResult::Error { url: "https://a.test".into(), error: permanent };
        tracker.update_batch(&[result]).await.expect("batch");

        let (status, retry_count, _) = tracker.fetch("https://a.test").await.expect("row");
        assert_eq!(status, UrlStatus::Error);
        assert_eq!(retry_count, 0);
    }

    #[tokio::test]
    async fn reset_clears_all_rows() {
        let tracker = Tracker::open_in_memory(3).await.expect("open");
        tracker.mark("https://a.test", UrlStatus::Success, None, false).await.expect("mark");
        tracker.reset().await.expect("reset");
        assert_eq!(tracker.row_count().await, 0);
    }

    #[tokio::test]
    async fn import_existing_marks_success_idempotently() {
        let dir = tempfile::tempdir().expect("tempdir");
        let month_dir = dir.path().join("Jul-2026");
        tokio::fs::create_dir_all(&month_dir).await.expect("mkdir");
        let data = PageData {
            url: "https://a.test".into(),
            date: "2026-07-28".into(),
            libraries: vec![],
            prebid_instances: vec![PrebidInstance { global_var_name: "pbjs".into(), version: "8.0.0".into(), modules: vec![] }],
        };
        let line = serde_json::to_string(&data).expect("serialize") + "\n";
        tokio::fs::write(month_dir.join("2026-07-28.json"), line).await.expect("write");

        let tracker = Tracker::open_in_memory(3).await.expect("open");
        let first = tracker.import_existing(dir.path()).await.expect("import 1");
        let second = tracker.import_existing(dir.path()).await.expect("import 2");
        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(tracker.row_count().await, 1);

        let (status, _, has_prebid) = tracker.fetch("https://a.test").await.expect("row");
        assert_eq!(status, UrlStatus::Success);
        assert!(has_prebid);
    }
}
