//! Browser Capability (§4.E)
//!
//! The narrow surface the Page Probe and Scheduler share regardless of
//! which of the two Worker Pool / Scheduler execution strategies backs a
//! run. The corpus carries no `async-trait` dependency, so rather than
//! reach for a `dyn Trait` with async methods this follows the corpus's
//! own preference (`browser_pool::BrowserPool` vs a fresh `launch_browser`
//! call in the orchestrator it was adapted from) for concrete dispatch: one
//! enum, two concrete variants, nothing to make object-safe.

use std::sync::Arc;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser_pool::{BrowserPool, PooledBrowserGuard};
use crate::browser_profile::{self, BrowserProfile};
use crate::browser_setup;

/// One live browser reused across every URL handed to it. Restarts itself
/// once on the next `new_page` call after a crash rather than failing every
/// remaining URL in the chunk.
pub struct SequentialBrowser {
    headless: bool,
    state: Mutex<SequentialState>,
}

struct SequentialState {
    browser: Browser,
    handler: JoinHandle<()>,
    _profile: BrowserProfile,
}

impl SequentialBrowser {
    pub async fn launch(headless: bool) -> Result<Self> {
        let state = Self::launch_state(headless).await?;
        Ok(Self { headless, state: Mutex::new(state) })
    }

    async fn launch_state(headless: bool) -> Result<SequentialState> {
        let profile = browser_profile::create_unique_profile_with_prefix("citescan_chrome_seq")
            .context("failed to create a sequential-mode browser profile")?;
        let (browser, handler, _dir) =
            browser_setup::launch_browser(headless, Some(profile.path().to_path_buf())).await?;
        Ok(SequentialState { browser, handler, _profile: profile })
    }

    /// Open a fresh page. If the current browser is already dead, restart
    /// it exactly once and retry before giving up.
    async fn new_page(&self) -> Result<Page> {
        {
            let guard = self.state.lock().await;
            if let Ok(page) = guard.browser.new_page("about:blank").await {
                return Ok(page);
            }
        }

        warn!("sequential browser appears dead, restarting");
        let mut guard = self.state.lock().await;
        let fresh = Self::launch_state(self.headless)
            .await
            .context("failed to restart sequential browser after crash")?;
        let stale = std::mem::replace(&mut *guard, fresh);
        stale.handler.abort();
        drop(stale);

        guard
            .browser
            .new_page("about:blank")
            .await
            .context("new_page failed even after restarting the sequential browser")
    }
}

/// Which of the two Worker Pool / Scheduler execution strategies is backing
/// the current run.
pub enum BrowserCapability {
    Sequential(Arc<SequentialBrowser>),
    Pooled(Arc<BrowserPool>),
}

impl BrowserCapability {
    /// Acquire one page. The returned [`ProbePage`] guarantees a release
    /// (page close, and for pooled mode a pool-guard drop) on every exit
    /// path: explicit `release()` or simply being dropped.
    pub async fn acquire_page(&self) -> Result<ProbePage> {
        match self {
            Self::Sequential(seq) => {
                let page = seq.new_page().await?;
                Ok(ProbePage::new(page, None))
            }
            Self::Pooled(pool) => {
                let guard = pool.acquire().await.context("failed to acquire a pooled browser")?;
                let page = guard
                    .browser()
                    .new_page("about:blank")
                    .await
                    .context("new_page on pooled browser failed")?;
                Ok(ProbePage::new(page, Some(guard)))
            }
        }
    }
}

/// An acquired page, scoped to one probe. Holds the pooled-mode browser
/// guard alongside the page so the underlying browser isn't returned to the
/// pool until this page is done with it.
pub struct ProbePage {
    page: Option<Page>,
    _guard: Option<PooledBrowserGuard>,
}

impl ProbePage {
    fn new(page: Page, guard: Option<PooledBrowserGuard>) -> Self {
        Self { page: Some(page), _guard: guard }
    }

    pub async fn goto(&self, url: &str) -> Result<(), String> {
        let page = self.page.as_ref().ok_or("page already released")?;
        page.goto(url).await.map_err(|e| e.to_string())?;
        Ok(())
    }

    pub async fn wait_for_navigation(&self) -> Result<(), String> {
        let page = self.page.as_ref().ok_or("page already released")?;
        page.wait_for_navigation().await.map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Run a script and return its JSON value. Errors are stringified here
    /// so callers (the probe) can feed them straight into the Error
    /// Classifier without depending on chromiumoxide error types.
    pub async fn evaluate(&self, script: &str) -> Result<Value, String> {
        let page = self.page.as_ref().ok_or("page already released")?;
        let eval = page.evaluate(script).await.map_err(|e| e.to_string())?;
        eval.into_value().map_err(|e| e.to_string())
    }

    /// Consume the page, closing it. Safe to call even though `Drop` would
    /// otherwise do the same thing; an explicit release lets the probe
    /// await the close rather than leave it to a detached background task.
    pub async fn release(mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
    }
}

impl Drop for ProbePage {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            tokio::spawn(async move {
                if let Err(e) = std::panic::AssertUnwindSafe(page.close())
                    .catch_unwind()
                    .await
                {
                    debug!("page close panicked during drop cleanup: {e:?}");
                }
            });
        }
    }
}
