//! Page Probe (§4.F)
//!
//! Runs one URL through Init -> Configure -> Navigate -> Settle -> Extract
//! -> Classify -> Done. Never returns an `Err`: every failure path, from
//! page acquisition through extraction, is folded into a `TaskResult`, so
//! the Scheduler always gets exactly one result per URL.

use std::time::Duration;

use chrono::Local;
use serde::Deserialize;
use tracing::debug;

use crate::browser_capability::{BrowserCapability, ProbePage};
use crate::config::Options;
use crate::error_classifier::{self, Phase, RawError};
use crate::model::{ClassifiedError, PageData, PrebidInitState, PrebidInstance, TaskResult};
use crate::scheduler::CancelSignal;

mod script;

const PARKED_SUBSTRINGS: &[&str] = &["domain parked", "for sale", "this domain is parked"];
const MAX_NAVIGATION_ATTEMPTS: u32 = 2;
const MAX_EXTRACTION_ATTEMPTS: u32 = 2;

/// Per-probe timeouts, derived once from [`Options`] so the hot path never
/// re-reads the config struct.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub navigation_timeout: Duration,
    pub operation_timeout: Duration,
    pub settle_timeout: Duration,
}

impl ProbeOptions {
    #[must_use]
    pub fn from_options(options: &Options) -> Self {
        Self {
            navigation_timeout: Duration::from_secs(options.navigation_timeout_secs),
            operation_timeout: Duration::from_secs(options.operation_timeout_secs),
            settle_timeout: Duration::from_secs(options.settle_timeout_secs),
        }
    }
}

fn cancelled(url: &str) -> TaskResult {
    TaskResult::Error {
        url: url.to_string(),
        error: ClassifiedError {
            code: "CANCELED".to_string(),
            retryable: true,
            message: "cancellation observed at a probe state transition".to_string(),
        },
    }
}

/// Run one URL through the full probe pipeline. Checked against `cancel` at
/// every state transition (§4.F/§5: "each Probe checks cancellation at state
/// transitions; a cancelled Probe emits Error{code: CANCELED, retryable:
/// true}").
pub async fn probe_url(capability: &BrowserCapability, url: &str, opts: &ProbeOptions, cancel: &CancelSignal) -> TaskResult {
    if cancel.is_cancelled() {
        return cancelled(url);
    }

    let page = match capability.acquire_page().await {
        Ok(page) => page,
        Err(e) => {
            return TaskResult::Error {
                url: url.to_string(),
                error: error_classifier::classify(&RawError::new(Phase::Navigation, &e.to_string())),
            };
        }
    };

    let result = run_probe(&page, url, opts, cancel).await;
    page.release().await;
    result
}

async fn run_probe(page: &ProbePage, url: &str, opts: &ProbeOptions, cancel: &CancelSignal) -> TaskResult {
    if cancel.is_cancelled() {
        return cancelled(url);
    }

    if let Err(error) = navigate_with_retry(page, url, opts).await {
        return TaskResult::Error { url: url.to_string(), error };
    }

    if cancel.is_cancelled() {
        return cancelled(url);
    }

    if let Some(error) = check_parked(page).await {
        return TaskResult::Error { url: url.to_string(), error };
    }

    settle(page, opts.settle_timeout).await;

    if cancel.is_cancelled() {
        return cancelled(url);
    }

    match extract(page, opts).await {
        Ok(parts) => classify(url, parts),
        Err(error) => TaskResult::Error { url: url.to_string(), error },
    }
}

async fn navigate_with_retry(page: &ProbePage, url: &str, opts: &ProbeOptions) -> Result<(), ClassifiedError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match navigate_once(page, url, opts).await {
            Ok(()) => return Ok(()),
            Err(message) => {
                let classified = error_classifier::classify(&RawError::new(Phase::Navigation, &message));
                if attempt >= MAX_NAVIGATION_ATTEMPTS || !classified.retryable {
                    return Err(classified);
                }
                debug!("navigation to {url} failed on attempt {attempt} ({}), retrying", classified.code);
                tokio::time::sleep(Duration::from_millis(crate::utils::constants::NAVIGATION_RETRY_DELAY_MS)).await;
            }
        }
    }
}

async fn navigate_once(page: &ProbePage, url: &str, opts: &ProbeOptions) -> Result<(), String> {
    match tokio::time::timeout(opts.navigation_timeout, page.goto(url)).await {
        Ok(Ok(())) => {}
        Ok(Err(message)) => return Err(message),
        Err(_) => return Err("Navigation timeout exceeded".to_string()),
    }
    // Best effort: some pages never fire a distinct navigation-complete
    // event within the bound (streaming responses, long-poll content). The
    // goto above already proved the page is live, so a timeout here isn't
    // itself a failure worth retrying over.
    let _ = tokio::time::timeout(opts.navigation_timeout, page.wait_for_navigation()).await;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParkCheck {
    title: String,
    body_prefix: String,
}

async fn check_parked(page: &ProbePage) -> Option<ClassifiedError> {
    let value = page.evaluate(script::PARK_CHECK_SCRIPT).await.ok()?;
    let check: ParkCheck = serde_json::from_value(value).ok()?;
    if is_parked(&check.title, &check.body_prefix) {
        Some(error_classifier::classify(&RawError::new(
            Phase::Navigation,
            "page_unavailable: domain parked",
        )))
    } else {
        None
    }
}

fn is_parked(title: &str, body_prefix: &str) -> bool {
    let haystack = format!("{title} {body_prefix}").to_lowercase();
    PARKED_SUBSTRINGS.iter().any(|needle| haystack.contains(needle))
}

async fn settle(page: &ProbePage, timeout: Duration) {
    match tokio::time::timeout(timeout, page.evaluate(script::SETTLE_SCRIPT)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => debug!("settle script failed, ignoring: {e}"),
        Err(_) => debug!("settle phase timed out, proceeding to extraction anyway"),
    }
}

struct ExtractedParts {
    libraries: Vec<String>,
    prebid_instances: Vec<PrebidInstance>,
}

/// One `window._pbjsGlobals` entry as reported by the extraction script,
/// carrying the init-state token (§4.F) alongside the bit-stable fields.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrebidInstance {
    #[serde(rename = "globalVarName")]
    global_var_name: String,
    version: String,
    modules: Vec<String>,
    init_state: String,
}

impl RawPrebidInstance {
    fn init_state(&self) -> PrebidInitState {
        match self.init_state.as_str() {
            "complete" => PrebidInitState::Complete,
            "partial" => PrebidInitState::Partial,
            _ => PrebidInitState::Queue,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionResult {
    ok: bool,
    #[serde(default)]
    detached: bool,
    #[serde(default)]
    libraries: Vec<String>,
    #[serde(default)]
    prebid_instances: Vec<RawPrebidInstance>,
}

async fn extract(page: &ProbePage, opts: &ProbeOptions) -> Result<ExtractedParts, ClassifiedError> {
    let mut last_detached_err = None;
    for attempt in 0..MAX_EXTRACTION_ATTEMPTS {
        match extract_once(page, opts).await? {
            Some(parts) => return Ok(parts),
            None => {
                debug!("extraction reported a detached frame on attempt {}", attempt + 1);
                last_detached_err = Some(error_classifier::classify(&RawError::new(Phase::Extraction, "detached frame")));
            }
        }
    }
    Err(last_detached_err.unwrap_or_else(|| {
        error_classifier::classify(&RawError::new(Phase::Extraction, "detached frame"))
    }))
}

/// `Ok(None)` means the frame reported itself detached; the caller decides
/// whether to retry.
async fn extract_once(page: &ProbePage, opts: &ProbeOptions) -> Result<Option<ExtractedParts>, ClassifiedError> {
    let value = match tokio::time::timeout(opts.operation_timeout, page.evaluate(script::EXTRACTION_SCRIPT)).await {
        Ok(Ok(v)) => v,
        Ok(Err(message)) => return Err(error_classifier::classify(&RawError::new(Phase::Extraction, &message))),
        Err(_) => {
            return Err(error_classifier::classify(&RawError::new(
                Phase::Extraction,
                "extraction evaluation timed out",
            )));
        }
    };

    let parsed: ExtractionResult = serde_json::from_value(value).map_err(|e| {
        error_classifier::classify(&RawError::new(
            Phase::Extraction,
            &format!("failed to parse extraction result: {e}"),
        ))
    })?;

    if !parsed.ok || parsed.detached {
        return Ok(None);
    }

    for raw in &parsed.prebid_instances {
        debug!("prebid instance {} reported init state {:?}", raw.global_var_name, raw.init_state());
    }

    let prebid_instances = parsed
        .prebid_instances
        .into_iter()
        .map(|raw| PrebidInstance { global_var_name: raw.global_var_name, version: raw.version, modules: raw.modules })
        .collect();

    Ok(Some(ExtractedParts { libraries: parsed.libraries, prebid_instances }))
}

fn classify(url: &str, parts: ExtractedParts) -> TaskResult {
    let data = PageData {
        url: url.to_string(),
        date: Local::now().format("%Y-%m-%d").to_string(),
        libraries: parts.libraries,
        prebid_instances: parts.prebid_instances,
    };

    if data.libraries.is_empty() && !data.has_prebid() {
        TaskResult::NoData { url: url.to_string() }
    } else {
        TaskResult::Success(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parked_substrings_are_case_insensitive() {
        assert!(is_parked("This Domain is Parked", ""));
        assert!(is_parked("", "Buy this domain: for sale"));
        assert!(!is_parked("A Real Publisher", "Welcome to our site"));
    }

    #[test]
    fn classify_success_requires_library_or_versioned_prebid() {
        let with_library = ExtractedParts { libraries: vec!["googletag".into()], prebid_instances: vec![] };
        assert!(matches!(classify("https://a.test", with_library), TaskResult::Success(_)));

        let with_versioned_prebid = ExtractedParts {
            libraries: vec![],
            prebid_instances: vec![PrebidInstance {
                global_var_name: "pbjs".into(),
                version: "8.1.0".into(),
                modules: vec![],
            }],
        };
        assert!(matches!(classify("https://b.test", with_versioned_prebid), TaskResult::Success(_)));
    }

    #[test]
    fn classify_no_data_when_nothing_found() {
        let empty = ExtractedParts { libraries: vec![], prebid_instances: vec![] };
        assert!(matches!(classify("https://c.test", empty), TaskResult::NoData { .. }));

        let unversioned_prebid = ExtractedParts {
            libraries: vec![],
            prebid_instances: vec![PrebidInstance {
                global_var_name: "pbjs".into(),
                version: String::new(),
                modules: vec![],
            }],
        };
        assert!(matches!(classify("https://d.test", unversioned_prebid), TaskResult::NoData { .. }));
    }
}
