//! citescan — a headless-browser crawler that visits publisher websites and
//! records evidence of Prebid.js and companion ad-tech integrations
//! (`apstag`, `googletag`, `ats`).
//!
//! The crate is organized leaf-first, mirroring the control flow of one
//! run: ingest a URL sequence (`url_source`), validate and plan it
//! (`domain_validator`, `planner`) against the durable dedup store
//! (`tracker`), drive it through a browser (`browser_capability`,
//! `browser_pool`, `browser_setup`, `browser_profile`) with the page probe
//! (`probe`) and scheduler (`scheduler`), classify failures
//! (`error_classifier`), and persist results (`sink`). `supervisor` drives
//! multi-chunk batch runs end to end.

pub mod browser_capability;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod domain_validator;
pub mod error_classifier;
pub mod model;
pub mod planner;
pub mod probe;
pub mod scheduler;
pub mod sink;
pub mod supervisor;
pub mod tracker;
pub mod url_source;
pub mod utils;
