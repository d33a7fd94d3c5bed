//! Configuration module: run options and their type-safe builder.

pub mod builder;
pub mod types;

pub use builder::{Complete, NeedsOutputDir, NeedsSource, OptionsBuilder};
pub use types::{ExecutionMode, InputSource, Options, RangeSpec};
