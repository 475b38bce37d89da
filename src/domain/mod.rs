//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the variable catalogue (`Variable`) and its per-variable behaviour
//! - run configuration (`DisaggConfig`, `ClassificationConfig`, `SsimParams`)
//! - daily / hourly record series (`DailyRecord`, `HourlyRecord`) and the
//!   disaggregated output (`HourlyProfile`)

pub mod types;

pub use types::*;
