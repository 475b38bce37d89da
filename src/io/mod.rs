//! Input/output helpers.
//!
//! - parameter file parsing + validation (`params`)
//! - CSV ingest of the daily, hourly and circulation-pattern series (`ingest`)
//! - hourly output, candidate diagnostics and the JSON run summary (`export`)

pub mod export;
pub mod ingest;
pub mod params;

pub use export::*;
pub use ingest::*;
pub use params::*;
