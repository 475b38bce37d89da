//! Day classification.
//!
//! Every daily and hourly record is assigned a combined class id built from:
//!
//! - a season / month id (12 months, 2 seasons, or a single class)
//! - optionally, the circulation pattern observed on that date
//!
//! Candidate donors are only ever drawn from the target day's class.

pub mod classifier;

pub use classifier::*;
