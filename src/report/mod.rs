//! Reporting utilities: series summaries and formatted terminal output.

use chrono::NaiveDate;

use crate::classify::class_counts;
use crate::domain::DayRecord;

pub mod format;

pub use format::*;

/// Shape of one loaded series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSummary {
    pub label: &'static str,
    pub days: usize,
    pub first: Option<NaiveDate>,
    pub last: Option<NaiveDate>,
    /// Days per combined class id.
    pub class_counts: Vec<usize>,
}

impl SeriesSummary {
    pub fn of<R: DayRecord>(label: &'static str, records: &[R], class_count: usize) -> Self {
        Self {
            label,
            days: records.len(),
            first: records.first().map(|r| r.date()),
            last: records.last().map(|r| r.date()),
            class_counts: class_counts(records, class_count),
        }
    }

    /// Class ids with at least one day.
    pub fn populated_classes(&self) -> usize {
        self.class_counts.iter().filter(|c| **c > 0).count()
    }
}
