//! Continuity-weighted similarity between a target day and a donor day.
//!
//! The score compares the station vectors of the target and donor days at
//! aligned offsets `-skip..=skip` and blends the per-offset SSIM values with a
//! fixed symmetric kernel:
//!
//! ```text
//! skip 0: [1]
//! skip 1: [1/6, 2/3, 1/6]
//! skip 2: [1/12, 1/6, 1/2, 1/6, 1/12]
//! ```
//!
//! For sunshine / solar, an offset where either side is dark contributes 0.

use crate::domain::{DailyRecord, DayRecord, DisaggConfig, HourlyRecord};
use crate::error::AppError;
use crate::math::ssim;

const KERNEL_0: [f64; 1] = [1.0];
const KERNEL_1: [f64; 3] = [1.0 / 6.0, 2.0 / 3.0, 1.0 / 6.0];
const KERNEL_2: [f64; 5] = [1.0 / 12.0, 1.0 / 6.0, 1.0 / 2.0, 1.0 / 6.0, 1.0 / 12.0];

/// Offset weights for continuity radius `skip`; each kernel sums to 1.
pub fn continuity_kernel(skip: usize) -> Result<&'static [f64], AppError> {
    match skip {
        0 => Ok(&KERNEL_0),
        1 => Ok(&KERNEL_1),
        2 => Ok(&KERNEL_2),
        _ => Err(AppError::config(format!(
            "continuity radius {skip} is not supported (CONTINUITY must be 1, 3 or 5)"
        ))),
    }
}

/// Scores donors against targets under one configuration.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer<'a> {
    config: &'a DisaggConfig,
    targets: &'a [DailyRecord],
    donors: &'a [HourlyRecord],
}

impl<'a> SimilarityScorer<'a> {
    pub fn new(
        config: &'a DisaggConfig,
        targets: &'a [DailyRecord],
        donors: &'a [HourlyRecord],
    ) -> Self {
        Self {
            config,
            targets,
            donors,
        }
    }

    /// Score donor `candidate` against target `target_index` with radius `skip`.
    pub fn score(&self, target_index: usize, candidate: usize, skip: usize) -> Result<f64, AppError> {
        let kernel = continuity_kernel(skip)?;
        let mut total = 0.0;
        for (w, offset) in kernel.iter().zip(-(skip as isize)..=skip as isize) {
            let t = shifted(self.targets, target_index, offset, "target")?;
            let d = shifted(self.donors, candidate, offset, "donor")?;

            if self.config.variable.is_light() && (t.is_dark() || d.is_dark()) {
                continue;
            }

            let (a, b) = (self.scoring_vector(t)?, self.scoring_vector(d)?);
            total += w * ssim(a, b, &self.config.ssim)?;
        }
        Ok(total)
    }

    /// Scores aligned with `pool`.
    pub fn score_pool(
        &self,
        target_index: usize,
        pool: &[usize],
        skip: usize,
    ) -> Result<Vec<f64>, AppError> {
        pool.iter()
            .map(|&j| self.score(target_index, j, skip))
            .collect()
    }

    fn scoring_vector<'r, R: DayRecord>(&self, record: &'r R) -> Result<&'r [f64], AppError> {
        if !self.config.preprocess.is_enabled() {
            return Ok(record.daily_values());
        }
        record.preprocessed().ok_or_else(|| {
            AppError::algorithm(format!(
                "preprocessing is enabled but {} has no preprocessed values",
                record.date()
            ))
        })
    }
}

fn shifted<'r, R>(
    series: &'r [R],
    index: usize,
    offset: isize,
    side: &str,
) -> Result<&'r R, AppError> {
    index
        .checked_add_signed(offset)
        .and_then(|i| series.get(i))
        .ok_or_else(|| {
            AppError::algorithm(format!(
                "{side} index {index} with offset {offset} falls outside the series"
            ))
        })
}
