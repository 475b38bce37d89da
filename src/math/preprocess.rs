//! Normalization / standardization of the station vectors used for scoring.
//!
//! Daily values are often heavily skewed (precipitation, sunshine), so the
//! similarity can optionally be computed on transformed vectors. Statistics are
//! pooled over both the target series and the donor daily aggregates so the two
//! sides stay on the same scale. Non-positive values map to 0 in both modes.

use log::info;
use serde::Serialize;

use crate::domain::{DayRecord, Preprocess};
use crate::error::AppError;

/// Pooled statistics used by the transform (reported in the run summary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PreprocessStats {
    Normalize { max: f64 },
    Standardize { mean: f64, sd: f64 },
}

/// Fill `preprocessed` on every record of both series.
///
/// Returns `None` when preprocessing is disabled.
pub fn preprocess<A: DayRecord, B: DayRecord>(
    mode: Preprocess,
    targets: &mut [A],
    donors: &mut [B],
) -> Result<Option<PreprocessStats>, AppError> {
    let stats = match mode {
        Preprocess::None => return Ok(None),
        Preprocess::Normalize => normalize_stats(targets, donors)?,
        Preprocess::Standardize => standardize_stats(targets, donors)?,
    };

    let transform = |v: f64| -> f64 {
        if v <= 0.0 {
            return 0.0;
        }
        match stats {
            PreprocessStats::Normalize { max } => v / max,
            PreprocessStats::Standardize { mean, sd } => (v - mean) / sd,
        }
    };
    apply(targets, &transform);
    apply(donors, &transform);

    info!("preprocessing applied: {stats:?}");
    Ok(Some(stats))
}

fn apply<R: DayRecord>(records: &mut [R], f: impl Fn(f64) -> f64) {
    for r in records.iter_mut() {
        let values = r.daily_values().iter().map(|v| f(*v)).collect();
        r.set_preprocessed(values);
    }
}

fn pooled<'a, A: DayRecord, B: DayRecord>(
    targets: &'a [A],
    donors: &'a [B],
) -> impl Iterator<Item = f64> + 'a {
    targets
        .iter()
        .flat_map(|r| r.daily_values().iter().copied())
        .chain(donors.iter().flat_map(|r| r.daily_values().iter().copied()))
}

fn normalize_stats<A: DayRecord, B: DayRecord>(
    targets: &[A],
    donors: &[B],
) -> Result<PreprocessStats, AppError> {
    // The lower bound is pinned at 0.
    let max = pooled(targets, donors).fold(0.0, f64::max);
    if !(max > 0.0 && max.is_finite()) {
        return Err(AppError::algorithm(
            "normalization impossible: no positive values in either series",
        ));
    }
    Ok(PreprocessStats::Normalize { max })
}

fn standardize_stats<A: DayRecord, B: DayRecord>(
    targets: &[A],
    donors: &[B],
) -> Result<PreprocessStats, AppError> {
    let positive: Vec<f64> = pooled(targets, donors).filter(|v| *v > 0.0).collect();
    if positive.is_empty() {
        return Err(AppError::algorithm(
            "standardization impossible: no positive values in either series",
        ));
    }
    let n = positive.len() as f64;
    let mean = positive.iter().sum::<f64>() / n;
    let sd = (positive.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if !(sd > 0.0 && sd.is_finite()) {
        return Err(AppError::algorithm(
            "standardization impossible: positive values have zero spread",
        ));
    }
    Ok(PreprocessStats::Standardize { mean, sd })
}
