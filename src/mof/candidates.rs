//! Candidate pool construction.
//!
//! A donor is a candidate for a target day when:
//!
//! 1. it lies inside `[skip, n - skip)` so every continuity offset has a neighbour
//! 2. it shares the target's combined class
//! 3. it passes the variable's admissibility filter (`Admissibility`)

use chrono::NaiveDate;
use log::{debug, info};
use nalgebra::DMatrix;

use crate::domain::{
    Admissibility, DailyRecord, DayRecord, HOURS_PER_DAY, HourlyRecord, NEAR_ZERO, Variable,
};
use crate::error::AppError;

/// Rescaled relative humidity above this rejects a donor.
///
/// Emitted hours are later clamped at 100 %; the soft cap only removes donors
/// whose shape would need heavy clipping.
pub const HUMIDITY_SOFT_CAP: f64 = 120.0;

/// Rescale one donor hour onto a target daily value (ratio method).
///
/// Returns `None` when a zero-shape donor would have to carry a positive target.
pub fn ratio_scale(target_daily: f64, donor_hour: f64, donor_daily: f64) -> Option<f64> {
    if donor_daily > 0.0 {
        Some(target_daily * donor_hour / donor_daily)
    } else if target_daily <= 0.0 {
        Some(0.0)
    } else {
        None
    }
}

/// Historical maximum hourly value per station and class.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyMaxima {
    /// `stations x classes`
    table: DMatrix<f64>,
}

impl HourlyMaxima {
    /// Scan the donor series once.
    pub fn derive(donors: &[HourlyRecord], n_stations: usize, class_count: usize) -> Self {
        let mut table = DMatrix::<f64>::zeros(n_stations, class_count);
        for donor in donors {
            let class = donor.class.class;
            if class >= class_count {
                continue;
            }
            for j in 0..n_stations.min(donor.n_stations()) {
                let peak = donor.hourly.row(j).iter().copied().fold(0.0, f64::max);
                if peak > table[(j, class)] {
                    table[(j, class)] = peak;
                }
            }
        }
        info!(
            "derived hourly maxima for {} stations x {} classes",
            n_stations, class_count
        );
        Self { table }
    }

    pub fn get(&self, station: usize, class: usize) -> Option<f64> {
        self.table.get((station, class)).copied()
    }

    pub fn n_stations(&self) -> usize {
        self.table.nrows()
    }

    pub fn n_classes(&self) -> usize {
        self.table.ncols()
    }
}

/// Builds the admissible donor pool for one target day.
#[derive(Debug, Clone, Copy)]
pub struct PoolBuilder<'a> {
    donors: &'a [HourlyRecord],
    variable: Variable,
    skip: usize,
    maxima: Option<&'a HourlyMaxima>,
}

impl<'a> PoolBuilder<'a> {
    pub fn new(
        donors: &'a [HourlyRecord],
        variable: Variable,
        skip: usize,
        maxima: Option<&'a HourlyMaxima>,
    ) -> Result<Self, AppError> {
        if variable.admissibility() == Admissibility::SolarMaximum && maxima.is_none() {
            return Err(AppError::algorithm(
                "solar radiation filtering requires the historical hourly maxima table",
            ));
        }
        Ok(Self {
            donors,
            variable,
            skip,
            maxima,
        })
    }

    /// Donor indices inside the continuity-trimmed range that share `class`.
    pub fn class_matches(&self, class: usize) -> Vec<usize> {
        let end = self.donors.len().saturating_sub(self.skip);
        (self.skip..end)
            .filter(|&j| self.donors[j].class.class == class)
            .collect()
    }

    /// Whether donor `j` may supply its shape to `target`.
    pub fn is_admissible(&self, target: &DailyRecord, j: usize) -> Result<bool, AppError> {
        let donor = self.donors.get(j).ok_or_else(|| {
            AppError::algorithm(format!("donor index {j} is outside the hourly series"))
        })?;
        if donor.n_stations() != target.values.len() {
            return Err(AppError::data(format!(
                "station count mismatch: target {} has {}, donor {} has {}",
                target.date,
                target.values.len(),
                donor.date,
                donor.n_stations()
            )));
        }

        match self.variable.admissibility() {
            Admissibility::None => Ok(true),
            Admissibility::ThresholdConsistency => Ok(threshold_consistent(target, donor)),
            Admissibility::WetDry => {
                Ok(threshold_consistent(target, donor) && carries_signal(target, donor))
            }
            Admissibility::HumidityCap => Ok(within_bound(target, donor, |_| {
                Some(HUMIDITY_SOFT_CAP)
            })),
            Admissibility::SolarMaximum => {
                let Some(maxima) = self.maxima else {
                    return Err(AppError::algorithm("missing hourly maxima table"));
                };
                let class = target.class.class;
                if class >= maxima.n_classes() {
                    return Err(AppError::data(format!(
                        "target {} has class {class} but no donor day was observed in that class",
                        target.date
                    )));
                }
                Ok(within_bound(target, donor, |j| maxima.get(j, class)))
            }
        }
    }

    /// Class-matched, filtered candidate indices for `target`.
    ///
    /// An empty pool is fatal: no donor can supply a shape for this day.
    pub fn build(&self, target: &DailyRecord, day_index: usize) -> Result<Vec<usize>, AppError> {
        let matched = self.class_matches(target.class.class);
        let n_matched = matched.len();

        let mut pool = Vec::with_capacity(n_matched);
        for j in matched {
            if self.is_admissible(target, j)? {
                pool.push(j);
            }
        }

        debug!(
            "{}: {} class matches, {} admissible",
            target.date,
            n_matched,
            pool.len()
        );

        if pool.is_empty() {
            return Err(no_candidates(day_index, target.date, target.class.class, n_matched));
        }
        Ok(pool)
    }
}

fn no_candidates(day_index: usize, date: NaiveDate, class: usize, n_matched: usize) -> AppError {
    AppError::algorithm(format!(
        "no candidates for day {day_index} ({date}): {n_matched} donors in class {class}, none admissible"
    ))
}

// A "wet/sunny" target station needs a donor with signal at that station.
fn threshold_consistent(target: &DailyRecord, donor: &HourlyRecord) -> bool {
    target
        .values
        .iter()
        .zip(donor.daily_values())
        .all(|(t, d)| !(*t > NEAR_ZERO && *d <= NEAR_ZERO))
}

// Any positive target needs a donor with a positive daily total to scale.
fn carries_signal(target: &DailyRecord, donor: &HourlyRecord) -> bool {
    target
        .values
        .iter()
        .zip(donor.daily_values())
        .all(|(t, d)| !(*t > 0.0 && *d <= 0.0))
}

fn within_bound(
    target: &DailyRecord,
    donor: &HourlyRecord,
    bound: impl Fn(usize) -> Option<f64>,
) -> bool {
    for (j, &t) in target.values.iter().enumerate() {
        let Some(limit) = bound(j) else {
            return false;
        };
        let d = donor.daily[j];
        for h in 0..HOURS_PER_DAY {
            match ratio_scale(t, donor.hourly[(j, h)], d) {
                Some(v) if v <= limit => {}
                _ => return false,
            }
        }
    }
    true
}
