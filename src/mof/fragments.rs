use log::trace;

use crate::domain::{DailyRecord, HOURS_PER_DAY, HourlyProfile, HourlyRecord, Method, NEAR_ZERO, Variable};
use crate::error::AppError;

use super::candidates::ratio_scale;

/// Transfer the hourly shape of `donor` onto the daily values of `target`.
///
/// Per station:
///
/// - wind / sunshine targets at or below `NEAR_ZERO` produce an all-zero day
/// - ratio variables scale each donor hour by `target / donor_daily`
/// - temperature shifts each donor hour by `target - donor_daily`
/// - humidity and sunshine are clamped to their physical caps
pub fn assign(
    target: &DailyRecord,
    donor: &HourlyRecord,
    variable: Variable,
    run: usize,
) -> Result<HourlyProfile, AppError> {
    let n = target.values.len();
    if donor.n_stations() != n {
        return Err(AppError::data(format!(
            "cannot assign {} ({} stations) from donor {} ({} stations)",
            target.date,
            n,
            donor.date,
            donor.n_stations()
        )));
    }

    let mut profile = HourlyProfile::zeros(target.date, run, n);
    let cap = variable.hourly_cap();

    for (j, &t) in target.values.iter().enumerate() {
        if variable.zero_below_threshold() && t <= NEAR_ZERO {
            continue;
        }
        let d = donor.daily[j];
        for h in 0..HOURS_PER_DAY {
            let donor_hour = donor.hourly[(j, h)];
            let mut value = match variable.method() {
                Method::Additive => t + donor_hour - d,
                Method::Ratio => ratio_scale(t, donor_hour, d).ok_or_else(|| {
                    AppError::algorithm(format!(
                        "donor {} has no signal at station {} but target {} needs {t}",
                        donor.date, j, target.date
                    ))
                })?,
            };
            if let Some(cap) = cap {
                value = value.min(cap);
            }
            profile.values[(j, h)] = value;
        }
    }

    trace!("{} run {}: assigned from donor {}", target.date, run, donor.date);
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use nalgebra::DMatrix;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 8, 14).unwrap()
    }

    fn diurnal(n: usize, base: f64, amp: f64) -> DMatrix<f64> {
        DMatrix::from_fn(n, HOURS_PER_DAY, |j, h| {
            let phase = (h as f64 - 14.0) / 24.0 * std::f64::consts::TAU;
            base + j as f64 + amp * phase.cos()
        })
    }

    #[test]
    fn ratio_method_reproduces_donor_when_target_matches() {
        let v = Variable::Precipitation;
        let donor = HourlyRecord::new(date(), diurnal(3, 2.0, 1.5), v.aggregation());
        let target = DailyRecord::new(date(), donor.daily.clone());
        let p = assign(&target, &donor, v, 1).unwrap();
        for (a, b) in p.values.iter().zip(donor.hourly.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn additive_method_reproduces_donor_when_target_matches() {
        let v = Variable::Temperature;
        let donor = HourlyRecord::new(date(), diurnal(2, -3.0, 6.0), v.aggregation());
        let target = DailyRecord::new(date(), donor.daily.clone());
        let p = assign(&target, &donor, v, 2).unwrap();
        assert_eq!(p.run, 2);
        for (a, b) in p.values.iter().zip(donor.hourly.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn ratio_profile_aggregates_back_to_target() {
        let v = Variable::Precipitation;
        let donor = HourlyRecord::new(date(), diurnal(2, 1.0, 0.8), v.aggregation());
        let target = DailyRecord::new(date(), vec![12.5, 0.4]);
        let p = assign(&target, &donor, v, 1).unwrap();
        for j in 0..2 {
            let total: f64 = p.values.row(j).iter().sum();
            assert!((total - target.values[j]).abs() < 1e-9);
        }
    }

    #[test]
    fn humidity_is_clamped_at_100() {
        let v = Variable::Humidity;
        let donor = HourlyRecord::new(date(), diurnal(1, 80.0, 15.0), v.aggregation());
        let target = DailyRecord::new(date(), vec![98.0]);
        let p = assign(&target, &donor, v, 1).unwrap();
        assert!(p.values.iter().all(|x| *x <= 100.0));
        assert!(p.values.iter().any(|x| *x == 100.0));
    }

    #[test]
    fn sunshine_is_clamped_at_60_minutes() {
        let v = Variable::Sunshine;
        let mut hourly = DMatrix::zeros(1, HOURS_PER_DAY);
        for h in 8..16 {
            hourly[(0, h)] = 50.0;
        }
        let donor = HourlyRecord::new(date(), hourly, v.aggregation());
        // donor has 6.67 h; 10 h would need 75 minutes per lit hour
        let target = DailyRecord::new(date(), vec![10.0]);
        let p = assign(&target, &donor, v, 1).unwrap();
        assert!(p.values.iter().all(|x| *x <= 60.0));
        assert_eq!(p.values[(0, 10)], 60.0);
        assert_eq!(p.values[(0, 2)], 0.0);
    }

    #[test]
    fn calm_wind_target_yields_zero_profile() {
        let v = Variable::Wind;
        let donor = HourlyRecord::new(date(), diurnal(2, 4.0, 2.0), v.aggregation());
        let target = DailyRecord::new(date(), vec![0.03, 3.0]);
        let p = assign(&target, &donor, v, 1).unwrap();
        assert!(p.values.row(0).iter().all(|x| *x == 0.0));
        assert!(p.values.row(1).iter().any(|x| *x > 0.0));
    }

    #[test]
    fn zero_donor_with_positive_target_is_an_error() {
        let v = Variable::Precipitation;
        let donor = HourlyRecord::new(date(), DMatrix::zeros(1, HOURS_PER_DAY), v.aggregation());
        let dry = DailyRecord::new(date(), vec![0.0]);
        assert!(assign(&dry, &donor, v, 1).is_ok());
        let wet = DailyRecord::new(date(), vec![1.0]);
        assert!(assign(&wet, &donor, v, 1).is_err());
    }
}
