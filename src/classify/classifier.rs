use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use log::debug;

use crate::domain::{ClassificationConfig, DayClass, DayRecord};
use crate::error::AppError;

/// Circulation-pattern series: one integer class (1-based) per date.
#[derive(Debug, Clone)]
pub struct CirculationSeries {
    by_date: HashMap<NaiveDate, u32>,
    first: NaiveDate,
    last: NaiveDate,
    class_count: u32,
}

impl CirculationSeries {
    pub fn new(entries: impl IntoIterator<Item = (NaiveDate, u32)>) -> Result<Self, AppError> {
        let mut by_date = HashMap::new();
        let mut first: Option<NaiveDate> = None;
        let mut last: Option<NaiveDate> = None;
        let mut class_count = 0u32;

        for (date, cp) in entries {
            if cp == 0 {
                return Err(AppError::data(format!(
                    "circulation pattern on {date} is 0; pattern classes start at 1"
                )));
            }
            if let Some(prev) = by_date.insert(date, cp) {
                if prev != cp {
                    return Err(AppError::data(format!(
                        "circulation pattern for {date} is given twice ({prev} and {cp})"
                    )));
                }
            }
            class_count = class_count.max(cp);
            first = Some(first.map_or(date, |d| d.min(date)));
            last = Some(last.map_or(date, |d| d.max(date)));
        }

        let (Some(first), Some(last)) = (first, last) else {
            return Err(AppError::data("circulation pattern series is empty"));
        };

        Ok(Self {
            by_date,
            first,
            last,
            class_count,
        })
    }

    /// Pattern class on `date`; a missing date is a data error.
    pub fn lookup(&self, date: NaiveDate) -> Result<u32, AppError> {
        self.by_date.get(&date).copied().ok_or_else(|| {
            AppError::data(format!(
                "no circulation pattern for {date} (series covers {} to {})",
                self.first, self.last
            ))
        })
    }

    /// Maximum pattern value observed in the series.
    pub fn class_count(&self) -> u32 {
        self.class_count
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.first
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last
    }
}

/// Assigns combined class ids under a fixed configuration.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    config: &'a ClassificationConfig,
    patterns: Option<&'a CirculationSeries>,
}

impl<'a> Classifier<'a> {
    /// Validate the configuration before any record is touched.
    pub fn new(
        config: &'a ClassificationConfig,
        patterns: Option<&'a CirculationSeries>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        if config.circulation && patterns.is_none() {
            return Err(AppError::config(
                "circulation-pattern classification is enabled but no pattern series was supplied",
            ));
        }
        Ok(Self {
            config,
            patterns: if config.circulation { patterns } else { None },
        })
    }

    pub fn season_month_id(&self, date: NaiveDate) -> u32 {
        let month = date.month();
        if self.config.by_month {
            month - 1
        } else if self.config.by_season {
            let summer = month >= self.config.summer_from && month <= self.config.summer_to;
            u32::from(summer)
        } else {
            0
        }
    }

    /// Distance between consecutive pattern blocks of class ids.
    ///
    /// Equal to the pattern class count unless there are more season / month ids
    /// than patterns, in which case the wider stride keeps class ids unique.
    fn stride(&self) -> usize {
        let season_count = self.config.season_month_count();
        match self.patterns {
            Some(p) => (p.class_count() as usize).max(season_count),
            None => season_count,
        }
    }

    /// Number of distinct combined class ids (upper bound, exclusive).
    pub fn class_count(&self) -> usize {
        match self.patterns {
            Some(p) => p.class_count() as usize * self.stride(),
            None => self.config.season_month_count(),
        }
    }

    /// Class fields of `date`.
    ///
    /// With patterns the combined id is `(cp - 1) * stride + season`, where the
    /// stride is `max(cp_count, season_count)`. That matches
    /// `(cp - 1) * cp_count + season` whenever there are at least as many
    /// patterns as season / month ids; with monthly classes and fewer than 12
    /// patterns the wider stride keeps every (pattern, month) pair distinct.
    pub fn classify_date(&self, date: NaiveDate) -> Result<DayClass, AppError> {
        let season = self.season_month_id(date);
        match self.patterns {
            Some(series) => {
                let pattern = series.lookup(date)?;
                let class = (pattern as usize - 1) * self.stride() + season as usize;
                Ok(DayClass {
                    pattern,
                    season,
                    class,
                })
            }
            None => Ok(DayClass {
                pattern: 0,
                season,
                class: season as usize,
            }),
        }
    }

    /// Write class fields into every record.
    pub fn classify<R: DayRecord>(&self, records: &mut [R]) -> Result<(), AppError> {
        for record in records.iter_mut() {
            let class = self.classify_date(record.date())?;
            record.set_class(class);
        }
        debug!(
            "classified {} records into {} classes",
            records.len(),
            self.class_count()
        );
        Ok(())
    }
}

/// Number of records per combined class id.
pub fn class_counts<R: DayRecord>(records: &[R], class_count: usize) -> Vec<usize> {
    let n = records
        .iter()
        .map(|r| r.class().class + 1)
        .max()
        .unwrap_or(0)
        .max(class_count);
    let mut counts = vec![0usize; n];
    for r in records {
        counts[r.class().class] += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DailyRecord;
    use proptest::prelude::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn records(dates: &[NaiveDate]) -> Vec<DailyRecord> {
        dates.iter().map(|d| DailyRecord::new(*d, vec![1.0])).collect()
    }

    #[test]
    fn month_mode_uses_zero_based_month() {
        let config = ClassificationConfig {
            by_month: true,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, None).unwrap();
        let mut recs = records(&[day(2020, 1, 15), day(2020, 12, 1)]);
        classifier.classify(&mut recs).unwrap();
        assert_eq!(recs[0].class.class, 0);
        assert_eq!(recs[1].class.class, 11);
        assert_eq!(classifier.class_count(), 12);
    }

    #[test]
    fn season_mode_uses_inclusive_summer_range() {
        let config = ClassificationConfig {
            by_season: true,
            summer_from: 5,
            summer_to: 9,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, None).unwrap();
        assert_eq!(classifier.season_month_id(day(2020, 4, 30)), 0);
        assert_eq!(classifier.season_month_id(day(2020, 5, 1)), 1);
        assert_eq!(classifier.season_month_id(day(2020, 9, 30)), 1);
        assert_eq!(classifier.season_month_id(day(2020, 10, 1)), 0);
    }

    #[test]
    fn no_mode_is_single_class() {
        let config = ClassificationConfig::default();
        let classifier = Classifier::new(&config, None).unwrap();
        assert_eq!(classifier.classify_date(day(2021, 7, 4)).unwrap().class, 0);
        assert_eq!(classifier.class_count(), 1);
    }

    #[test]
    fn conflicting_modes_fail_before_classification() {
        let config = ClassificationConfig {
            by_month: true,
            by_season: true,
            ..ClassificationConfig::default()
        };
        let err = Classifier::new(&config, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn circulation_patterns_combine_with_season() {
        let patterns = CirculationSeries::new(vec![
            (day(2020, 1, 1), 1),
            (day(2020, 7, 1), 3),
            (day(2020, 7, 2), 2),
        ])
        .unwrap();
        assert_eq!(patterns.class_count(), 3);

        let config = ClassificationConfig {
            by_season: true,
            circulation: true,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, Some(&patterns)).unwrap();
        // (cp - 1) * 3 + season
        assert_eq!(classifier.classify_date(day(2020, 1, 1)).unwrap().class, 0);
        assert_eq!(classifier.classify_date(day(2020, 7, 1)).unwrap().class, 7);
        assert_eq!(classifier.classify_date(day(2020, 7, 2)).unwrap().class, 4);
        assert_eq!(classifier.class_count(), 9);
    }

    #[test]
    fn combined_ids_stay_unique_with_monthly_classes() {
        let patterns =
            CirculationSeries::new(vec![(day(2020, 6, 1), 1), (day(2020, 3, 1), 2)]).unwrap();
        let config = ClassificationConfig {
            by_month: true,
            circulation: true,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, Some(&patterns)).unwrap();
        let a = classifier.classify_date(day(2020, 6, 1)).unwrap();
        let b = classifier.classify_date(day(2020, 3, 1)).unwrap();
        assert_eq!(a.class, 5);
        assert_eq!(b.class, 12 + 2);
        assert_ne!(a.class, b.class);
    }

    #[test]
    fn missing_pattern_date_is_a_data_error() {
        let patterns = CirculationSeries::new(vec![(day(2020, 1, 1), 1)]).unwrap();
        let config = ClassificationConfig {
            circulation: true,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, Some(&patterns)).unwrap();
        let mut recs = records(&[day(2020, 1, 1), day(2020, 1, 2)]);
        let err = classifier.classify(&mut recs).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn pattern_zero_is_rejected() {
        assert!(CirculationSeries::new(vec![(day(2020, 1, 1), 0)]).is_err());
    }

    #[test]
    fn class_counts_tally_records() {
        let config = ClassificationConfig {
            by_season: true,
            ..ClassificationConfig::default()
        };
        let classifier = Classifier::new(&config, None).unwrap();
        let mut recs = records(&[day(2020, 1, 1), day(2020, 6, 1), day(2020, 7, 1)]);
        classifier.classify(&mut recs).unwrap();
        assert_eq!(class_counts(&recs, classifier.class_count()), vec![1, 2]);
    }

    proptest! {
        #[test]
        fn classification_is_idempotent(
            offsets in prop::collection::vec(0i64..3650, 1..40),
            by_month in any::<bool>(),
        ) {
            let base = day(2000, 1, 1);
            let dates: Vec<NaiveDate> = offsets
                .iter()
                .map(|o| base + chrono::Duration::days(*o))
                .collect();
            let config = ClassificationConfig {
                by_month,
                by_season: !by_month,
                ..ClassificationConfig::default()
            };
            let classifier = Classifier::new(&config, None).unwrap();

            let mut recs = records(&dates);
            classifier.classify(&mut recs).unwrap();
            let first: Vec<DayClass> = recs.iter().map(|r| r.class).collect();
            classifier.classify(&mut recs).unwrap();
            let second: Vec<DayClass> = recs.iter().map(|r| r.class).collect();
            prop_assert_eq!(first, second);
        }
    }
}
