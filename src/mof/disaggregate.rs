//! Per-day disaggregation and the batch driver.
//!
//! Each target day moves through:
//!
//! ```text
//! sunshine / solar, every station dark  -> zero profiles for all runs
//! otherwise                             -> pool -> score -> kNN -> assign
//! ```
//!
//! Days are independent given their own random stream, so the driver can run
//! them on the rayon pool and still emit results in day order. Parallel runs
//! work through fixed-size chunks of days so only one chunk of profiles is held
//! in memory at a time.

use chrono::{Datelike, NaiveDate};
use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{
    DailyRecord, DayRecord, DisaggConfig, HOURS_PER_DAY, HourlyProfile, HourlyRecord, Variable,
};
use crate::error::AppError;

use super::candidates::{HourlyMaxima, PoolBuilder};
use super::fragments::assign;
use super::knn::{KnnDistribution, RngSource, UniformSource};
use super::similarity::{SimilarityScorer, continuity_kernel};
use super::sink::{CandidateDiagnostic, DiagnosticSink, HourlySink};

/// Days disaggregated per parallel chunk.
pub const PARALLEL_CHUNK_DAYS: usize = 512;

/// SplitMix64 finalizer.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Continuity radius actually used for target day `index` of `n`.
///
/// Days too close to either end of the series fall back to single-day scoring.
pub fn effective_skip(index: usize, n: usize, skip: usize) -> usize {
    if index < skip || index + skip >= n { 0 } else { skip }
}

/// Which path a day took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPath {
    /// No light at any station: zero profiles, no sampling.
    Dark,
    Sampled,
}

/// Everything produced for one target day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayOutcome {
    pub day_index: usize,
    pub date: NaiveDate,
    pub path: DayPath,
    /// One profile per run, runs ascending.
    pub profiles: Vec<HourlyProfile>,
    /// Top-k candidates (empty for dark days).
    pub candidates: Vec<CandidateDiagnostic>,
    pub pool_size: usize,
}

/// Totals of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub days: usize,
    pub dark_days: usize,
    pub profiles: usize,
    pub rows: usize,
    pub min_pool: Option<usize>,
    pub max_pool: Option<usize>,
}

impl RunStats {
    fn record(&mut self, outcome: &DayOutcome) {
        self.days += 1;
        self.profiles += outcome.profiles.len();
        // one output row per hour, all stations on the row
        self.rows += outcome.profiles.len() * HOURS_PER_DAY;
        match outcome.path {
            DayPath::Dark => self.dark_days += 1,
            DayPath::Sampled => {
                let p = outcome.pool_size;
                self.min_pool = Some(self.min_pool.map_or(p, |m| m.min(p)));
                self.max_pool = Some(self.max_pool.map_or(p, |m| m.max(p)));
            }
        }
    }
}

/// Read-only disaggregation context over classified (and optionally
/// preprocessed) target and donor series.
#[derive(Debug)]
pub struct Disaggregator<'a> {
    config: &'a DisaggConfig,
    targets: &'a [DailyRecord],
    donors: &'a [HourlyRecord],
    maxima: Option<HourlyMaxima>,
    chunk_days: usize,
}

impl<'a> Disaggregator<'a> {
    pub fn new(
        config: &'a DisaggConfig,
        targets: &'a [DailyRecord],
        donors: &'a [HourlyRecord],
    ) -> Result<Self, AppError> {
        config.validate()?;
        continuity_kernel(config.skip())?;

        if let Some(t) = targets.iter().find(|t| t.values.len() != config.n_stations) {
            return Err(AppError::data(format!(
                "daily record {} has {} stations, expected {}",
                t.date,
                t.values.len(),
                config.n_stations
            )));
        }
        if let Some(d) = donors.iter().find(|d| d.n_stations() != config.n_stations) {
            return Err(AppError::data(format!(
                "hourly record {} has {} stations, expected {}",
                d.date,
                d.n_stations(),
                config.n_stations
            )));
        }

        let maxima = (config.variable == Variable::Solar).then(|| {
            let class_count = donors
                .iter()
                .map(|d| d.class.class + 1)
                .chain(targets.iter().map(|t| t.class.class + 1))
                .max()
                .unwrap_or(0);
            HourlyMaxima::derive(donors, config.n_stations, class_count)
        });

        Ok(Self {
            config,
            targets,
            donors,
            maxima,
            chunk_days: PARALLEL_CHUNK_DAYS,
        })
    }

    /// Number of days each parallel chunk processes before writing.
    pub fn with_chunk_days(mut self, days: usize) -> Self {
        self.chunk_days = days.max(1);
        self
    }

    pub fn config(&self) -> &DisaggConfig {
        self.config
    }

    /// Historical hourly maxima (solar radiation only).
    pub fn maxima(&self) -> Option<&HourlyMaxima> {
        self.maxima.as_ref()
    }

    pub fn effective_skip(&self, day_index: usize) -> usize {
        effective_skip(day_index, self.targets.len(), self.config.skip())
    }

    /// Seed of the random stream of one target day.
    ///
    /// Depends only on the configured seed and the day, so sequential and
    /// parallel runs draw the same donors. The mix is fixed, so a given `SEED`
    /// reproduces across toolchains.
    pub fn day_seed(&self, day_index: usize) -> u64 {
        let mut state = splitmix64(self.config.seed);
        state = splitmix64(state ^ day_index as u64);
        if let Some(t) = self.targets.get(day_index) {
            state = splitmix64(state ^ i64::from(t.date.num_days_from_ce()) as u64);
        }
        state
    }

    /// Disaggregate one target day, drawing from `source`.
    pub fn disaggregate_day(
        &self,
        day_index: usize,
        source: &mut dyn UniformSource,
    ) -> Result<DayOutcome, AppError> {
        let target = self.targets.get(day_index).ok_or_else(|| {
            AppError::algorithm(format!(
                "target day {day_index} is outside the daily series ({} days)",
                self.targets.len()
            ))
        })?;
        let variable = self.config.variable;
        let runs = self.config.runs;

        if variable.is_light() && target.is_dark() {
            debug!("{}: dark at every station, emitting zeros", target.date);
            let profiles = (1..=runs)
                .map(|run| HourlyProfile::zeros(target.date, run, self.config.n_stations))
                .collect();
            return Ok(DayOutcome {
                day_index,
                date: target.date,
                path: DayPath::Dark,
                profiles,
                candidates: Vec::new(),
                pool_size: 0,
            });
        }

        // 1) Candidate pool.
        let builder = PoolBuilder::new(
            self.donors,
            variable,
            self.config.skip(),
            self.maxima.as_ref(),
        )?;
        let pool = builder.build(target, day_index)?;

        // 2) Similarity.
        let skip = self.effective_skip(day_index);
        let scorer = SimilarityScorer::new(self.config, self.targets, self.donors);
        let scores = scorer.score_pool(day_index, &pool, skip)?;

        // 3) kNN sampling.
        let dist = KnnDistribution::new(&pool, &scores)?;
        let chosen = dist.sample(runs, source);

        // 4) Fragment assignment.
        let profiles = chosen
            .iter()
            .zip(1..=runs)
            .map(|(&j, run)| assign(target, &self.donors[j], variable, run))
            .collect::<Result<Vec<_>, _>>()?;

        let candidates = dist
            .neighbours
            .iter()
            .enumerate()
            .map(|(rank, r)| CandidateDiagnostic {
                target: target.date,
                rank,
                index: r.index,
                score: r.score,
                candidate: self.donors[r.index].date,
            })
            .collect();

        debug!(
            "{}: pool {}, k {}, skip {}, donors {:?}",
            target.date,
            pool.len(),
            dist.k(),
            skip,
            chosen
        );

        Ok(DayOutcome {
            day_index,
            date: target.date,
            path: DayPath::Sampled,
            profiles,
            candidates,
            pool_size: pool.len(),
        })
    }

    fn seeded_day(&self, day_index: usize) -> Result<DayOutcome, AppError> {
        let mut source = RngSource(StdRng::seed_from_u64(self.day_seed(day_index)));
        self.disaggregate_day(day_index, &mut source)
    }

    /// Disaggregate every target day and stream the results to the sinks.
    ///
    /// Output is in day order whether or not `config.parallel` is set.
    pub fn run(
        &self,
        hourly: &mut dyn HourlySink,
        mut diagnostics: Option<&mut dyn DiagnosticSink>,
    ) -> Result<RunStats, AppError> {
        let n = self.targets.len();
        info!(
            "disaggregating {} days of {} ({} stations, {} runs, continuity {}, parallel: {})",
            n,
            self.config.variable.display_name(),
            self.config.n_stations,
            self.config.runs,
            self.config.continuity,
            self.config.parallel
        );

        let mut stats = RunStats::default();
        let mut emit = |outcome: DayOutcome| -> Result<(), AppError> {
            for p in &outcome.profiles {
                hourly.write_profile(p)?;
            }
            if let Some(sink) = diagnostics.as_deref_mut() {
                if !outcome.candidates.is_empty() {
                    sink.write_candidates(&outcome.candidates)?;
                }
            }
            stats.record(&outcome);
            Ok(())
        };

        if self.config.parallel {
            for start in (0..n).step_by(self.chunk_days) {
                let end = (start + self.chunk_days).min(n);
                // Collect per-day results so the first failure in day order wins.
                let outcomes: Vec<Result<DayOutcome, AppError>> = (start..end)
                    .into_par_iter()
                    .map(|i| self.seeded_day(i))
                    .collect();
                for outcome in outcomes {
                    emit(outcome?)?;
                }
            }
        } else {
            for i in 0..n {
                emit(self.seeded_day(i)?)?;
            }
        }

        hourly.finish()?;
        if let Some(sink) = diagnostics {
            sink.finish()?;
        }

        info!(
            "done: {} days ({} dark), {} profiles",
            stats.days, stats.dark_days, stats.profiles
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mof::{FixedDraws, MemorySink};
    use nalgebra::DMatrix;

    fn date(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 7, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn donors(variable: Variable, n: usize, stations: usize) -> Vec<HourlyRecord> {
        (0..n)
            .map(|i| {
                let m = DMatrix::from_fn(stations, HOURS_PER_DAY, |j, h| {
                    let bump = if (9..17).contains(&h) { 1.0 + (i % 5) as f64 } else { 0.2 };
                    bump * (1.0 + j as f64 * 0.1)
                });
                HourlyRecord::new(date(i), m, variable.aggregation())
            })
            .collect()
    }

    fn targets(values: &[Vec<f64>]) -> Vec<DailyRecord> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DailyRecord::new(date(100 + i), v.clone()))
            .collect()
    }

    #[test]
    fn effective_skip_falls_back_at_series_edges() {
        assert_eq!(effective_skip(0, 10, 2), 0);
        assert_eq!(effective_skip(1, 10, 2), 0);
        assert_eq!(effective_skip(2, 10, 2), 2);
        assert_eq!(effective_skip(7, 10, 2), 2);
        assert_eq!(effective_skip(8, 10, 2), 0);
        assert_eq!(effective_skip(9, 10, 2), 0);
        assert_eq!(effective_skip(0, 1, 0), 0);
    }

    #[test]
    fn first_day_with_wide_window_uses_single_day_scoring() {
        let mut config = DisaggConfig::new(Variable::Precipitation, 2);
        config.continuity = 5;
        let d = donors(Variable::Precipitation, 20, 2);
        let t = targets(&[vec![4.0, 5.0], vec![1.0, 1.0], vec![2.0, 3.0]]);
        let dis = Disaggregator::new(&config, &t, &d).unwrap();
        assert_eq!(dis.effective_skip(0), 0);
        let out = dis.disaggregate_day(0, &mut FixedDraws::new(vec![0.5])).unwrap();
        assert_eq!(out.path, DayPath::Sampled);
        // pool excludes the first and last two donors
        assert_eq!(out.pool_size, 16);
        assert!(out.candidates.iter().all(|c| c.index >= 2 && c.index < 18));
    }

    #[test]
    fn dark_solar_day_short_circuits() {
        let mut config = DisaggConfig::new(Variable::Solar, 2);
        config.runs = 3;
        let d = donors(Variable::Solar, 5, 2);
        let t = targets(&[vec![0.0, -1.0]]);
        let dis = Disaggregator::new(&config, &t, &d).unwrap();
        let out = dis.disaggregate_day(0, &mut FixedDraws::new(vec![0.1])).unwrap();
        assert_eq!(out.path, DayPath::Dark);
        assert_eq!(out.profiles.len(), 3);
        assert_eq!(
            out.profiles.iter().map(|p| p.run).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(out.profiles.iter().all(|p| p.values.iter().all(|v| *v == 0.0)));
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn runs_emit_in_day_order_and_conserve_totals() {
        let mut config = DisaggConfig::new(Variable::Precipitation, 3);
        config.runs = 2;
        let d = donors(Variable::Precipitation, 30, 3);
        let values: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![i as f64, 2.0 * i as f64 + 0.5, 3.0])
            .collect();
        let t = targets(&values);
        let dis = Disaggregator::new(&config, &t, &d).unwrap();

        let mut sink = MemorySink::default();
        let stats = dis.run(&mut sink, None).unwrap();
        assert_eq!(stats.days, 10);
        assert_eq!(stats.profiles, 20);
        assert_eq!(stats.rows, 480);
        assert_eq!(sink.profiles.len(), 20);

        for (k, p) in sink.profiles.iter().enumerate() {
            assert_eq!(p.date, t[k / 2].date);
            assert_eq!(p.run, k % 2 + 1);
            for j in 0..3 {
                let total: f64 = p.values.row(j).iter().sum();
                assert!((total - t[k / 2].values[j]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let mut config = DisaggConfig::new(Variable::Wind, 2);
        config.runs = 3;
        config.continuity = 3;
        let d = donors(Variable::Wind, 40, 2);
        let values: Vec<Vec<f64>> = (0..12).map(|i| vec![1.0 + i as f64 * 0.3, 2.0]).collect();
        let t = targets(&values);

        let mut seq = MemorySink::default();
        Disaggregator::new(&config, &t, &d)
            .unwrap()
            .run(&mut seq, Some(&mut MemorySink::default()))
            .unwrap();

        config.parallel = true;
        let mut par = MemorySink::default();
        let mut par_diag = MemorySink::default();
        Disaggregator::new(&config, &t, &d)
            .unwrap()
            .run(&mut par, Some(&mut par_diag))
            .unwrap();

        assert_eq!(seq.profiles, par.profiles);
        assert!(!par_diag.candidates.is_empty());

        // 12 days in chunks of 5: the last chunk is partial
        let mut chunked = MemorySink::default();
        let mut chunked_diag = MemorySink::default();
        Disaggregator::new(&config, &t, &d)
            .unwrap()
            .with_chunk_days(5)
            .run(&mut chunked, Some(&mut chunked_diag))
            .unwrap();
        assert_eq!(seq.profiles, chunked.profiles);
        assert_eq!(par_diag.candidates, chunked_diag.candidates);
    }

    #[test]
    fn day_seeds_are_pinned() {
        let config = DisaggConfig::new(Variable::Pressure, 1);
        let d = donors(Variable::Pressure, 3, 1);
        let t = targets(&[vec![1000.0], vec![1001.0]]);
        let dis = Disaggregator::new(&config, &t, &d).unwrap();
        assert_eq!(splitmix64(0), 0xE220_A839_7B1D_CDAF);
        assert_eq!(dis.day_seed(0), 8_320_914_719_801_452_764);
        assert_eq!(dis.day_seed(1), 106_672_797_269_305_449);
    }

    #[test]
    fn partly_dry_precipitation_donors_are_never_drawn_for_wet_stations() {
        let mut config = DisaggConfig::new(Variable::Precipitation, 2);
        config.runs = 20;
        let d: Vec<HourlyRecord> = donors(Variable::Precipitation, 40, 2)
            .into_iter()
            .enumerate()
            .map(|(i, mut r)| {
                if i % 2 == 1 {
                    r.hourly.row_mut(1).fill(0.0);
                    r = HourlyRecord::new(r.date, r.hourly, Variable::Precipitation.aggregation());
                }
                r
            })
            .collect();
        let t = targets(&[vec![5.0, 0.4]]);
        let dis = Disaggregator::new(&config, &t, &d).unwrap();

        let mut sink = MemorySink::default();
        dis.run(&mut sink, None).unwrap();
        assert_eq!(sink.profiles.len(), 20);
        for p in &sink.profiles {
            let wet: f64 = p.values.row(1).iter().sum();
            assert!((wet - 0.4).abs() < 1e-9);
        }
        let out = dis.disaggregate_day(0, &mut FixedDraws::new(vec![0.3])).unwrap();
        assert_eq!(out.pool_size, 20);
        assert!(out.candidates.iter().all(|c| c.index % 2 == 0));
    }

    #[test]
    fn station_count_mismatch_is_a_data_error() {
        let config = DisaggConfig::new(Variable::Pressure, 3);
        let d = donors(Variable::Pressure, 5, 2);
        let t = targets(&[vec![1.0, 2.0, 3.0]]);
        let err = Disaggregator::new(&config, &t, &d).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }
}
