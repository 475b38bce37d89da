//! Shared domain types.
//!
//! These types describe:
//!
//! - which meteorological variable is being disaggregated and how it behaves
//!   (aggregation, rescaling method, admissibility filter, physical caps)
//! - the immutable run configuration (`DisaggConfig`) and the file layout (`IoPaths`)
//! - the daily / hourly record series and their classification fields
//! - the hourly profile emitted for each target day and simulation run

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const HOURS_PER_DAY: usize = 24;

/// Daily values at or below this carry no usable signal for wind / sunshine.
pub const NEAR_ZERO: f64 = 0.05;

/// Meteorological variable being disaggregated.
///
/// The numeric codes match the `VAR` key of the parameter file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Temperature,
    Wind,
    Pressure,
    Humidity,
    Sunshine,
    Solar,
    Precipitation,
}

impl Variable {
    pub const ALL: [Variable; 7] = [
        Variable::Temperature,
        Variable::Wind,
        Variable::Pressure,
        Variable::Humidity,
        Variable::Sunshine,
        Variable::Solar,
        Variable::Precipitation,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Variable::Temperature),
            1 => Some(Variable::Wind),
            2 => Some(Variable::Pressure),
            3 => Some(Variable::Humidity),
            4 => Some(Variable::Sunshine),
            5 => Some(Variable::Solar),
            6 => Some(Variable::Precipitation),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Variable::Temperature => 0,
            Variable::Wind => 1,
            Variable::Pressure => 2,
            Variable::Humidity => 3,
            Variable::Sunshine => 4,
            Variable::Solar => 5,
            Variable::Precipitation => 6,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Variable::Temperature => "air_temperature",
            Variable::Wind => "wind",
            Variable::Pressure => "air_pressure",
            Variable::Humidity => "rhu",
            Variable::Sunshine => "sunshine_duration",
            Variable::Solar => "solar_radiation",
            Variable::Precipitation => "precipitation",
        }
    }

    /// Parse either a numeric `VAR` code or a variable name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(code) = raw.parse::<i64>() {
            return Self::from_code(code);
        }
        let lower = raw.to_ascii_lowercase();
        Self::ALL.into_iter().find(|v| {
            v.display_name() == lower
                || v.to_possible_value()
                    .is_some_and(|pv| pv.get_name() == lower)
        })
    }

    /// How the 24 hourly values of a donor day collapse to its daily aggregate.
    pub fn aggregation(self) -> Aggregation {
        match self {
            Variable::Sunshine => Aggregation::MinutesToHours,
            Variable::Solar | Variable::Precipitation => Aggregation::Sum,
            Variable::Temperature | Variable::Wind | Variable::Pressure | Variable::Humidity => {
                Aggregation::Mean
            }
        }
    }

    pub fn method(self) -> Method {
        match self {
            Variable::Temperature => Method::Additive,
            _ => Method::Ratio,
        }
    }

    pub fn admissibility(self) -> Admissibility {
        match self {
            Variable::Wind | Variable::Sunshine => Admissibility::ThresholdConsistency,
            Variable::Humidity => Admissibility::HumidityCap,
            Variable::Solar => Admissibility::SolarMaximum,
            Variable::Precipitation => Admissibility::WetDry,
            Variable::Temperature | Variable::Pressure => Admissibility::None,
        }
    }

    /// Sunshine / solar: days with no signal at any station are "dark".
    pub fn is_light(self) -> bool {
        matches!(self, Variable::Sunshine | Variable::Solar)
    }

    /// Wind / sunshine: a near-zero target daily value forces an all-zero profile.
    pub fn zero_below_threshold(self) -> bool {
        matches!(self, Variable::Wind | Variable::Sunshine)
    }

    /// Physical upper bound on emitted hourly values.
    pub fn hourly_cap(self) -> Option<f64> {
        match self {
            Variable::Humidity => Some(100.0),
            // minutes within an hour
            Variable::Sunshine => Some(60.0),
            _ => None,
        }
    }
}

/// Daily aggregate of a 24-hour donor day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
    /// Hourly values in minutes, daily aggregate in hours.
    MinutesToHours,
}

impl Aggregation {
    pub fn aggregate<'a>(self, hourly: impl IntoIterator<Item = &'a f64>) -> f64 {
        let mut sum = 0.0;
        let mut n = 0usize;
        for v in hourly {
            sum += *v;
            n += 1;
        }
        match self {
            Aggregation::Sum => sum,
            Aggregation::MinutesToHours => sum / 60.0,
            Aggregation::Mean => {
                if n == 0 {
                    0.0
                } else {
                    sum / n as f64
                }
            }
        }
    }
}

/// How a donor's hourly shape is rescaled onto the target's daily value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `target * donor_hour / donor_daily`
    Ratio,
    /// `target + donor_hour - donor_daily`
    Additive,
}

/// Variable-specific candidate filter applied after class matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admissibility {
    /// Reject "dry/dark" donors for a "wet/sunny" target station.
    ThresholdConsistency,
    /// Reject donors that are dry (or near-dry) at a station where the target is wet.
    WetDry,
    /// Reject donors whose rescaled hours exceed 120 % humidity.
    HumidityCap,
    /// Reject donors whose rescaled hours exceed the per-class historical maximum.
    SolarMaximum,
    None,
}

/// Optional transform applied to the station vectors before similarity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preprocess {
    None,
    Normalize,
    Standardize,
}

impl Preprocess {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Preprocess::None),
            1 => Some(Preprocess::Normalize),
            2 => Some(Preprocess::Standardize),
            _ => None,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Preprocess::None
    }
}

/// Which calendar / circulation axes define the day classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassificationConfig {
    /// 12 classes, one per calendar month.
    pub by_month: bool,
    /// 2 classes: summer (1) if `summer_from <= month <= summer_to`, else winter (0).
    pub by_season: bool,
    pub summer_from: u32,
    pub summer_to: u32,
    /// Combine with the circulation-pattern series.
    pub circulation: bool,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            by_month: false,
            by_season: false,
            summer_from: 5,
            summer_to: 9,
            circulation: false,
        }
    }
}

impl ClassificationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.by_month && self.by_season {
            return Err(AppError::config(
                "the disaggregation can only be conditioned on either MONTH or SEASON, not both",
            ));
        }
        if self.by_season {
            let valid = |m: u32| (1..=12).contains(&m);
            if !valid(self.summer_from) || !valid(self.summer_to) {
                return Err(AppError::config(format!(
                    "summer months must lie in 1..=12 (got {}..={})",
                    self.summer_from, self.summer_to
                )));
            }
        }
        Ok(())
    }

    /// Number of distinct season/month ids.
    pub fn season_month_count(&self) -> usize {
        if self.by_month {
            12
        } else if self.by_season {
            2
        } else {
            1
        }
    }
}

/// Parameters of the structural similarity measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SsimParams {
    /// Stabilization constants: `C[i] = (k[i] * L)^2`.
    pub k: [f64; 3],
    /// Exponents of the luminance / contrast / structure terms.
    pub power: [f64; 3],
    /// No-data sentinel (matched within `NODATA_TOLERANCE`).
    pub nodata: f64,
}

impl Default for SsimParams {
    fn default() -> Self {
        Self {
            k: [0.01, 0.03, 0.03],
            power: [1.0, 1.0, 1.0],
            nodata: -9999.0,
        }
    }
}

/// Immutable configuration of one disaggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisaggConfig {
    pub variable: Variable,
    pub n_stations: usize,
    pub classification: ClassificationConfig,
    /// Continuity window length in days: 1, 3 or 5.
    pub continuity: usize,
    pub ssim: SsimParams,
    /// Ensemble size (number of simulation runs per target day).
    pub runs: usize,
    pub preprocess: Preprocess,
    pub seed: u64,
    /// Process target days on the rayon thread pool.
    pub parallel: bool,
}

impl DisaggConfig {
    pub fn new(variable: Variable, n_stations: usize) -> Self {
        Self {
            variable,
            n_stations,
            classification: ClassificationConfig::default(),
            continuity: 1,
            ssim: SsimParams::default(),
            runs: 1,
            preprocess: Preprocess::None,
            seed: 42,
            parallel: false,
        }
    }

    /// Continuity radius: number of neighbouring days on each side.
    pub fn skip(&self) -> usize {
        self.continuity.saturating_sub(1) / 2
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.classification.validate()?;
        if !matches!(self.continuity, 1 | 3 | 5) {
            return Err(AppError::config(format!(
                "CONTINUITY must be 1, 3 or 5 (got {})",
                self.continuity
            )));
        }
        if self.n_stations == 0 {
            return Err(AppError::config("N_STATION must be at least 1"));
        }
        if self.runs == 0 {
            return Err(AppError::config("RUN must be at least 1"));
        }
        if self.ssim.k.iter().chain(self.ssim.power.iter()).any(|v| !v.is_finite()) {
            return Err(AppError::config("SSIM_K and SSIM_POWER must be finite"));
        }
        Ok(())
    }
}

/// Input / output locations resolved from the parameter file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoPaths {
    pub daily: PathBuf,
    pub hourly: PathBuf,
    pub circulation: Option<PathBuf>,
    pub output: PathBuf,
    pub log: Option<PathBuf>,
    /// Top-k candidate diagnostics (`FP_SSIM`).
    pub diagnostics: Option<PathBuf>,
}

/// Everything the parameter file defines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalParams {
    pub paths: IoPaths,
    pub config: DisaggConfig,
}

/// Classification fields of a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct DayClass {
    /// Circulation-pattern class (1-based); 0 when patterns are not used.
    pub pattern: u32,
    /// Season / month id.
    pub season: u32,
    /// Combined class id used for candidate matching.
    pub class: usize,
}

/// Read access shared by the daily (target) and hourly (donor) series.
pub trait DayRecord {
    fn date(&self) -> NaiveDate;
    /// Per-station daily values (target value, or donor aggregate).
    fn daily_values(&self) -> &[f64];
    fn preprocessed(&self) -> Option<&[f64]>;
    fn set_preprocessed(&mut self, values: Vec<f64>);
    fn class(&self) -> DayClass;
    fn set_class(&mut self, class: DayClass);

    /// Every station at or below zero.
    fn is_dark(&self) -> bool {
        self.daily_values().iter().all(|v| *v <= 0.0)
    }
}

/// One day of the series to be disaggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub values: Vec<f64>,
    pub preprocessed: Option<Vec<f64>>,
    pub class: DayClass,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, values: Vec<f64>) -> Self {
        Self {
            date,
            values,
            preprocessed: None,
            class: DayClass::default(),
        }
    }
}

impl DayRecord for DailyRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn daily_values(&self) -> &[f64] {
        &self.values
    }

    fn preprocessed(&self) -> Option<&[f64]> {
        self.preprocessed.as_deref()
    }

    fn set_preprocessed(&mut self, values: Vec<f64>) {
        self.preprocessed = Some(values);
    }

    fn class(&self) -> DayClass {
        self.class
    }

    fn set_class(&mut self, class: DayClass) {
        self.class = class;
    }
}

/// One observed day of the hourly (donor) series.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyRecord {
    pub date: NaiveDate,
    /// `stations x 24` hourly values.
    pub hourly: DMatrix<f64>,
    /// Per-station daily aggregate of `hourly`.
    pub daily: Vec<f64>,
    pub preprocessed: Option<Vec<f64>>,
    pub class: DayClass,
}

impl HourlyRecord {
    /// Build a record and derive its daily aggregate.
    pub fn new(date: NaiveDate, hourly: DMatrix<f64>, aggregation: Aggregation) -> Self {
        let daily = (0..hourly.nrows())
            .map(|j| aggregation.aggregate(hourly.row(j).iter()))
            .collect();
        Self {
            date,
            hourly,
            daily,
            preprocessed: None,
            class: DayClass::default(),
        }
    }

    pub fn n_stations(&self) -> usize {
        self.hourly.nrows()
    }
}

impl DayRecord for HourlyRecord {
    fn date(&self) -> NaiveDate {
        self.date
    }

    fn daily_values(&self) -> &[f64] {
        &self.daily
    }

    fn preprocessed(&self) -> Option<&[f64]> {
        self.preprocessed.as_deref()
    }

    fn set_preprocessed(&mut self, values: Vec<f64>) {
        self.preprocessed = Some(values);
    }

    fn class(&self) -> DayClass {
        self.class
    }

    fn set_class(&mut self, class: DayClass) {
        self.class = class;
    }
}

/// Disaggregated hourly values of one target day for one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyProfile {
    pub date: NaiveDate,
    /// 1-based simulation run index.
    pub run: usize,
    /// `stations x 24`.
    pub values: DMatrix<f64>,
}

impl HourlyProfile {
    pub fn zeros(date: NaiveDate, run: usize, n_stations: usize) -> Self {
        Self {
            date,
            run,
            values: DMatrix::zeros(n_stations, HOURS_PER_DAY),
        }
    }
}
