//! Synthetic multi-station datasets.
//!
//! Produces an hourly (donor) series, a daily (target) series aggregated from a
//! later, disjoint period, and a circulation-pattern series covering both, plus
//! a parameter file that references them. Every station shares a day-level
//! weather anomaly so the stations are spatially correlated, and each variable
//! gets a plausible diurnal cycle.

use std::f64::consts::TAU;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate};
use log::info;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{DailyRecord, HOURS_PER_DAY, HourlyRecord, Variable};
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub variable: Variable,
    pub n_stations: usize,
    /// Length of the hourly (donor) period.
    pub hourly_days: usize,
    /// Length of the daily (target) period that follows it.
    pub daily_days: usize,
    pub start: NaiveDate,
    /// Number of circulation-pattern classes; 0 writes no pattern file.
    pub patterns: u32,
    pub seed: u64,
}

impl SynthConfig {
    pub fn new(variable: Variable) -> Self {
        Self {
            variable,
            n_stations: 4,
            hourly_days: 730,
            daily_days: 90,
            start: NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or_default(),
            patterns: 0,
            seed: 42,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.n_stations == 0 {
            return Err(AppError::config("synthetic data needs at least one station"));
        }
        if self.hourly_days == 0 || self.daily_days == 0 {
            return Err(AppError::config("synthetic periods must be at least one day long"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SynthData {
    pub hourly: Vec<HourlyRecord>,
    pub daily: Vec<DailyRecord>,
    pub patterns: Vec<(NaiveDate, u32)>,
}

pub fn generate(config: &SynthConfig) -> Result<SynthData, AppError> {
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::algorithm(format!("noise distribution error: {e}")))?;
    let aggregation = config.variable.aggregation();

    let total = config.hourly_days + config.daily_days;
    let mut hourly = Vec::with_capacity(config.hourly_days);
    let mut daily = Vec::with_capacity(config.daily_days);
    let mut patterns = Vec::with_capacity(total);

    for i in 0..total {
        let date = config.start + Duration::days(i as i64);
        let anomaly: f64 = normal.sample(&mut rng);
        let station_noise: Vec<f64> = (0..config.n_stations)
            .map(|_| 0.3 * normal.sample(&mut rng))
            .collect();

        let m = nalgebra::DMatrix::from_fn(config.n_stations, HOURS_PER_DAY, |j, h| {
            let wobble = 0.1 * normal.sample(&mut rng);
            hourly_value(config.variable, date, j, h, anomaly + station_noise[j], wobble)
        });
        let record = HourlyRecord::new(date, m.map(round2), aggregation);

        if config.patterns > 0 {
            patterns.push((date, pattern_of(anomaly, config.patterns)));
        }
        if i < config.hourly_days {
            hourly.push(record);
        } else {
            let values = record.daily.iter().copied().map(round2).collect();
            daily.push(DailyRecord::new(date, values));
        }
    }

    Ok(SynthData {
        hourly,
        daily,
        patterns,
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// Anomaly quantiles map onto pattern classes 1..=n.
fn pattern_of(anomaly: f64, n: u32) -> u32 {
    let scaled = ((anomaly + 2.0) / 4.0).clamp(0.0, 0.999_999);
    (scaled * n as f64) as u32 + 1
}

fn hourly_value(
    variable: Variable,
    date: NaiveDate,
    station: usize,
    hour: usize,
    anomaly: f64,
    wobble: f64,
) -> f64 {
    let doy = date.ordinal() as f64;
    // +1 in July, -1 in January
    let season = -((doy - 15.0) / 365.25 * TAU).cos();
    let h = hour as f64;
    let diurnal = |peak_hour: f64| ((h - peak_hour) / 24.0 * TAU).cos();
    let daylight = if (6.0..=19.0).contains(&h) {
        ((h - 6.0) / 13.0 * std::f64::consts::PI).sin().max(0.0)
    } else {
        0.0
    };
    let s = station as f64;

    match variable {
        Variable::Temperature => {
            let amplitude = 4.0 + 2.0 * season;
            8.0 + 9.0 * season - 0.7 * s + 3.0 * anomaly + amplitude * diurnal(15.0) + wobble
        }
        Variable::Wind => (3.0 + 0.4 * s + 1.2 * anomaly + 1.0 * diurnal(14.0) + wobble).max(0.0),
        Variable::Pressure => {
            // semidiurnal tide
            let tide = 0.6 * (2.0 * (h - 10.0) / 24.0 * TAU).cos();
            1013.0 - 1.5 * s + 8.0 * anomaly + tide + wobble
        }
        Variable::Humidity => {
            (72.0 - 6.0 * season + 8.0 * anomaly - 14.0 * diurnal(15.0) + 2.0 * wobble)
                .clamp(5.0, 100.0)
        }
        Variable::Sunshine => {
            if anomaly < -1.3 || daylight <= 0.0 {
                return 0.0;
            }
            let clear = 1.0 / (1.0 + (-1.5 * anomaly).exp());
            (60.0 * clear * daylight.sqrt() + 10.0 * wobble).clamp(0.0, 60.0)
        }
        Variable::Solar => {
            if anomaly < -1.8 {
                return 0.0;
            }
            let clear = 1.0 / (1.0 + (-1.2 * anomaly).exp());
            let peak = 450.0 + 350.0 * season;
            (peak * (0.25 + 0.75 * clear) * daylight + 20.0 * wobble * daylight).max(0.0)
        }
        Variable::Precipitation => {
            if anomaly < 0.4 {
                return 0.0;
            }
            let intensity = 0.4 * (anomaly - 0.4) * (1.0 + 0.6 * diurnal(16.0));
            (intensity + 2.0 * wobble).max(0.0)
        }
    }
}

/// Where `write_dataset` put things.
#[derive(Debug, Clone)]
pub struct SynthFiles {
    pub params: PathBuf,
    pub daily: PathBuf,
    pub hourly: PathBuf,
    pub circulation: Option<PathBuf>,
}

/// Generate a dataset and write it, with a matching parameter file, into `dir`.
pub fn write_dataset(dir: &Path, config: &SynthConfig) -> Result<SynthFiles, AppError> {
    let data = generate(config)?;
    fs::create_dir_all(dir)
        .map_err(|e| AppError::io(format!("failed to create '{}': {e}", dir.display())))?;

    let daily = dir.join("daily.csv");
    let hourly = dir.join("hourly.csv");
    let params = dir.join("params.txt");

    let mut text = String::new();
    for r in &data.daily {
        push_date(&mut text, r.date);
        for v in &r.values {
            let _ = write!(text, ",{v:.2}");
        }
        text.push('\n');
    }
    write_text(&daily, &text)?;

    text.clear();
    for r in &data.hourly {
        for h in 0..HOURS_PER_DAY {
            push_date(&mut text, r.date);
            let _ = write!(text, ",{h}");
            for v in r.hourly.column(h).iter() {
                let _ = write!(text, ",{v:.2}");
            }
            text.push('\n');
        }
    }
    write_text(&hourly, &text)?;

    let circulation = if data.patterns.is_empty() {
        None
    } else {
        text.clear();
        for (date, cp) in &data.patterns {
            push_date(&mut text, *date);
            let _ = writeln!(text, ",{cp}");
        }
        let path = dir.join("cp.csv");
        write_text(&path, &text)?;
        Some(path)
    };

    text.clear();
    let _ = writeln!(text, "# synthetic {} dataset, seed {}", config.variable.display_name(), config.seed);
    let _ = writeln!(text, "VAR,{}", config.variable.code());
    let _ = writeln!(text, "N_STATION,{}", config.n_stations);
    text.push_str("FP_DAILY,daily.csv\nFP_HOURLY,hourly.csv\n");
    text.push_str("FP_OUT,out/hourly_out.csv\nFP_SSIM,out/candidates.csv\n");
    text.push_str("SEASON,TRUE\nCONTINUITY,3\nRUN,5\n");
    if circulation.is_some() {
        text.push_str("T_CP,TRUE\nFP_CP,cp.csv\n");
    }
    let _ = writeln!(text, "SEED,{}", config.seed);
    write_text(&params, &text)?;

    info!(
        "wrote synthetic {} dataset to {} ({} hourly days, {} daily days)",
        config.variable.display_name(),
        dir.display(),
        data.hourly.len(),
        data.daily.len()
    );

    Ok(SynthFiles {
        params,
        daily,
        hourly,
        circulation,
    })
}

fn push_date(text: &mut String, date: NaiveDate) {
    let _ = write!(text, "{},{},{}", date.year(), date.month(), date.day());
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    fs::write(path, text)
        .map_err(|e| AppError::io(format!("failed to write '{}': {e}", path.display())))
}
