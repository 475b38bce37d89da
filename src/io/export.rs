//! Result exports.
//!
//! - hourly output CSV: `run,year,month,day,hour,v1..vN`, no header, 2 decimals
//! - candidate diagnostics CSV: `target,rank,index,score,candidate`
//! - JSON run summary

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::domain::{HOURS_PER_DAY, HourlyProfile, Variable};
use crate::error::AppError;
use crate::math::PreprocessStats;
use crate::mof::{CandidateDiagnostic, DiagnosticSink, HourlySink, RunStats};

/// Create `path` (and its parent directories) for buffered writing.
pub fn create_output(path: &Path) -> Result<BufWriter<File>, AppError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::io(format!("failed to create directory '{}': {e}", dir.display()))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

/// Hourly profiles as CSV rows, one row per (run, day, hour).
pub struct CsvHourlySink<W: Write> {
    out: W,
    rows: usize,
}

impl CsvHourlySink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        Ok(Self::new(create_output(path)?))
    }
}

impl<W: Write> CsvHourlySink<W> {
    pub fn new(out: W) -> Self {
        Self { out, rows: 0 }
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> HourlySink for CsvHourlySink<W> {
    fn write_profile(&mut self, profile: &HourlyProfile) -> Result<(), AppError> {
        let d = profile.date;
        for h in 0..HOURS_PER_DAY {
            let mut row = format!("{},{},{},{},{}", profile.run, d.year(), d.month(), d.day(), h);
            for v in profile.values.column(h).iter() {
                row.push_str(&format!(",{v:.2}"));
            }
            writeln!(self.out, "{row}")
                .map_err(|e| AppError::io(format!("failed to write hourly output row: {e}")))?;
            self.rows += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AppError> {
        self.out
            .flush()
            .map_err(|e| AppError::io(format!("failed to flush hourly output: {e}")))
    }
}

/// Top-k candidate lists as CSV.
pub struct CsvDiagnosticSink<W: Write> {
    out: W,
}

impl CsvDiagnosticSink<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        Self::new(create_output(path)?)
    }
}

impl<W: Write> CsvDiagnosticSink<W> {
    /// Writes the header immediately.
    pub fn new(mut out: W) -> Result<Self, AppError> {
        writeln!(out, "target,rank,index,score,candidate")
            .map_err(|e| AppError::io(format!("failed to write diagnostics header: {e}")))?;
        Ok(Self { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> DiagnosticSink for CsvDiagnosticSink<W> {
    fn write_candidates(&mut self, rows: &[CandidateDiagnostic]) -> Result<(), AppError> {
        for r in rows {
            writeln!(
                self.out,
                "{},{},{},{:.6},{}",
                r.target, r.rank, r.index, r.score, r.candidate
            )
            .map_err(|e| AppError::io(format!("failed to write diagnostics row: {e}")))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AppError> {
        self.out
            .flush()
            .map_err(|e| AppError::io(format!("failed to flush diagnostics: {e}")))
    }
}

/// Machine-readable record of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tool: String,
    pub variable: Variable,
    pub n_stations: usize,
    pub runs: usize,
    pub seed: u64,
    pub continuity: usize,
    pub days: usize,
    pub dark_days: usize,
    pub rows_written: usize,
    pub min_pool: Option<usize>,
    pub max_pool: Option<usize>,
    /// Hourly days per combined class id.
    pub donor_class_counts: Vec<usize>,
    /// Target days per combined class id.
    pub target_class_counts: Vec<usize>,
    pub preprocess: Option<serde_json::Value>,
    pub output: String,
}

impl RunSummary {
    pub fn new(
        variable: Variable,
        n_stations: usize,
        runs: usize,
        seed: u64,
        continuity: usize,
        stats: &RunStats,
        output: &Path,
    ) -> Self {
        Self {
            tool: "mof".to_string(),
            variable,
            n_stations,
            runs,
            seed,
            continuity,
            days: stats.days,
            dark_days: stats.dark_days,
            rows_written: stats.rows,
            min_pool: stats.min_pool,
            max_pool: stats.max_pool,
            donor_class_counts: Vec::new(),
            target_class_counts: Vec::new(),
            preprocess: None,
            output: output.display().to_string(),
        }
    }

    pub fn with_preprocess(mut self, stats: Option<&PreprocessStats>) -> Result<Self, AppError> {
        self.preprocess = stats
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::io(format!("failed to encode preprocessing stats: {e}")))?;
        Ok(self)
    }
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let mut out = create_output(path)?;
    serde_json::to_writer_pretty(&mut out, summary)
        .map_err(|e| AppError::io(format!("failed to write run summary '{}': {e}", path.display())))?;
    out.flush()
        .map_err(|e| AppError::io(format!("failed to flush run summary '{}': {e}", path.display())))
}

pub fn read_summary_json(path: &Path) -> Result<RunSummary, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("failed to open run summary '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::data(format!("invalid run summary JSON '{}': {e}", path.display())))
}
