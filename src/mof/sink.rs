use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::HourlyProfile;
use crate::error::AppError;

/// One top-k candidate of a target day, as written to the diagnostics file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateDiagnostic {
    pub target: NaiveDate,
    /// 0-based rank within the top-k.
    pub rank: usize,
    /// Index into the donor series.
    pub index: usize,
    pub score: f64,
    pub candidate: NaiveDate,
}

/// Receives hourly profiles in target-day order, runs ascending within a day.
pub trait HourlySink {
    fn write_profile(&mut self, profile: &HourlyProfile) -> Result<(), AppError>;

    fn finish(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Receives the top-k candidate list of every sampled day.
pub trait DiagnosticSink {
    fn write_candidates(&mut self, rows: &[CandidateDiagnostic]) -> Result<(), AppError>;

    fn finish(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Collects everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub profiles: Vec<HourlyProfile>,
    pub candidates: Vec<CandidateDiagnostic>,
}

impl HourlySink for MemorySink {
    fn write_profile(&mut self, profile: &HourlyProfile) -> Result<(), AppError> {
        self.profiles.push(profile.clone());
        Ok(())
    }
}

impl DiagnosticSink for MemorySink {
    fn write_candidates(&mut self, rows: &[CandidateDiagnostic]) -> Result<(), AppError> {
        self.candidates.extend_from_slice(rows);
        Ok(())
    }
}
