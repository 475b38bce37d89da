//! Shared disaggregation pipeline used by `mof run`, `mof inspect` and the tests.
//!
//! load -> classify -> preprocess -> disaggregate -> write -> summary
//!
//! The front-end only decides what to print.

use log::{debug, info};

use crate::classify::{CirculationSeries, Classifier};
use crate::domain::{DailyRecord, GlobalParams, HourlyRecord};
use crate::error::AppError;
use crate::io::{
    CsvDiagnosticSink, CsvHourlySink, RunSummary, read_circulation, read_daily, read_hourly,
    write_summary_json,
};
use crate::math::{PreprocessStats, preprocess};
use crate::mof::{DiagnosticSink, Disaggregator, HourlySink, RunStats};
use crate::report::{SeriesSummary, format_maxima_preview};

/// Classified (and optionally preprocessed) inputs of one run.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    pub params: GlobalParams,
    pub daily: Vec<DailyRecord>,
    pub hourly: Vec<HourlyRecord>,
    pub patterns: Option<CirculationSeries>,
    pub class_count: usize,
    pub preprocess: Option<PreprocessStats>,
}

impl PreparedInputs {
    pub fn series_summaries(&self) -> [SeriesSummary; 2] {
        [
            SeriesSummary::of("daily", &self.daily, self.class_count),
            SeriesSummary::of("hourly", &self.hourly, self.class_count),
        ]
    }

    pub fn disaggregator(&self) -> Result<Disaggregator<'_>, AppError> {
        Disaggregator::new(&self.params.config, &self.daily, &self.hourly)
    }
}

/// All outputs of a file-to-file run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stats: RunStats,
    pub summary: RunSummary,
}

/// Read the series named in `params`, then classify and preprocess them.
pub fn prepare(params: GlobalParams) -> Result<PreparedInputs, AppError> {
    let config = &params.config;
    let paths = &params.paths;

    let daily = read_daily(&paths.daily, config.n_stations)?;
    let hourly = read_hourly(&paths.hourly, config.n_stations, config.variable)?;
    let patterns = match &paths.circulation {
        Some(path) if config.classification.circulation => Some(read_circulation(path)?),
        _ => None,
    };

    prepare_records(params, daily, hourly, patterns)
}

/// Classify and preprocess in-memory series.
pub fn prepare_records(
    params: GlobalParams,
    mut daily: Vec<DailyRecord>,
    mut hourly: Vec<HourlyRecord>,
    patterns: Option<CirculationSeries>,
) -> Result<PreparedInputs, AppError> {
    let config = &params.config;
    config.validate()?;

    let classifier = Classifier::new(&config.classification, patterns.as_ref())?;
    classifier.classify(&mut daily)?;
    classifier.classify(&mut hourly)?;
    let class_count = classifier.class_count();

    let stats = preprocess(config.preprocess, &mut daily, &mut hourly)?;

    info!(
        "inputs ready: {} target days, {} donor days, {} classes",
        daily.len(),
        hourly.len(),
        class_count
    );

    Ok(PreparedInputs {
        params,
        daily,
        hourly,
        patterns,
        class_count,
        preprocess: stats,
    })
}

/// Disaggregate prepared inputs into caller-provided sinks.
pub fn disaggregate(
    inputs: &PreparedInputs,
    hourly: &mut dyn HourlySink,
    diagnostics: Option<&mut dyn DiagnosticSink>,
) -> Result<RunStats, AppError> {
    let dis = inputs.disaggregator()?;
    if let Some(maxima) = dis.maxima() {
        debug!("\n{}", format_maxima_preview(maxima, 12));
    }
    dis.run(hourly, diagnostics)
}

/// Run end-to-end: read the inputs, write the hourly output (and diagnostics
/// when configured), and optionally a JSON summary.
pub fn run_to_files(
    params: GlobalParams,
    summary_path: Option<&std::path::Path>,
) -> Result<RunOutput, AppError> {
    let inputs = prepare(params)?;
    let paths = &inputs.params.paths;
    let config = &inputs.params.config;

    let mut out = CsvHourlySink::create(&paths.output)?;
    let mut diag = match &paths.diagnostics {
        Some(path) => Some(CsvDiagnosticSink::create(path)?),
        None => None,
    };

    let stats = disaggregate(
        &inputs,
        &mut out,
        diag.as_mut().map(|d| d as &mut dyn DiagnosticSink),
    )?;
    info!(
        "wrote {} rows to {}",
        out.rows_written(),
        paths.output.display()
    );

    let [daily_summary, hourly_summary] = inputs.series_summaries();
    let mut summary = RunSummary::new(
        config.variable,
        config.n_stations,
        config.runs,
        config.seed,
        config.continuity,
        &stats,
        &paths.output,
    )
    .with_preprocess(inputs.preprocess.as_ref())?;
    summary.target_class_counts = daily_summary.class_counts;
    summary.donor_class_counts = hourly_summary.class_counts;

    if let Some(path) = summary_path {
        write_summary_json(path, &summary)?;
        info!("run summary written to {}", path.display());
    }

    Ok(RunOutput { stats, summary })
}
