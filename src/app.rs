//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - reads the parameter file and applies command-line overrides
//! - sets up logging (stderr, plus the `FP_LOG` file when given)
//! - runs the disaggregation pipeline or one of the helper commands
//! - prints summaries

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use clap::Parser;
use log::info;

use crate::cli::{Command, InspectArgs, RunArgs, SynthArgs};
use crate::domain::GlobalParams;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `mof` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let params = params_from_args(&args)?;
    init_logging(params.paths.log.as_deref())?;

    println!("{}", crate::report::format_params(&params));
    let runs = params.config.runs;
    let output = pipeline::run_to_files(params, args.summary.as_deref())?;
    print!("{}", crate::report::format_run_stats(&output.stats, runs));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let params = crate::io::load_params(&args.params)?;
    init_logging(params.paths.log.as_deref())?;

    println!("{}", crate::report::format_params(&params));
    let inputs = pipeline::prepare(params)?;
    print!("{}", crate::report::format_series(&inputs.series_summaries()));

    let dis = inputs.disaggregator()?;
    if let Some(maxima) = dis.maxima() {
        println!();
        print!("{}", crate::report::format_maxima_preview(maxima, args.preview));
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    init_logging(None)?;
    let config = crate::data::SynthConfig {
        variable: args.variable,
        n_stations: args.stations,
        hourly_days: args.hourly_days,
        daily_days: args.daily_days,
        patterns: args.patterns,
        seed: args.seed,
        ..crate::data::SynthConfig::new(args.variable)
    };
    let files = crate::data::write_dataset(&args.out_dir, &config)?;
    println!("Parameter file: {}", files.params.display());
    println!("Run with: mof run {}", files.params.display());
    Ok(())
}

/// Parameter file plus command-line overrides, validated.
pub fn params_from_args(args: &RunArgs) -> Result<GlobalParams, AppError> {
    let mut params = crate::io::load_params(&args.params)?;
    if let Some(seed) = args.seed {
        params.config.seed = seed;
    }
    if let Some(runs) = args.runs {
        params.config.runs = runs;
    }
    if let Some(out) = &args.out {
        params.paths.output = out.clone();
    }
    params.config.parallel = args.parallel;
    params.config.validate()?;
    Ok(params)
}

/// `env_logger` at `info` unless `RUST_LOG` says otherwise. With `log_file`,
/// every line also goes to that file.
fn init_logging(log_file: Option<&Path>) -> Result<(), AppError> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::io(format!("failed to open log file '{}': {e}", path.display())))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }

    // A second initialisation (tests, repeated calls) keeps the first logger.
    if builder.try_init().is_ok() {
        if let Some(path) = log_file {
            info!("logging to {}", path.display());
        }
    }
    Ok(())
}

/// Writes to stderr and a log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn overrides_replace_parameter_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.txt");
        std::fs::write(
            &path,
            "VAR,0\nN_STATION,2\nFP_DAILY,d.csv\nFP_HOURLY,h.csv\nFP_OUT,o.csv\nRUN,3\nSEED,1\n",
        )
        .unwrap();

        let args = RunArgs {
            params: path,
            seed: Some(99),
            runs: None,
            parallel: true,
            summary: None,
            out: Some(PathBuf::from("/tmp/elsewhere.csv")),
        };
        let params = params_from_args(&args).unwrap();
        assert_eq!(params.config.seed, 99);
        assert_eq!(params.config.runs, 3);
        assert!(params.config.parallel);
        assert_eq!(params.paths.output, PathBuf::from("/tmp/elsewhere.csv"));
        assert_eq!(params.paths.daily, dir.path().join("d.csv"));
    }

    #[test]
    fn zero_runs_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.txt");
        std::fs::write(&path, "VAR,0\nN_STATION,2\nFP_DAILY,d\nFP_HOURLY,h\nFP_OUT,o\n").unwrap();
        let args = RunArgs {
            params: path,
            seed: None,
            runs: Some(0),
            parallel: false,
            summary: None,
            out: None,
        };
        assert_eq!(
            params_from_args(&args).unwrap_err().kind(),
            crate::error::ErrorKind::Config
        );
    }
}
