//! Command-line parsing for the method-of-fragments disaggregator.
//!
//! Argument parsing and command dispatch stay separate from the algorithm code;
//! everything the run itself needs comes from the parameter file, with a few
//! command-line overrides.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::Variable;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "mof",
    version,
    about = "Temporal disaggregation of daily station data to hourly values (method of fragments)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Disaggregate the daily series described by a parameter file.
    Run(RunArgs),
    /// Load and classify the inputs, print summaries, and stop before disaggregating.
    Inspect(InspectArgs),
    /// Write a synthetic dataset and a matching parameter file.
    Synth(SynthArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Parameter file (`KEY,VALUE` lines).
    #[arg(value_name = "PARAMS")]
    pub params: PathBuf,

    /// Override the random seed (`SEED`).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the ensemble size (`RUN`).
    #[arg(long)]
    pub runs: Option<usize>,

    /// Process target days on all cores. Output is identical to a sequential run.
    #[arg(long)]
    pub parallel: bool,

    /// Write a JSON run summary.
    #[arg(long, value_name = "JSON")]
    pub summary: Option<PathBuf>,

    /// Override the output file (`FP_OUT`).
    #[arg(long, value_name = "CSV")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct InspectArgs {
    /// Parameter file (`KEY,VALUE` lines).
    #[arg(value_name = "PARAMS")]
    pub params: PathBuf,

    /// Number of classes shown in the solar maxima preview.
    #[arg(long, default_value_t = 8)]
    pub preview: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Directory for the generated files.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Variable::Temperature)]
    pub variable: Variable,

    #[arg(short = 'n', long, default_value_t = 4)]
    pub stations: usize,

    /// Days in the hourly (donor) period.
    #[arg(long, default_value_t = 730)]
    pub hourly_days: usize,

    /// Days in the daily (target) period.
    #[arg(long, default_value_t = 90)]
    pub daily_days: usize,

    /// Circulation-pattern classes (0 = none).
    #[arg(long, default_value_t = 0)]
    pub patterns: u32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::parse_from(["mof", "run", "p.txt", "--seed", "9", "--parallel"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.params, PathBuf::from("p.txt"));
        assert_eq!(args.seed, Some(9));
        assert!(args.parallel);
        assert!(args.summary.is_none());
    }

    #[test]
    fn synth_parses_variable_names() {
        let cli = Cli::parse_from([
            "mof", "synth", "--out-dir", "d", "--variable", "solar", "-n", "2",
        ]);
        let Command::Synth(args) = cli.command else {
            panic!("expected synth");
        };
        assert_eq!(args.variable, Variable::Solar);
        assert_eq!(args.stations, 2);
    }
}
