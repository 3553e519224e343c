//! CLI argument parsing for blockprof

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::calibration::CorrectionMode;

/// Output format for calibration results
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

/// Correction mode as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    /// Subtract a fresh estimate of the clock-read cost from every interval
    PerSample,
    /// Keep raw intervals and flag blocks within the estimated error
    Suspect,
}

impl From<ModeArg> for CorrectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PerSample => CorrectionMode::PerSample,
            ModeArg::Suspect => CorrectionMode::Suspect,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "blockprof")]
#[command(version)]
#[command(about = "Per-thread CPU time instrumentation profiler tools", long_about = None)]
pub struct Cli {
    /// TOML configuration file (defaults to $BLOCKPROF_CONFIG, then built-in defaults)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Measure the cost of reading the thread CPU clock
    Calibrate {
        /// Samples per calibration loop
        #[arg(short = 'n', long = "samples", value_name = "N")]
        samples: Option<u64>,

        /// Correction mode to calibrate for
        #[arg(long = "mode", value_enum)]
        mode: Option<ModeArg>,

        /// Output format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Profile the built-in nested workload and write its report
    Validate {
        /// Iterations of the workload loop
        #[arg(short = 'i', long = "iterations", value_name = "N", default_value = "100000")]
        iterations: u64,

        /// Directory receiving the report
        #[arg(short = 'o', long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Include per-block summaries in the report
        #[arg(short = 'v', long = "verbose")]
        verbose: bool,

        /// Samples per calibration loop
        #[arg(short = 'n', long = "samples", value_name = "N")]
        samples: Option<u64>,

        /// Correction mode
        #[arg(long = "mode", value_enum)]
        mode: Option<ModeArg>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_calibrate_defaults() {
        let cli = Cli::parse_from(["blockprof", "calibrate"]);
        assert!(!cli.debug);
        match cli.command {
            Command::Calibrate {
                samples,
                mode,
                format,
            } => {
                assert!(samples.is_none());
                assert!(mode.is_none());
                assert!(matches!(format, OutputFormat::Text));
            }
            _ => panic!("expected calibrate"),
        }
    }

    #[test]
    fn test_cli_validate_flags() {
        let cli = Cli::parse_from([
            "blockprof",
            "--debug",
            "validate",
            "-i",
            "10",
            "-o",
            "/tmp/out",
            "-v",
            "--mode",
            "suspect",
        ]);
        assert!(cli.debug);
        match cli.command {
            Command::Validate {
                iterations,
                output_dir,
                verbose,
                mode,
                ..
            } => {
                assert_eq!(iterations, 10);
                assert_eq!(output_dir, Some(PathBuf::from("/tmp/out")));
                assert!(verbose);
                assert_eq!(
                    CorrectionMode::from(mode.unwrap()),
                    CorrectionMode::Suspect
                );
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_cli_global_config_after_subcommand() {
        let cli = Cli::parse_from(["blockprof", "calibrate", "--config", "prof.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("prof.toml")));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["blockprof"]).is_err());
    }
}
