use anyhow::{Context, Result};
use blockprof::calibration::Calibration;
use blockprof::cli::{Cli, Command, OutputFormat};
use blockprof::clock::ThreadCpuClock;
use blockprof::validate::run_workload;
use blockprof::ProfileConfig;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Base configuration: explicit file, else environment, else defaults
fn load_config(path: Option<&std::path::Path>) -> Result<ProfileConfig> {
    match path {
        Some(path) => ProfileConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ProfileConfig::from_env().context("Failed to load configuration from environment"),
    }
}

fn print_calibration(calibration: &Calibration, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(calibration)
                .context("Failed to serialize calibration")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("Calibration samples:      {}", calibration.samples);
            println!(
                "Mean clock read cost:     {} ticks ({:.10} secs)",
                calibration.counter_mean,
                calibration.counter_mean_secs()
            );
            println!("Heuristic sigma:          {} ticks", calibration.counter_sigma);
            println!("Measured std deviation:   {:.2} ticks", calibration.counter_stddev);
            println!(
                "Samples above 2x mean:    {} (largest {} ticks)",
                calibration.ncounter_largest, calibration.counter_largest
            );
            if calibration.mode == blockprof::CorrectionMode::Suspect {
                println!("Loop iteration cost:      {:.10} secs", calibration.time_for_loop);
                println!("Clock read cost:          {:.10} secs", calibration.time_counter);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Calibrate {
            samples,
            mode,
            format,
        } => {
            if let Some(samples) = samples {
                config.calibration_samples = samples;
            }
            if let Some(mode) = mode {
                config.correction_mode = mode.into();
            }
            config.validate()?;

            let calibration = Calibration::measure(
                &ThreadCpuClock,
                config.calibration_samples,
                config.correction_mode,
            )
            .context("Failed to calibrate the thread CPU clock")?;
            print_calibration(&calibration, format)?;
        }
        Command::Validate {
            iterations,
            output_dir,
            verbose,
            samples,
            mode,
        } => {
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(samples) = samples {
                config.calibration_samples = samples;
            }
            if let Some(mode) = mode {
                config.correction_mode = mode.into();
            }

            blockprof::try_init_profile_with(config).context("Failed to start profiling")?;
            run_workload(iterations);
            let path = blockprof::try_dump_profile(verbose).context("Failed to write profile")?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
