#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the commuting × air quality pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`commute_air_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the interpolation progress bar never fight for the terminal.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use commute_air_cli_utils::IndicatifProgress;
use commute_air_pipeline::config::{DEFAULT_CONFIG_TOML, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "commute_air",
    about = "Bivariate commuting x air quality indicator per district"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file; built-in defaults are used if it does not exist
    #[arg(long, default_value = "commute_air.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Load inputs, enrich and classify regions, and write the subsets
    Run {
        #[command(flatten)]
        source: ConfigArgs,
        /// Preferred year column of a wide commuting table
        #[arg(long)]
        year: Option<u16>,
        /// Nearest stations used per interpolated region
        #[arg(long)]
        k: Option<usize>,
        /// Interpolation search radius in kilometres
        #[arg(long)]
        max_km: Option<f64>,
        /// Directory the subset files are written to
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        source: ConfigArgs,
        /// Print the annotated default template instead
        #[arg(long)]
        template: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = commute_air_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            year,
            k,
            max_km,
            output_dir,
        } => {
            let mut config = load_config(&source.config)?;
            if let Some(year) = year {
                config.commute.options.year = Some(year);
            }
            if let Some(k) = k {
                config.idw.k = k;
            }
            if let Some(max_km) = max_km {
                config.idw.max_km = max_km;
            }
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }

            let progress = IndicatifProgress::stage_bar(&multi, "Running pipeline");
            let report = commute_air_pipeline::run(&config, progress.as_ref())?;

            for output in &report.outputs {
                log::info!(
                    "{}: {} regions -> {}",
                    output.name,
                    output.regions,
                    output.path.display()
                );
            }
        }
        Commands::Config { source, template } => {
            if template {
                print!("{DEFAULT_CONFIG_TOML}");
            } else {
                let config = load_config(&source.config)?;
                print!("{}", config.to_toml_string()?);
            }
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(PipelineConfig::load(path)?)
    } else {
        log::info!(
            "No configuration at {}, using built-in defaults",
            path.display()
        );
        Ok(PipelineConfig::default())
    }
}
