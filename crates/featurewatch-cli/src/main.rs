//! FeatureWatch CLI - Feature view validation and monitoring tool
//!
//! Commands:
//! - `validate` - Parse and check a feature view definition
//! - `profile` - Register a definition on sample data and print feature statistics
//! - `drift` - Register on baseline data and check new data for drift

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{drift, profile, validate};
use output::OutputFormat;

/// Exit code when `drift` flags at least one feature
const DRIFT_EXIT_CODE: i32 = 2;

/// FeatureWatch CLI - Feature view validation and monitoring tool
#[derive(Parser)]
#[command(name = "featurewatch")]
#[command(author = "FeatureWatch Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Feature view validation, profiling and drift detection", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FEATUREWATCH_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml); defaults to the config file's setting
    #[arg(short, long)]
    output: Option<String>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (text, json)
    #[arg(long, env = "FEATUREWATCH_LOG_FORMAT", default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and check a feature view definition
    Validate {
        /// Path to feature view YAML file
        #[arg(short, long)]
        file: String,
    },

    /// Register a feature view on sample data and print per-feature statistics
    Profile {
        /// Path to feature view YAML file
        #[arg(short, long)]
        file: String,

        /// JSON array of records to register on
        #[arg(short, long)]
        data: String,
    },

    /// Check new data against a baseline for drift
    Drift {
        /// Path to feature view YAML file
        #[arg(short, long)]
        file: String,

        /// JSON array of records the baseline statistics come from
        #[arg(long)]
        baseline: String,

        /// JSON array of records to compare against the baseline
        #[arg(long)]
        current: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    let filter = match cli.verbose {
        0 => "warn,featurewatch=info,featurewatch_core=info",
        1 => "info,featurewatch=debug,featurewatch_core=debug",
        2 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(env_filter)
            .init();
    }

    // Load configuration
    let config = config::load_config(cli.config.as_deref())?;
    let format = OutputFormat::parse(cli.output.as_deref().unwrap_or(&config.output));

    // Execute command
    match cli.command {
        Commands::Validate { file } => {
            if !validate::run(&file, format).await? {
                std::process::exit(1);
            }
        }

        Commands::Profile { file, data } => {
            profile::run(&config, &file, &data, format).await?;
        }

        Commands::Drift {
            file,
            baseline,
            current,
        } => {
            if drift::run(&config, &file, &baseline, &current, format).await? {
                std::process::exit(DRIFT_EXIT_CODE);
            }
        }
    }

    Ok(())
}
