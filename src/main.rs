//! knee-tester - ramp load generator for message servers
//!
//! Opens a pool of persistent connections per concurrency level, sends
//! timestamped messages at a steadily rising rate, and records round-trip
//! latency statistics for every rate the target fully echoes. The point
//! where latency bends upward is the server's knee.
//!
//! ## Usage
//!
//! ```bash
//! # Run the default concurrency ladder against a target
//! knee-tester run --endpoint 10.0.0.1:8080
//!
//! # Test specific levels with a lower ceiling
//! knee-tester run 25,50,100 --endpoint 10.0.0.1:8080 --ceiling 50000
//!
//! # Write a config file with defaults, then show the effective config
//! knee-tester config init knee-tester.yaml
//! knee-tester config show
//! ```

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

mod cli;
mod config;
mod error;
mod output;
mod pacer;
mod pool;
mod results;
mod runner;
mod stats;
mod transport;
mod utils;

use cli::Args;
use config::{find_config_file, EnvConfig, RunConfig};
use output::{OutputFormat, ReportFormatter};
use results::CsvResultSink;
use runner::RunController;
use transport::TcpClientFactory;
use utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        cli::Command::Run(run_args) => {
            run_ramp(run_args, args.verbose).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
    }

    Ok(())
}

/// Build the effective configuration: defaults, file, environment, flags
fn resolve_config(explicit: Option<&Path>, env: &EnvConfig) -> Result<RunConfig> {
    let path: Option<PathBuf> = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.clone())
        .or_else(find_config_file);

    let mut config = match path {
        Some(path) => RunConfig::load(&path)?,
        None => RunConfig::default(),
    };
    env.apply(&mut config);
    Ok(config)
}

fn apply_run_args(config: &mut RunConfig, args: &cli::RunArgs) {
    if !args.levels.is_empty() {
        config.concurrency_levels = args.levels.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(ceiling) = args.ceiling {
        config.rate_ceiling = ceiling;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
}

async fn run_ramp(args: cli::RunArgs, verbose: bool) -> Result<()> {
    let env = EnvConfig::load();
    let mut config = resolve_config(args.config.as_deref(), &env)?;
    apply_run_args(&mut config, &args);

    init_logger(LogLevel::resolve(&config.log_level, verbose));
    config.validate()?;

    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {}", args.format))?;

    let sink = CsvResultSink::for_run(&config.output_dir, Utc::now())?;
    info!("Results will be written to {}", sink.path().display());

    let mut controller = RunController::new(Arc::new(TcpClientFactory::new()), config, sink);
    let report = controller.run().await.context("Run aborted")?;

    let mut formatter = ReportFormatter::new(format);
    if !std::io::stdout().is_terminal() {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_report(&report));

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {}. Use --force to overwrite.",
                    path.display()
                );
            }

            RunConfig::default().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { config, format } => {
            let env = EnvConfig::load();
            let resolved = resolve_config(config.as_deref(), &env)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&resolved)?
            } else {
                serde_yaml::to_string(&resolved)?
            };
            println!("{output}");

            if env.has_any() {
                println!("# includes KNEE_TESTER_* environment overrides");
            }
        }

        cli::ConfigAction::Env => {
            config::print_env_help();
        }
    }

    Ok(())
}
