//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ramp load generator that finds the latency knee of a message server
#[derive(Parser, Debug)]
#[command(name = "knee-tester")]
#[command(version = "0.1.0")]
#[command(about = "Ramp message rates per concurrency level and record round-trip latency")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the load ramp against a target
    Run(RunArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Concurrency levels to test, in order
    #[arg(value_delimiter = ',')]
    pub levels: Vec<u32>,

    /// Target address (host:port)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stop ramping once rate x concurrency reaches this
    #[arg(long)]
    pub ceiling: Option<u64>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Directory for the result log
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write a configuration file with default values
    Init {
        /// Output path (.yaml, .yml or .json)
        #[arg(default_value = "./knee-tester.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// List supported environment variables
    Env,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_run_args() {
        let args = Args::parse_from([
            "knee-tester",
            "run",
            "25",
            "50,100",
            "--endpoint",
            "10.0.0.1:8080",
            "--ceiling",
            "20000",
        ]);
        match args.command {
            Command::Run(run) => {
                assert_eq!(run.levels, vec![25, 50, 100]);
                assert_eq!(run.endpoint.as_deref(), Some("10.0.0.1:8080"));
                assert_eq!(run.ceiling, Some(20000));
                assert_eq!(run.format, "table");
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_without_levels() {
        let args = Args::parse_from(["knee-tester", "run", "-v"]);
        assert!(args.verbose);
        match args.command {
            Command::Run(run) => assert!(run.levels.is_empty()),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_config_init() {
        let args = Args::parse_from(["knee-tester", "config", "init", "run.json", "--force"]);
        match args.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Init { path, force },
            }) => {
                assert_eq!(path, PathBuf::from("run.json"));
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_summary_format_is_documented() {
        let help = Args::command()
            .find_subcommand_mut("run")
            .unwrap()
            .render_help()
            .to_string();
        for format in ["table", "json", "json-pretty", "csv", "summary"] {
            assert!(help.contains(format));
            assert!(crate::output::OutputFormat::from_str(format).is_some());
        }
    }

    #[test]
    fn test_rejects_bad_level() {
        assert!(Args::try_parse_from(["knee-tester", "run", "abc"]).is_err());
    }
}
