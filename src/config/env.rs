//! Environment variable configuration
//!
//! Provides `KNEE_TESTER_*` overrides for the run configuration.

use std::env;
use std::path::PathBuf;
use tracing::warn;

use super::{parse_levels, RunConfig};

/// Environment variable prefix
const ENV_PREFIX: &str = "KNEE_TESTER";

/// Overrides read from the environment
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Target from KNEE_TESTER_ENDPOINT
    pub endpoint: Option<String>,
    /// Comma separated levels from KNEE_TESTER_LEVELS
    pub levels: Option<Vec<u32>>,
    /// Ceiling from KNEE_TESTER_CEILING
    pub rate_ceiling: Option<u64>,
    /// Timeout from KNEE_TESTER_RECEPTION_TIMEOUT_MS
    pub reception_timeout_ms: Option<u64>,
    /// Directory from KNEE_TESTER_OUTPUT_DIR
    pub output_dir: Option<PathBuf>,
    /// Level from KNEE_TESTER_LOG_LEVEL
    pub log_level: Option<String>,
    /// Config file from KNEE_TESTER_CONFIG
    pub config_file: Option<PathBuf>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            endpoint: get_env("ENDPOINT"),
            levels: get_env("LEVELS").and_then(|v| levels_from(&v)),
            rate_ceiling: get_env_parse("CEILING"),
            reception_timeout_ms: get_env_parse("RECEPTION_TIMEOUT_MS"),
            output_dir: get_env("OUTPUT_DIR").map(PathBuf::from),
            log_level: get_env("LOG_LEVEL"),
            config_file: get_env("CONFIG").map(PathBuf::from),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.endpoint.is_some()
            || self.levels.is_some()
            || self.rate_ceiling.is_some()
            || self.reception_timeout_ms.is_some()
            || self.output_dir.is_some()
            || self.log_level.is_some()
            || self.config_file.is_some()
    }

    /// Apply the overrides that are set
    pub fn apply(&self, config: &mut RunConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(levels) = &self.levels {
            if !levels.is_empty() {
                config.concurrency_levels = levels.clone();
            }
        }
        if let Some(ceiling) = self.rate_ceiling {
            config.rate_ceiling = ceiling;
        }
        if let Some(timeout) = self.reception_timeout_ms {
            config.reception_timeout_ms = timeout;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}

/// Parse a levels override, warning instead of silently dropping a bad value
fn levels_from(raw: &str) -> Option<Vec<u32>> {
    match parse_levels(raw) {
        Ok(levels) => Some(levels),
        Err(e) => {
            warn!("Ignoring {}_LEVELS={:?}: {:#}", ENV_PREFIX, raw, e);
            None
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Print all KNEE_TESTER environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_ENDPOINT              Target address (host:port)");
    println!("  {ENV_PREFIX}_LEVELS                Concurrency levels (comma-separated)");
    println!("  {ENV_PREFIX}_CEILING               Stop ramping at rate x concurrency");
    println!("  {ENV_PREFIX}_RECEPTION_TIMEOUT_MS  Wait for round trips per step");
    println!("  {ENV_PREFIX}_OUTPUT_DIR            Directory for result logs");
    println!("  {ENV_PREFIX}_LOG_LEVEL             trace, debug, info, warn, error");
    println!("  {ENV_PREFIX}_CONFIG                Path to configuration file");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_ENDPOINT=10.0.0.100:8080");
    println!("  export {ENV_PREFIX}_LEVELS=25,50,100");
    println!("  knee-tester run");
}
