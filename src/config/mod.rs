//! Configuration module
//!
//! Run parameters, loaded from a config file, overridden by the
//! environment, and finally by command-line flags.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::{find_config_file, is_yaml_file};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RunError;

/// Concurrency ladder used when no levels are given
pub const DEFAULT_CONCURRENCY_LEVELS: &[u32] = &[
    25, 50, 75, 100, 200, 300, 400, 500, 750, 1000, 1250, 1500, 2000,
];

/// Parameters for one ramp run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target address, `host:port`
    pub endpoint: String,

    /// Concurrency levels, tested in order
    pub concurrency_levels: Vec<u32>,

    /// Message rate of the first step in each level
    pub starting_rate: u32,

    /// Each step adds `max(1, ramp_constant / concurrency)` to the rate
    pub ramp_constant: u32,

    /// Dispatch windows per step
    pub windows_per_step: u32,

    /// Length of one dispatch window in milliseconds
    pub window_ms: u64,

    /// Pause between steps in milliseconds
    pub settle_ms: u64,

    /// How long to wait for a step's round trips in milliseconds
    pub reception_timeout_ms: u64,

    /// How long to wait for a level's connections to open, in seconds
    pub open_timeout_secs: u64,

    /// Ramping stops once `rate * concurrency` reaches this
    pub rate_ceiling: u64,

    /// Directory for result logs
    pub output_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            endpoint: "localhost:8080".to_string(),
            concurrency_levels: DEFAULT_CONCURRENCY_LEVELS.to_vec(),
            starting_rate: 1,
            ramp_constant: 1000,
            windows_per_step: 3,
            window_ms: 1000,
            settle_ms: 2000,
            reception_timeout_ms: 5000,
            open_timeout_secs: 60,
            rate_ceiling: 500_000,
            output_dir: PathBuf::from("."),
            log_level: "info".to_string(),
        }
    }
}

impl RunConfig {
    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Reject parameters the ramp cannot run with
    pub fn validate(&self) -> Result<(), RunError> {
        if self.endpoint.is_empty() {
            return Err(RunError::Config("endpoint is empty".to_string()));
        }
        if self.concurrency_levels.is_empty() {
            return Err(RunError::Config("no concurrency levels".to_string()));
        }
        if self.concurrency_levels.contains(&0) {
            return Err(RunError::Config("concurrency levels must be positive".to_string()));
        }
        if self.windows_per_step == 0 {
            return Err(RunError::Config("windows_per_step must be positive".to_string()));
        }
        // Every window has to carry at least one message
        if self.starting_rate as u64 * self.window_ms < 1000 {
            return Err(RunError::Config(format!(
                "a {}ms window at {} msg/s sends nothing",
                self.window_ms, self.starting_rate
            )));
        }
        if self.reception_timeout_ms == 0 || self.open_timeout_secs == 0 {
            return Err(RunError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reception_timeout(&self) -> Duration {
        Duration::from_millis(self.reception_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }
}

/// Parse a comma separated list of concurrency levels
pub fn parse_levels(s: &str) -> Result<Vec<u32>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .with_context(|| format!("Invalid concurrency level: {part}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.concurrency_levels.first(), Some(&25));
        assert_eq!(config.concurrency_levels.last(), Some(&2000));
        assert_eq!(config.starting_rate, 1);
        assert_eq!(config.reception_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let empty = RunConfig {
            concurrency_levels: Vec::new(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let zero_level = RunConfig {
            concurrency_levels: vec![25, 0],
            ..Default::default()
        };
        assert!(zero_level.validate().is_err());

        let silent_window = RunConfig {
            window_ms: 500,
            ..Default::default()
        };
        assert!(silent_window.validate().is_err());

        let no_windows = RunConfig {
            windows_per_step: 0,
            ..Default::default()
        };
        assert!(no_windows.validate().is_err());
    }

    #[test]
    fn test_save_load_yaml_and_json() {
        let dir = tempdir().unwrap();
        let config = RunConfig {
            endpoint: "10.0.0.5:9000".to_string(),
            concurrency_levels: vec![10, 20],
            ..Default::default()
        };

        for name in ["run.yaml", "run.json"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(RunConfig::load(&path).unwrap(), config);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.yaml");
        std::fs::write(&path, "endpoint: example.com:80\nrate_ceiling: 1000\n").unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.endpoint, "example.com:80");
        assert_eq!(config.rate_ceiling, 1000);
        assert_eq!(config.ramp_constant, 1000);
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!(parse_levels("25, 50,100").unwrap(), vec![25, 50, 100]);
        assert!(parse_levels("25,abc").is_err());
        assert!(parse_levels("").unwrap().is_empty());
    }
}
