//! Configuration file discovery

use std::path::{Path, PathBuf};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./knee-tester.yaml",
    "./.knee-tester.yaml",
    "./knee-tester.yml",
    "./knee-tester.json",
    "~/.config/knee-tester/config.yaml",
    "~/.knee-tester.yaml",
];

/// Find configuration file in standard locations
pub fn find_config_file() -> Option<PathBuf> {
    search_from(Path::new("."))
}

/// First existing location, with relative entries resolved against `base`
fn search_from(base: &Path) -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| base.join(expand_path(location)))
        .find(|path| path.exists())
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
