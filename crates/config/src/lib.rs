//! Configuration helpers for health-sync
//!
//! Provides utilities for locating the shared health-sync config directory
//! (~/.config/health-sync/), resolving the default store path, and loading
//! JSON configuration files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the store location
pub const DB_PATH_ENV: &str = "HEALTH_SYNC_DB";

/// Store filename used when no override is given
pub const DEFAULT_DB_FILENAME: &str = "health.sqlite";

/// Get the health-sync config directory (~/.config/health-sync/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("health-sync"))
}

/// Get the path to a config file within the health-sync config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Resolve the store path: `$HEALTH_SYNC_DB` if set and non-empty,
/// otherwise `health.sqlite` in the current directory.
pub fn default_db_path() -> PathBuf {
    db_path_from(std::env::var(DB_PATH_ENV).ok())
}

fn db_path_from(env_value: Option<String>) -> PathBuf {
    match env_value {
        Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => PathBuf::from(DEFAULT_DB_FILENAME),
    }
}

/// Load and parse a JSON config file from the health-sync config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the health-sync config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}
