//! Configuration management.
//!
//! This module resolves the reqmatch directories and database path, and
//! loads/saves the local configuration file.
//!
//! # Layout
//!
//! - **Config**: `~/.reqmatch/config.json` (`embeddings` and `matching` sections)
//! - **Database**: `~/.reqmatch/data/reqmatch.db`
//!
//! Environment variables take precedence over the file, the file over
//! built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::embeddings::EmbeddingSettings;
use crate::error::{Error, Result};

/// Matching settings stored in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Require equal categories when the source request has one
    pub category_filter: Option<bool>,
}

/// Local configuration file structure.
///
/// Stored at `~/.reqmatch/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReqmatchConfig {
    pub embeddings: Option<EmbeddingSettings>,
    pub matching: Option<MatchingSettings>,
}

/// Get the global reqmatch directory (`~/.reqmatch`).
#[must_use]
pub fn global_reqmatch_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".reqmatch"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `REQMATCH_DB` environment variable
/// 3. Global location: `~/.reqmatch/data/reqmatch.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("REQMATCH_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_reqmatch_dir().map(|dir| dir.join("data").join("reqmatch.db"))
}

fn config_path() -> Result<PathBuf> {
    global_reqmatch_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or_else(|| Error::Config("Could not determine home directory".into()))
}

/// Load the configuration file, or defaults when it does not exist.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<ReqmatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(ReqmatchConfig::default());
    }
    load_config_from(&path)
}

/// Load a configuration file from an explicit path.
///
/// # Errors
///
/// Returns [`Error::Config`] on read or parse failure.
pub fn load_config_from(path: &Path) -> Result<ReqmatchConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the configuration file.
///
/// # Errors
///
/// Returns [`Error::Config`] if the directory or file cannot be written.
pub fn save_config(config: &ReqmatchConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Save a configuration file to an explicit path.
///
/// # Errors
///
/// Returns [`Error::Config`] on serialization or write failure.
pub fn save_config_to(path: &Path, config: &ReqmatchConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Interpret a boolean environment value. Only `false`, `0`, `no` and `off`
/// (any case) count as false.
#[must_use]
pub fn parse_env_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

/// Whether category narrowing is enabled.
///
/// Priority: `REQMATCH_CATEGORY_FILTER` > config file > `true`.
#[must_use]
pub fn is_category_filter_enabled() -> bool {
    if let Ok(value) = std::env::var("REQMATCH_CATEGORY_FILTER") {
        if !value.trim().is_empty() {
            return parse_env_bool(&value);
        }
    }

    load_config()
        .ok()
        .and_then(|c| c.matching)
        .and_then(|m| m.category_filter)
        .unwrap_or(true)
}
