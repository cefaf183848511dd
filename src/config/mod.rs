//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk and parsing
//! it into validated, type-safe structures.
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the CLI positional argument (must exist)
//! 2. Default location (optional; built-in defaults apply when absent):
//!    - **Linux/macOS:** `~/.erddap-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.erddap-mcp\config.json`
//!
//! The server list is read from `servers_file`, or from `servers.json` next
//! to the default configuration file.

mod settings;

pub use settings::{
    Config, LoggingConfig, PreviewConfig, UpstreamConfig, DEFAULT_SERVER_URL,
};

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.erddap-mcp/`
/// - **Windows:** `%USERPROFILE%\.erddap-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".erddap-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Returns the platform-specific default server list path.
#[must_use]
pub fn default_servers_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("servers.json"))
}

/// Loads and parses the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location and
/// falls back to [`Config::default`] when that file does not exist.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly named configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - A field is invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ConfigError::NotFound {
                    path: p.to_path_buf(),
                });
            }
            p.to_path_buf()
        }
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            _ => {
                debug!("No configuration file found, using defaults");
                return Ok(Config::default());
            }
        },
    };

    load_config_file(&config_path)
}

fn load_config_file(config_path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: config_path.to_path_buf(),
        source: e,
    })?;

    config.validate()?;

    Ok(config)
}

/// Picks the server list file: the configured one, else the default path
/// if that file exists.
#[must_use]
pub fn servers_source(config: &Config) -> Option<PathBuf> {
    config
        .servers_file
        .clone()
        .or_else(|| default_servers_path().filter(|p| p.exists()))
}
