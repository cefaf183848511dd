//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::erddap::client::{DEFAULT_SEARCH_PAGE_SIZE, DEFAULT_TIMEOUT};
use crate::erddap::{PreviewLimits, UpstreamSettings};
use crate::error::ConfigError;
use crate::mcp::PreviewSettings;

/// Server used when a tool call names none.
pub const DEFAULT_SERVER_URL: &str = "https://coastwatch.pfeg.noaa.gov/erddap";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Base URL of the default ERDDAP server.
    #[serde(default = "default_server_url")]
    pub default_server_url: String,

    /// Path to the server list JSON file.
    ///
    /// When unset, `~/.erddap-mcp/servers.json` is used if it exists.
    #[serde(default)]
    pub servers_file: Option<PathBuf>,

    /// Upstream request settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Data preview settings.
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            default_server_url: default_server_url(),
            servers_file: None,
            upstream: UpstreamConfig::default(),
            preview: PreviewConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.default_server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "default_server_url must be an http(s) URL, got '{}'",
                    self.default_server_url
                ),
            });
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "upstream.timeout_secs must be greater than 0".to_string(),
            });
        }
        if self.upstream.search_page_size == 0 {
            return Err(ConfigError::ValidationError {
                message: "upstream.search_page_size must be greater than 0".to_string(),
            });
        }

        if self.preview.max_rows == 0 || self.preview.max_columns == 0 {
            return Err(ConfigError::ValidationError {
                message: "preview.max_rows and preview.max_columns must be greater than 0"
                    .to_string(),
            });
        }
        if self.preview.display_rows > self.preview.max_rows {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "preview.display_rows ({}) must not exceed preview.max_rows ({})",
                    self.preview.display_rows, self.preview.max_rows
                ),
            });
        }

        Ok(())
    }

    /// Upstream settings for the HTTP client.
    #[must_use]
    pub const fn upstream_settings(&self) -> UpstreamSettings {
        UpstreamSettings {
            timeout: Duration::from_secs(self.upstream.timeout_secs),
            search_page_size: self.upstream.search_page_size,
        }
    }

    /// Preview settings for the `to_pandas` tool.
    #[must_use]
    pub const fn preview_settings(&self) -> PreviewSettings {
        PreviewSettings {
            limits: PreviewLimits {
                max_rows: self.preview.max_rows,
                max_columns: self.preview.max_columns,
            },
            display_rows: self.preview.display_rows,
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

/// Upstream request configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Per-request timeout in seconds.
    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `itemsPerPage` sent with search requests.
    /// Default: 100
    #[serde(default = "default_search_page_size")]
    pub search_page_size: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            search_page_size: default_search_page_size(),
        }
    }
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

const fn default_search_page_size() -> u32 {
    DEFAULT_SEARCH_PAGE_SIZE
}

/// Data preview configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    /// Maximum rows downloaded per preview.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Rows shown in the preview table.
    #[serde(default = "default_display_rows")]
    pub display_rows: usize,

    /// Maximum columns kept per preview.
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            display_rows: default_display_rows(),
            max_columns: default_max_columns(),
        }
    }
}

const fn default_max_rows() -> usize {
    1000
}

const fn default_display_rows() -> usize {
    5
}

const fn default_max_columns() -> usize {
    20
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
