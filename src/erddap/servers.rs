//! Registry of known ERDDAP servers.
//!
//! The registry is loaded once at start-up from a JSON list in the format
//! used by the community "awesome ERDDAP" list:
//!
//! ```json
//! [
//!   { "name": "CoastWatch West Coast Node", "short_name": "CSWC",
//!     "url": "https://coastwatch.pfeg.noaa.gov/erddap", "public": true }
//! ]
//! ```
//!
//! Invalid entries are logged and skipped. If the list cannot be read at
//! all, a two-entry fallback keeps the server usable.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::RegistryError;

/// A known upstream ERDDAP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Human-readable name.
    pub name: String,
    /// Short identifier, usable in place of the URL.
    pub short_name: String,
    /// Base URL of the ERDDAP installation (ends in `/erddap`).
    #[serde(rename = "url")]
    pub base_url: String,
    /// Whether the server is open to the public.
    #[serde(rename = "public")]
    pub is_public: bool,
}

impl ServerDescriptor {
    fn validate(self, index: usize) -> Result<Self, RegistryError> {
        let invalid = |message: &str| RegistryError::InvalidEntry {
            index,
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.short_name.trim().is_empty() {
            return Err(invalid("short_name is empty"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid("url must be an absolute http(s) URL"));
        }
        Ok(self)
    }
}

/// Read-only collection of server descriptors.
#[derive(Debug, Clone)]
pub struct ServerRegistry {
    servers: Vec<ServerDescriptor>,
}

impl ServerRegistry {
    /// Creates a registry from already-validated descriptors.
    #[must_use]
    pub const fn new(servers: Vec<ServerDescriptor>) -> Self {
        Self { servers }
    }

    /// Loads the registry from `source`, falling back to the built-in list.
    #[must_use]
    pub fn load(source: Option<&Path>) -> Self {
        Self::new(load_servers(source))
    }

    /// All servers in source order.
    #[must_use]
    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    /// Number of registered servers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns `true` if no servers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Splits the registry into `(public, private)` groups.
    #[must_use]
    pub fn list_servers(&self) -> (Vec<&ServerDescriptor>, Vec<&ServerDescriptor>) {
        self.servers.iter().partition(|s| s.is_public)
    }

    /// Looks a server up by its short name (case-insensitive).
    #[must_use]
    pub fn find_by_short_name(&self, short_name: &str) -> Option<&ServerDescriptor> {
        self.servers
            .iter()
            .find(|s| s.short_name.eq_ignore_ascii_case(short_name))
    }
}

/// Loads server descriptors from a JSON file.
///
/// Returns [`fallback_servers`] if `source` is `None`, missing, unreadable or
/// not a JSON array. Individual invalid entries are skipped with a warning.
#[must_use]
pub fn load_servers(source: Option<&Path>) -> Vec<ServerDescriptor> {
    let Some(path) = source else {
        debug!("No server list configured, using built-in servers");
        return fallback_servers();
    };

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            let err = RegistryError::Read {
                path: path.to_path_buf(),
                source: e,
            };
            warn!(error = %err, "Using built-in server list");
            return fallback_servers();
        }
    };

    match parse_servers(&contents) {
        Ok(servers) => servers,
        Err(err) => {
            warn!(error = %err, path = %path.display(), "Using built-in server list");
            fallback_servers()
        }
    }
}

/// Parses a JSON server list, skipping invalid entries.
///
/// # Errors
///
/// Returns [`RegistryError::Format`] if the document is not a JSON array.
pub fn parse_servers(json: &str) -> Result<Vec<ServerDescriptor>, RegistryError> {
    let value: Value = serde_json::from_str(json).map_err(|e| RegistryError::Format {
        message: e.to_string(),
    })?;
    let Value::Array(entries) = value else {
        return Err(RegistryError::Format {
            message: "expected a top-level array".to_string(),
        });
    };

    let mut servers = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let parsed = serde_json::from_value::<ServerDescriptor>(entry)
            .map_err(|e| RegistryError::InvalidEntry {
                index,
                message: e.to_string(),
            })
            .and_then(|server| server.validate(index));

        match parsed {
            Ok(server) => servers.push(server),
            Err(err) => warn!(error = %err, "Skipping server entry"),
        }
    }

    Ok(servers)
}

/// The built-in server list used when no registry source is available.
#[must_use]
pub fn fallback_servers() -> Vec<ServerDescriptor> {
    vec![
        ServerDescriptor {
            name: "NOAA CoastWatch West Coast Node".to_string(),
            short_name: "CSWC".to_string(),
            base_url: "https://coastwatch.pfeg.noaa.gov/erddap".to_string(),
            is_public: true,
        },
        ServerDescriptor {
            name: "GCOOS ERDDAP".to_string(),
            short_name: "GCOOS".to_string(),
            base_url: "https://gcoos5.geos.tamu.edu/erddap".to_string(),
            is_public: false,
        },
    ]
}
