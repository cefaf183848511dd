//! HTTP client for ERDDAP servers.
//!
//! [`ErddapClient`] owns a cache of [`UpstreamHandle`]s keyed by the exact
//! `(server URL, protocol)` pair. A handle wraps its own `reqwest` client
//! (and therefore its own connection pool), so repeated tool calls against
//! the same server reuse connections instead of setting up new ones.
//!
//! Every request is bounded by the configured timeout. Failures are
//! reported immediately; nothing is retried.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::error::{UpstreamError, UpstreamResult};
use super::metadata::parse_dataset_metadata;
use super::preview::{parse_preview, DataPreview, PreviewLimits};
use super::query::{griddap_query, tabledap_query};

/// Default bound on every upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of search results requested per page.
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 100;

/// ERDDAP data access protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataProtocol {
    /// Tabular data (`tabledap`).
    #[default]
    Tabledap,
    /// Gridded data (`griddap`).
    Griddap,
}

impl DataProtocol {
    /// Accepted spellings, matched exactly.
    pub const NAMES: [&'static str; 4] = ["tabledap", "griddap", "tabular", "gridded"];

    /// The URL path segment for this protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tabledap => "tabledap",
            Self::Griddap => "griddap",
        }
    }
}

impl fmt::Display for DataProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tabledap" | "tabular" => Ok(Self::Tabledap),
            "griddap" | "gridded" => Ok(Self::Griddap),
            _ => Err(format!(
                "unknown protocol '{s}', expected 'tabledap' or 'griddap'"
            )),
        }
    }
}

/// Settings shared by every handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamSettings {
    /// Bound on every request, including reading the body.
    pub timeout: Duration,
    /// `itemsPerPage` sent with search requests.
    pub search_page_size: u32,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
        }
    }
}

/// A connection to one ERDDAP server for one protocol.
#[derive(Debug)]
pub struct UpstreamHandle {
    base_url: String,
    protocol: DataProtocol,
    settings: UpstreamSettings,
    http: reqwest::Client,
}

impl UpstreamHandle {
    /// Creates a handle with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        protocol: DataProtocol,
        settings: UpstreamSettings,
    ) -> UpstreamResult<Self> {
        let base_url = base_url.into();
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("erddap-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| UpstreamError::ClientBuild {
                server: base_url.clone(),
                source,
            })?;

        Ok(Self {
            base_url,
            protocol,
            settings,
            http,
        })
    }

    /// The server URL this handle was resolved for.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The protocol this handle was resolved for.
    #[must_use]
    pub const fn protocol(&self) -> DataProtocol {
        self.protocol
    }

    fn root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// URL of the CSV search endpoint for `query`.
    #[must_use]
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search/index.csv?page=1&itemsPerPage={}&searchFor={}",
            self.root(),
            self.settings.search_page_size,
            urlencoding::encode(query)
        )
    }

    /// URL of the CSV metadata table for a dataset.
    #[must_use]
    pub fn info_url(&self, dataset_id: &str) -> String {
        format!(
            "{}/info/{}/index.csv",
            self.root(),
            urlencoding::encode(dataset_id)
        )
    }

    /// URL of a CSV data subset.
    #[must_use]
    pub fn data_url(&self, dataset_id: &str, query: &str) -> String {
        let base = format!(
            "{}/{}/{}.csv",
            self.root(),
            self.protocol,
            urlencoding::encode(dataset_id)
        );
        if query.is_empty() {
            base
        } else {
            format!("{base}?{query}")
        }
    }

    /// Runs a full-text dataset search and returns the raw CSV.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, connection failure or non-2xx status.
    pub async fn search(&self, query: &str) -> UpstreamResult<String> {
        self.fetch("search", &self.search_url(query), None).await
    }

    /// Fetches the metadata table of a dataset as raw CSV.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, connection failure or non-2xx status.
    pub async fn get_info(&self, dataset_id: &str) -> UpstreamResult<String> {
        self.fetch("get_info", &self.info_url(dataset_id), None)
            .await
    }

    /// Downloads a bounded sample of a dataset.
    ///
    /// For griddap the dataset's metadata is fetched first to learn its
    /// dimension order. Each of the two requests gets its own timeout, so a
    /// griddap preview can take up to twice the configured bound. Reading
    /// stops once enough lines for `limits` have arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be expressed, the server
    /// fails, or the response has no header row.
    pub async fn preview(
        &self,
        dataset_id: &str,
        variables: &[String],
        constraints: &Map<String, Value>,
        limits: PreviewLimits,
    ) -> UpstreamResult<DataPreview> {
        let query = match self.protocol {
            DataProtocol::Tabledap => tabledap_query(variables, constraints)?,
            DataProtocol::Griddap => {
                let info = self.get_info(dataset_id).await?;
                let metadata = parse_dataset_metadata(&info, dataset_id)?;
                griddap_query(&metadata, variables, constraints)?
            }
        };

        let url = self.data_url(dataset_id, &query);
        let text = self
            .fetch("preview", &url, Some(limits.line_budget()))
            .await?;

        Ok(parse_preview(&text, dataset_id, limits)?)
    }

    /// Issues a GET request and returns the body as text.
    ///
    /// With a `line_budget`, the body is read chunk by chunk and the
    /// connection is dropped once that many lines have arrived.
    async fn fetch(
        &self,
        operation: &str,
        url: &str,
        line_budget: Option<usize>,
    ) -> UpstreamResult<String> {
        debug!(operation, url, "Requesting upstream");

        let transport = |e: reqwest::Error| {
            UpstreamError::from_transport(operation, &self.base_url, self.settings.timeout, &e)
        };

        let mut response = self.http.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(operation, error = %e, "Failed to read error body");
                    format!("(error body unreadable: {e})")
                }
            };
            return Err(UpstreamError::http(
                operation,
                &self.base_url,
                status.as_u16(),
                &body,
            ));
        }

        let Some(budget) = line_budget else {
            return response.text().await.map_err(transport);
        };

        let mut body = Vec::new();
        let mut lines = 0;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            lines += chunk.iter().filter(|b| **b == b'\n').count();
            body.extend_from_slice(&chunk);
            if lines >= budget {
                if let Some(end) = body.iter().rposition(|b| *b == b'\n') {
                    body.truncate(end + 1);
                }
                debug!(operation, lines, "Line budget reached, closing response");
                break;
            }
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

type HandleKey = (String, DataProtocol);

/// Resolves and caches [`UpstreamHandle`]s.
///
/// Lookups and insertions happen under one lock, so concurrent first use of
/// a key still creates exactly one handle. Handles are never evicted.
#[derive(Debug)]
pub struct ErddapClient {
    settings: UpstreamSettings,
    handles: Mutex<HashMap<HandleKey, Arc<UpstreamHandle>>>,
}

impl ErddapClient {
    /// Creates a client with an empty handle cache.
    #[must_use]
    pub fn new(settings: UpstreamSettings) -> Self {
        Self {
            settings,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the handle for `(server_url, protocol)`, creating it on first use.
    ///
    /// The key is the exact URL string; callers normalise it beforehand.
    ///
    /// # Errors
    ///
    /// Returns an error if a new handle's HTTP client cannot be built.
    pub fn resolve(
        &self,
        server_url: &str,
        protocol: DataProtocol,
    ) -> UpstreamResult<Arc<UpstreamHandle>> {
        let key = (server_url.to_string(), protocol);
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = handles.get(&key) {
            return Ok(Arc::clone(handle));
        }

        debug!(server = server_url, %protocol, "Creating upstream handle");
        let handle = Arc::new(UpstreamHandle::new(server_url, protocol, self.settings)?);
        handles.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of cached handles.
    #[must_use]
    pub fn cached_handles(&self) -> usize {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ErddapClient {
    fn default() -> Self {
        Self::new(UpstreamSettings::default())
    }
}
