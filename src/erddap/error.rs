//! Error types for ERDDAP upstream operations.

use std::time::Duration;

use thiserror::Error;

/// Maximum number of response body characters kept in an HTTP error.
pub const MAX_ERROR_BODY_CHARS: usize = 500;

/// Result type for upstream operations.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Errors raised while talking to an ERDDAP server.
///
/// Every variant names the operation and the server so the message can be
/// shown to the assistant as-is. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request did not complete within the configured timeout.
    #[error("{operation} timed out after {}s waiting for {server}", .timeout.as_secs())]
    Timeout {
        /// Operation that was running (e.g. "search").
        operation: String,
        /// Base URL of the server.
        server: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The server answered with a non-success status code.
    #[error("{operation} failed on {server}: HTTP {status}: {body}")]
    Http {
        /// Operation that was running.
        operation: String,
        /// Base URL of the server.
        server: String,
        /// HTTP status code.
        status: u16,
        /// Response body, truncated to [`MAX_ERROR_BODY_CHARS`].
        body: String,
    },

    /// The server could not be reached at all.
    #[error("{operation} could not reach {server}: {message}")]
    Unreachable {
        /// Operation that was running.
        operation: String,
        /// Base URL of the server.
        server: String,
        /// Description of the connection failure.
        message: String,
    },

    /// The HTTP client for a server could not be constructed.
    #[error("failed to create HTTP client for {server}")]
    ClientBuild {
        /// Base URL of the server.
        server: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// A request argument cannot be expressed as an ERDDAP query.
    #[error("invalid request for {operation}: {message}")]
    InvalidQuery {
        /// Operation that was being prepared.
        operation: String,
        /// What is wrong with the request.
        message: String,
    },

    /// The server's response could not be interpreted.
    #[error(transparent)]
    Parse(#[from] MetadataParseError),
}

impl UpstreamError {
    /// Creates an HTTP status error, truncating the body.
    pub fn http(
        operation: impl Into<String>,
        server: impl Into<String>,
        status: u16,
        body: &str,
    ) -> Self {
        Self::Http {
            operation: operation.into(),
            server: server.into(),
            status,
            body: truncate_chars(body.trim(), MAX_ERROR_BODY_CHARS),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Classifies a transport-level `reqwest` failure.
    #[must_use]
    pub fn from_transport(
        operation: &str,
        server: &str,
        timeout: Duration,
        error: &reqwest::Error,
    ) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                operation: operation.to_string(),
                server: server.to_string(),
                timeout,
            }
        } else {
            Self::Unreachable {
                operation: operation.to_string(),
                server: server.to_string(),
                message: error.to_string(),
            }
        }
    }

    /// Returns the HTTP status code, if this is a status error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for ERDDAP's "no matching results" 404 response.
    ///
    /// ERDDAP reports an empty search or subset as an HTTP 404 rather than
    /// an empty table.
    #[must_use]
    pub fn is_no_match(&self) -> bool {
        matches!(self, Self::Http { status: 404, body, .. } if body.contains("no matching results"))
    }
}

/// The metadata CSV for a dataset could not be parsed.
///
/// Only raised for defects that make the whole document unusable, such as a
/// missing header. Individual broken rows are skipped instead.
#[derive(Debug, Error)]
#[error("failed to parse metadata for dataset '{dataset_id}': {message}")]
pub struct MetadataParseError {
    /// Dataset the document belongs to (or the search query for search results).
    pub dataset_id: String,
    /// Description of the defect.
    pub message: String,
}

impl MetadataParseError {
    /// Creates a new parse error.
    pub fn new(dataset_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            message: message.into(),
        }
    }
}

/// A server registry entry was rejected.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The entry is missing a field or has the wrong type.
    #[error("invalid server entry #{index}: {message}")]
    InvalidEntry {
        /// Position of the entry in the source list.
        index: usize,
        /// What is wrong with it.
        message: String,
    },

    /// The registry source could not be read.
    #[error("failed to read server list: {path}")]
    Read {
        /// Path of the registry source.
        path: std::path::PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The registry source is not a JSON array.
    #[error("server list is not a JSON array of servers: {message}")]
    Format {
        /// Description of the defect.
        message: String,
    },
}

/// Truncates `text` to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_truncates_body() {
        let body = "x".repeat(2000);
        let err = UpstreamError::http("search", "https://example.org/erddap", 500, &body);
        let UpstreamError::Http { body, status, .. } = &err else {
            panic!("Expected Http error");
        };
        assert_eq!(*status, 500);
        assert_eq!(body.chars().count(), MAX_ERROR_BODY_CHARS + 3);
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[test]
    fn timeout_error_display() {
        let err = UpstreamError::Timeout {
            operation: "get_info".to_string(),
            server: "https://example.org/erddap".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "get_info timed out after 30s waiting for https://example.org/erddap"
        );
    }

    #[test]
    fn parse_error_names_dataset() {
        let err = MetadataParseError::new("jplMURSST41", "missing header row");
        assert!(err.to_string().contains("jplMURSST41"));
        assert!(err.to_string().contains("missing header row"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("°N°N°N", 2), "°N...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
