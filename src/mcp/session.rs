//! Per-connection MCP session lifecycle.
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──notifications/initialized──▶ Ready
//! ```
//!
//! Transitions only move forward. There is no terminal state; the session
//! ends when the connection closes.

use std::fmt;

use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::mcp::protocol::{
    ErrorCode, JsonRpcError, JsonRpcErrorData, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the `initialize` handshake.
    Uninitialized,
    /// Handshake done, waiting for the client's `initialized` notification.
    Initialized,
    /// Ready for tool calls.
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Ready => "ready",
        })
    }
}

/// Lifecycle violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A method that needs a ready session arrived too early.
    #[error("session not ready: expected state '{expected}', but session is '{actual}'")]
    NotReady {
        /// Required state.
        expected: SessionState,
        /// Current state.
        actual: SessionState,
    },

    /// The client asked for a protocol version this server does not speak.
    #[error("unsupported protocol version '{requested}'; supported versions: {}", .supported.join(", "))]
    VersionMismatch {
        /// Version requested by the client.
        requested: String,
        /// Versions this server supports.
        supported: Vec<String>,
    },

    /// `initialize` was sent twice on the same connection.
    #[error("session already initialised")]
    AlreadyInitialized,
}

impl SessionError {
    /// Converts the violation into a JSON-RPC error object.
    #[must_use]
    pub fn to_rpc_error(&self, id: RequestId) -> JsonRpcError {
        let data = match self {
            Self::NotReady { expected, actual } => JsonRpcErrorData::with_message(
                ErrorCode::SessionNotReady,
                self.to_string(),
            )
            .with_data(json!({
                "expected": expected.to_string(),
                "actual": actual.to_string(),
            })),
            Self::VersionMismatch {
                requested,
                supported,
            } => JsonRpcErrorData::with_message(ErrorCode::InvalidParams, self.to_string())
                .with_data(json!({
                    "requested": requested,
                    "supported": supported,
                })),
            Self::AlreadyInitialized => {
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, self.to_string())
            }
        };
        JsonRpcError::new(Some(id), data)
    }
}

/// Lifecycle state of one client connection.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    protocol_version: Option<String>,
}

impl Session {
    /// Creates a session awaiting its handshake.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            protocol_version: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Negotiated protocol version, once the handshake succeeded.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Performs the `initialize` handshake.
    ///
    /// The requested version is accepted only if it is supported; it is
    /// never downgraded to a different version.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyInitialized`] on a repeated handshake
    /// and [`SessionError::VersionMismatch`] for an unsupported version.
    pub fn handshake(&mut self, requested: &str) -> Result<&str, SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::AlreadyInitialized);
        }

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&requested) {
            return Err(SessionError::VersionMismatch {
                requested: requested.to_string(),
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }

        info!(protocol_version = requested, "Session initialised");
        self.state = SessionState::Initialized;
        Ok(self.protocol_version.insert(requested.to_string()).as_str())
    }

    /// Handles the client's post-handshake acknowledgment.
    ///
    /// Ignored (with a warning) unless the handshake has completed and the
    /// session is not yet ready.
    pub fn acknowledge(&mut self) {
        if self.state == SessionState::Initialized {
            info!("Session ready");
            self.state = SessionState::Ready;
        } else {
            warn!(state = %self.state, "Ignoring unexpected initialized notification");
        }
    }

    /// Ensures tool methods may run.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] unless the session is ready.
    pub fn require_ready(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(SessionError::NotReady {
                expected: SessionState::Ready,
                actual: self.state,
            })
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
