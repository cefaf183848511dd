//! JSON-RPC 2.0 frames exchanged with an MCP client.
//!
//! A frame carrying an `id` is a request and gets exactly one reply, either a
//! [`JsonRpcResponse`] or a [`JsonRpcError`]. A frame without an `id` is a
//! notification and is never answered. Request IDs are strings or integers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// MCP protocol versions this server accepts, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Name reported in `serverInfo`.
pub const SERVER_NAME: &str = "erddap-mcp";

/// Identifier correlating a request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A frame that expects a reply.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol marker, `"2.0"`.
    pub jsonrpc: String,
    /// Echoed back in the reply.
    pub id: RequestId,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Checks the envelope fields serde cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns the reason the request is malformed.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.jsonrpc != "2.0" {
            return Err("jsonrpc field must be \"2.0\"");
        }
        if self.method.is_empty() {
            return Err("method field cannot be empty");
        }
        Ok(())
    }
}

/// A frame that expects no reply, such as `notifications/initialized`.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol marker, `"2.0"`.
    pub jsonrpc: String,
    /// Notification name.
    pub method: String,
    /// Notification parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// Successful reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// ID of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Wraps `result` as the reply to request `id`.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Error codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The line is not a JSON object.
    ParseError,
    /// The object is not a JSON-RPC 2.0 request, or is out of sequence.
    InvalidRequest,
    /// No such method.
    MethodNotFound,
    /// Bad or missing parameters, including an unsupported protocol version.
    InvalidParams,
    /// The server failed to build its reply.
    InternalError,
    /// A tool method arrived before the handshake completed.
    SessionNotReady,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::SessionNotReady => -32002,
        }
    }

    /// Message used when no more specific one is given.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::SessionNotReady => "Session not ready",
        }
    }
}

/// The `error` member of an error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric code, see [`ErrorCode`].
    pub code: i32,
    /// Human-readable explanation.
    pub message: String,
    /// Structured detail, e.g. the requested and supported versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Error with the code's default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Error with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Error reply.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// ID of the failed request; absent when it could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Wraps `error` as the reply to request `id`.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // JsonRpcErrorData contains String
    pub fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// -32700, sent without an ID.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, JsonRpcErrorData::from_code(ErrorCode::ParseError))
    }

    /// -32600.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, JsonRpcErrorData::from_code(ErrorCode::InvalidRequest))
    }

    /// -32601, naming the method.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// -32602.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// -32603.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// The reply to one request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    /// Successful response.
    Success(JsonRpcResponse),
    /// Error response.
    Error(JsonRpcError),
}

impl Reply {
    /// The error object, if the request failed.
    #[must_use]
    pub const fn error(&self) -> Option<&JsonRpcErrorData> {
        match self {
            Self::Success(_) => None,
            Self::Error(err) => Some(&err.error),
        }
    }
}

impl From<Result<JsonRpcResponse, JsonRpcError>> for Reply {
    fn from(result: Result<JsonRpcResponse, JsonRpcError>) -> Self {
        match result {
            Ok(resp) => Self::Success(resp),
            Err(err) => Self::Error(err),
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Expects a reply.
    Request(JsonRpcRequest),
    /// Expects none.
    Notification(JsonRpcNotification),
}

/// Decodes one line from the client.
///
/// # Errors
///
/// Returns a parse error for anything that is not a JSON object, and an
/// invalid-request error for objects that are not JSON-RPC 2.0 frames.
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;
    let obj = value.as_object().ok_or_else(JsonRpcError::parse_error)?;

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        debug!("Frame is missing jsonrpc \"2.0\"");
        return Err(JsonRpcError::invalid_request(None));
    }

    if !obj.contains_key("id") {
        return serde_json::from_value(value)
            .map(IncomingMessage::Notification)
            .map_err(|_| JsonRpcError::invalid_request(None));
    }

    let request: JsonRpcRequest =
        serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
    if let Err(reason) = request.validate() {
        debug!(id = %request.id, reason, "Rejecting request");
        return Err(JsonRpcError::invalid_request(Some(request.id)));
    }
    Ok(IncomingMessage::Request(request))
}
