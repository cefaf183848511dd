//! MCP server implementation for the ERDDAP data catalog.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: `initialize` version check, then the client's
//!    `notifications/initialized` acknowledgment
//! 2. **Operation**: `tools/list` and `tools/call`
//! 3. **Shutdown**: EOF on stdin or a termination signal
//!
//! Protocol handling lives in [`Connection`], which knows nothing about the
//! transport. [`McpServer`] drives one connection over stdio.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, Reply, RequestId, SERVER_NAME,
};
use crate::mcp::session::Session;
use crate::mcp::tools::ToolRegistry;
use crate::mcp::transport::StdioTransport;

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCapabilities {
    /// `tools/list` is supported.
    pub list_tools: Map<String, Value>,
    /// `tools/call` is supported.
    pub call_tool: Map<String, Value>,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Protocol state for one client connection.
///
/// Each connection owns its own [`Session`]; the tool registry and the
/// upstream cache behind it are shared between connections.
pub struct Connection {
    session: Session,
    tools: Arc<ToolRegistry>,
}

impl Connection {
    /// Creates a connection awaiting its handshake.
    #[must_use]
    pub const fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            session: Session::new(),
            tools,
        }
    }

    /// The connection's session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Parses and handles one raw message line.
    ///
    /// Returns the reply to send, or `None` for notifications.
    pub async fn handle_line(&mut self, line: &str) -> Option<Reply> {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                debug!(code = error.error.code, "Rejecting malformed message");
                Some(Reply::Error(error))
            }
        }
    }

    /// Handles a parsed incoming message.
    pub async fn handle_message(&mut self, msg: IncomingMessage) -> Option<Reply> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
        }
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> Reply {
        debug!(id = %req.id, method = %req.method, "Handling request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "notifications/initialized" => {
                self.session.acknowledge();
                Ok(JsonRpcResponse::success(req.id.clone(), json!({})))
            }
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        response.into()
    }

    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        match notif.method.as_str() {
            "notifications/initialized" => self.session.acknowledge(),
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                "Client connected"
            );
        }

        let negotiated_version = self
            .session
            .handshake(&params.protocol_version)
            .map_err(|e| e.to_rpc_error(req.id.clone()))?;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_ready(&req.id)?;

        let result = json!({
            "tools": self.tools.list_tools(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_ready(&req.id)?;

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        let result = self.tools.invoke(&params.name, &params.arguments).await;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    fn require_ready(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        self.session
            .require_ready()
            .map_err(|e| e.to_rpc_error(id.clone()))
    }
}

/// The MCP server: one [`Connection`] over the stdio transport.
pub struct McpServer {
    connection: Connection,
    transport: StdioTransport,
}

impl McpServer {
    /// Creates a server that serves `tools` over stdio.
    #[must_use]
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            connection: Connection::new(tools),
            transport: StdioTransport::new(),
        }
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            info!("stdin closed, shutting down");
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        if let Some(reply) = self.connection.handle_line(&line).await {
            self.transport.write_reply(&reply).await?;
        }

        Ok(false)
    }
}
