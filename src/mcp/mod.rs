//! Model Context Protocol (MCP) server implementation.
//!
//! Exposes the ERDDAP catalog to AI assistants as four tools over the stdio
//! transport, using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//!   stdin ──▶ StdioTransport ──▶ Connection ──▶ ToolRegistry ──▶ handlers ──▶ ErddapClient
//!                                    │
//!                                 Session
//!                    (Uninitialized ▶ Initialized ▶ Ready)
//! ```
//!
//! # Protocol Version
//!
//! The server accepts the versions in [`SUPPORTED_PROTOCOL_VERSIONS`] and
//! answers with the version the client asked for.

pub mod handlers;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;

pub use handlers::{PreviewSettings, ToolContext};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, Reply, SUPPORTED_PROTOCOL_VERSIONS,
};
pub use server::{Connection, McpServer};
pub use session::{Session, SessionError, SessionState};
pub use tools::{ToolCallResult, ToolError, ToolKind, ToolRegistry};
pub use transport::StdioTransport;
