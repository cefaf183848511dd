//! Integration tests for MCP protocol handling.
//!
//! These tests drive a [`Connection`] with raw JSON-RPC lines, covering the
//! handshake, the session gate on tool methods, error responses, and tool
//! calls against a canned ERDDAP server.

mod common;

use std::sync::Arc;

use serde_json::{json, Value};

use common::{CannedServer, Route, BUOY_DATA_CSV, BUOY_INFO_CSV, NO_MATCH_BODY, SEARCH_CSV};
use erddap_mcp::erddap::servers::fallback_servers;
use erddap_mcp::erddap::{ErddapClient, ServerRegistry, UpstreamSettings};
use erddap_mcp::mcp::protocol::{parse_message, IncomingMessage, RequestId};
use erddap_mcp::mcp::{Connection, SessionState, ToolContext, ToolRegistry};

fn connection(default_server: &str) -> Connection {
    let context = ToolContext::new(
        Arc::new(ServerRegistry::new(fallback_servers())),
        Arc::new(ErddapClient::new(UpstreamSettings::default())),
        default_server,
    );
    Connection::new(Arc::new(ToolRegistry::with_builtin_tools(context)))
}

async fn send(conn: &mut Connection, message: &Value) -> Option<Value> {
    conn.handle_line(&message.to_string())
        .await
        .map(|reply| serde_json::to_value(reply).unwrap())
}

fn initialize(id: i64, version: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": version,
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        }
    })
}

fn initialized() -> Value {
    json!({"jsonrpc": "2.0", "method": "notifications/initialized"})
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

async fn ready_connection(default_server: &str) -> Connection {
    let mut conn = connection(default_server);
    let reply = send(&mut conn, &initialize(1, "2025-06-18")).await.unwrap();
    assert!(reply.get("result").is_some(), "handshake failed: {reply}");
    assert!(send(&mut conn, &initialized()).await.is_none());
    assert_eq!(conn.session().state(), SessionState::Ready);
    conn
}

fn tool_text(reply: &Value) -> &str {
    reply["result"]["content"][0]["text"].as_str().unwrap()
}

fn is_tool_error(reply: &Value) -> bool {
    reply["result"]["isError"].as_bool().unwrap_or(false)
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = initialize(1, "2024-11-05").to_string();

    let result = parse_message(&json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let result = parse_message(&initialized().to_string());

    if let Ok(IncomingMessage::Notification(notif)) = result {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_full_handshake_sequence() {
    let mut conn = connection("https://example.org/erddap");

    let reply = send(&mut conn, &initialize(1, "2025-06-18")).await.unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(reply["result"]["serverInfo"]["name"], "erddap-mcp");
    assert_eq!(
        reply["result"]["capabilities"],
        json!({"tools": {"listTools": {}, "callTool": {}}})
    );
    assert_eq!(conn.session().state(), SessionState::Initialized);

    assert!(send(&mut conn, &initialized()).await.is_none());
    assert_eq!(conn.session().state(), SessionState::Ready);

    let reply = send(
        &mut conn,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await
    .unwrap();
    let names: Vec<&str> = reply["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        ["list_servers", "search_datasets", "get_dataset_info", "to_pandas"]
    );
    for tool in reply["result"]["tools"].as_array().unwrap() {
        assert_eq!(tool["inputSchema"]["type"], "object");
    }
}

#[tokio::test]
async fn test_older_version_is_echoed() {
    let mut conn = connection("https://example.org/erddap");
    let reply = send(&mut conn, &initialize(1, "2024-11-05")).await.unwrap();
    assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
}

#[tokio::test]
async fn test_tools_rejected_before_ready() {
    let mut conn = connection("https://example.org/erddap");

    let list = json!({"jsonrpc": "2.0", "id": 5, "method": "tools/list"});
    let reply = send(&mut conn, &list).await.unwrap();
    assert_eq!(reply["error"]["code"], -32002);
    assert_eq!(reply["error"]["data"]["actual"], "uninitialized");

    send(&mut conn, &initialize(6, "2025-03-26")).await.unwrap();
    let reply = send(&mut conn, &call(7, "list_servers", json!({}))).await.unwrap();
    assert_eq!(reply["error"]["code"], -32002);
    assert_eq!(reply["error"]["data"]["actual"], "initialized");

    send(&mut conn, &initialized()).await;
    let reply = send(&mut conn, &list).await.unwrap();
    assert!(reply["result"]["tools"].is_array());
}

#[tokio::test]
async fn test_tool_call_succeeds_once_ready() {
    let mut conn = connection("https://example.org/erddap");
    let request = call(3, "list_servers", json!({}));

    let reply = send(&mut conn, &request).await.unwrap();
    assert_eq!(reply["error"]["code"], -32002);
    assert_eq!(reply["error"]["data"]["expected"], "ready");
    assert_eq!(reply["error"]["data"]["actual"], "uninitialized");
    assert!(reply.get("result").is_none());

    send(&mut conn, &initialize(4, "2025-06-18")).await.unwrap();
    send(&mut conn, &initialized()).await;

    let reply = send(&mut conn, &request).await.unwrap();
    assert!(reply.get("error").is_none(), "unexpected error: {reply}");
    assert_eq!(reply["id"], 3);
    assert!(!is_tool_error(&reply));
    assert!(tool_text(&reply).contains("[CSWC]"));
}

#[tokio::test]
async fn test_initialized_sent_as_request() {
    let mut conn = connection("https://example.org/erddap");
    send(&mut conn, &initialize(1, "2025-06-18")).await.unwrap();

    let reply = send(
        &mut conn,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "notifications/initialized"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"], json!({}));
    assert_eq!(conn.session().state(), SessionState::Ready);
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let mut conn = connection("https://example.org/erddap");
    let reply = send(&mut conn, &initialize(1, "2023-01-01")).await.unwrap();

    assert_eq!(reply["error"]["code"], -32602);
    assert_eq!(reply["error"]["data"]["requested"], "2023-01-01");
    let supported = reply["error"]["data"]["supported"].as_array().unwrap();
    assert!(supported.contains(&json!("2025-06-18")));
    assert_eq!(conn.session().state(), SessionState::Uninitialized);

    // The client may retry with a supported version.
    let reply = send(&mut conn, &initialize(2, "2025-03-26")).await.unwrap();
    assert_eq!(reply["result"]["protocolVersion"], "2025-03-26");
}

#[tokio::test]
async fn test_repeated_initialize_is_invalid() {
    let mut conn = ready_connection("https://example.org/erddap").await;
    let reply = send(&mut conn, &initialize(9, "2025-06-18")).await.unwrap();
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(conn.session().state(), SessionState::Ready);
}

#[tokio::test]
async fn test_missing_initialize_params() {
    let mut conn = connection("https://example.org/erddap");
    let reply = send(
        &mut conn,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32602);
}

#[tokio::test]
async fn test_ping_in_any_state() {
    let mut conn = connection("https://example.org/erddap");
    let reply = send(&mut conn, &json!({"jsonrpc": "2.0", "id": "p", "method": "ping"}))
        .await
        .unwrap();
    assert_eq!(reply["id"], "p");
    assert_eq!(reply["result"], json!({}));
}

// =============================================================================
// Error Response Tests
// =============================================================================

#[tokio::test]
async fn test_unknown_method() {
    let mut conn = ready_connection("https://example.org/erddap").await;
    let reply = send(
        &mut conn,
        &json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Method not found: resources/list");
}

#[tokio::test]
async fn test_malformed_lines() {
    let mut conn = connection("https://example.org/erddap");

    let reply = conn.handle_line("not valid json").await.unwrap();
    assert_eq!(reply.error().unwrap().code, -32700);

    let reply = conn.handle_line(r#"{"id": 1, "method": "ping"}"#).await.unwrap();
    assert_eq!(reply.error().unwrap().code, -32600);
}

#[tokio::test]
async fn test_unknown_tool_is_error_result() {
    let mut conn = ready_connection("https://example.org/erddap").await;
    let reply = send(&mut conn, &call(4, "delete_dataset", json!({}))).await.unwrap();

    assert!(reply.get("error").is_none());
    assert!(is_tool_error(&reply));
    assert!(tool_text(&reply).starts_with("Unknown tool: delete_dataset"));
}

#[tokio::test]
async fn test_invalid_arguments_are_error_results() {
    let mut conn = ready_connection("https://example.org/erddap").await;

    let reply = send(&mut conn, &call(5, "search_datasets", json!({}))).await.unwrap();
    assert!(is_tool_error(&reply));
    assert!(tool_text(&reply).contains("missing required argument 'query'"));

    let reply = send(
        &mut conn,
        &call(6, "get_dataset_info", json!({"dataset_id": ["a"]})),
    )
    .await
    .unwrap();
    assert!(is_tool_error(&reply));
    assert!(tool_text(&reply).contains("'dataset_id' must be of type string"));
}

// =============================================================================
// Tool Call Tests
// =============================================================================

#[tokio::test]
async fn test_list_servers_without_arguments() {
    let mut conn = ready_connection("https://example.org/erddap").await;
    let reply = send(
        &mut conn,
        &json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {"name": "list_servers"}}),
    )
    .await
    .unwrap();

    assert!(!is_tool_error(&reply));
    let text = tool_text(&reply);
    assert!(text.contains("Public servers (1)"));
    assert!(text.contains("Private servers (1)"));
    assert!(text.contains("[CSWC]"));
}

#[tokio::test]
async fn test_search_against_canned_server() {
    let server = CannedServer::start(vec![Route::ok("/erddap/search/index.csv", SEARCH_CSV)]).await;
    let mut conn = ready_connection(&server.base_url).await;

    let reply = send(
        &mut conn,
        &call(10, "search_datasets", json!({"query": "sea surface temperature"})),
    )
    .await
    .unwrap();

    assert!(!is_tool_error(&reply), "{reply}");
    let text = tool_text(&reply);
    assert!(text.starts_with("Found 2 datasets matching 'sea surface temperature'"));
    assert!(text.contains("**jplMURSST41**: Multi-scale Ultra-high Resolution (MUR) SST Analysis"));
    assert!(text.contains("**cwwcNDBCMet**"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("page=1&itemsPerPage=100&searchFor=sea%20surface%20temperature"));
}

#[tokio::test]
async fn test_search_without_hits_is_not_an_error() {
    let server =
        CannedServer::start(vec![Route::status("/erddap/search", 404, NO_MATCH_BODY)]).await;
    let mut conn = ready_connection(&server.base_url).await;

    let reply = send(&mut conn, &call(11, "search_datasets", json!({"query": "unicorns"})))
        .await
        .unwrap();
    assert!(!is_tool_error(&reply));
    assert!(tool_text(&reply).starts_with("No datasets found matching 'unicorns'"));
}

#[tokio::test]
async fn test_dataset_info_against_canned_server() {
    let server = CannedServer::start(vec![Route::ok(
        "/erddap/info/cwwcNDBCMet/index.csv",
        BUOY_INFO_CSV,
    )])
    .await;
    let mut conn = ready_connection("https://example.org/erddap").await;

    // Explicit server_url with a trailing slash.
    let url = format!("{}/", server.base_url);
    let reply = send(
        &mut conn,
        &call(12, "get_dataset_info", json!({"dataset_id": "cwwcNDBCMet", "server_url": url})),
    )
    .await
    .unwrap();

    assert!(!is_tool_error(&reply), "{reply}");
    let text = tool_text(&reply);
    assert!(text.contains("**Title:** NDBC Standard Meteorological Buoy Data"));
    assert!(text.contains("**Institution:** NOAA NDBC, NOAA NMFS SWFSC ERD"));
    assert!(text.contains("1970-02-26T20:00:00Z to 2026-10-18T12:50:00Z"));
    assert!(text.contains("Longitude: -177.75 to 179.02"));
    assert!(text.contains("• wtmp [float]: SST (degree_C)"));
}

#[tokio::test]
async fn test_preview_against_canned_server() {
    let server = CannedServer::start(vec![Route::ok(
        "/erddap/tabledap/cwwcNDBCMet.csv",
        BUOY_DATA_CSV,
    )])
    .await;
    let mut conn = ready_connection(&server.base_url).await;

    let reply = send(
        &mut conn,
        &call(
            13,
            "to_pandas",
            json!({
                "dataset_id": "cwwcNDBCMet",
                "variables": ["station", "time", "wtmp"],
                "constraints": {"time>=": "2020-01-01", "station=": "46012"},
                "protocol": "tabular"
            }),
        ),
    )
    .await
    .unwrap();

    assert!(!is_tool_error(&reply), "{reply}");
    let text = tool_text(&reply);
    assert!(text.contains("**Shape:** 4 rows × 3 columns"));
    assert!(text.contains("wtmp (degree_C)"));
    assert!(text.contains("Summary statistics (sample only)"));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let decoded = urlencoding::decode(&requests[0]).unwrap().into_owned();
    assert!(decoded.starts_with("/erddap/tabledap/cwwcNDBCMet.csv?station,time,wtmp&"));
    assert!(decoded.contains("station=\"46012\""));
    assert!(decoded.contains("time>=2020-01-01"));
}

#[tokio::test]
async fn test_upstream_failure_is_error_result() {
    let server = CannedServer::start(vec![Route::status(
        "/erddap/info/",
        500,
        "Internal Server Error: dataset offline",
    )])
    .await;
    let mut conn = ready_connection(&server.base_url).await;

    let reply = send(&mut conn, &call(14, "get_dataset_info", json!({"dataset_id": "ds"})))
        .await
        .unwrap();
    assert!(is_tool_error(&reply));
    let text = tool_text(&reply);
    assert!(text.starts_with("Error in get_dataset_info:"));
    assert!(text.contains("HTTP 500"));
    assert!(text.contains("dataset offline"));
}
