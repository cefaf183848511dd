//! Tool catalog and dispatcher.
//!
//! The catalog is closed: every tool is a [`ToolKind`] variant whose
//! definition carries its name, description and input schema. The
//! [`ToolRegistry`] is populated once at start-up and only read afterwards.
//!
//! [`ToolRegistry::invoke`] never fails. Unknown tools, invalid arguments
//! and upstream failures all come back as a [`ToolCallResult`] with
//! `isError` set, so the protocol layer always has a result to send.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::erddap::{DataProtocol, MetadataParseError, UpstreamError};
use crate::mcp::handlers::{self, ToolContext};

/// Errors raised while invoking a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with this name is registered.
    #[error("Unknown tool: {name}")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// The arguments do not match the tool's input schema.
    #[error("invalid arguments: {message}")]
    Validation {
        /// What is wrong with the arguments.
        message: String,
    },

    /// A tool with this name is already registered.
    #[error("tool '{name}' is already registered")]
    DuplicateTool {
        /// The duplicated name.
        name: String,
    },

    /// The upstream ERDDAP server failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// An upstream document could not be parsed.
    #[error(transparent)]
    Parse(#[from] MetadataParseError),
}

impl ToolError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// A short suggestion on what to do next, if there is one.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownTool { .. } => Some("Use tools/list to see the available tools."),
            Self::Validation { .. } => Some("Check the tool's input schema and try again."),
            Self::Upstream(UpstreamError::Timeout { .. }) => Some(
                "The ERDDAP server may be busy. Try again later or request less data \
                 with tighter constraints.",
            ),
            Self::Upstream(UpstreamError::Unreachable { .. }) => {
                Some("Check the server URL, or pick another server from list_servers.")
            }
            Self::Upstream(UpstreamError::Http { status: 404, .. }) => {
                Some("Check the dataset ID, for example with search_datasets.")
            }
            Self::Upstream(UpstreamError::InvalidQuery { .. }) => {
                Some("Check the variable names and constraints with get_dataset_info.")
            }
            _ => None,
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the concatenated text of all content items.
    #[must_use]
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .map(|c| match c {
                ToolContent::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The closed set of tools this server offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// List known ERDDAP servers.
    ListServers,
    /// Full-text dataset search.
    SearchDatasets,
    /// Dataset metadata summary.
    GetDatasetInfo,
    /// Bounded data preview with statistics.
    ToPandas,
}

impl ToolKind {
    /// Every tool, in catalog order.
    pub const ALL: [Self; 4] = [
        Self::ListServers,
        Self::SearchDatasets,
        Self::GetDatasetInfo,
        Self::ToPandas,
    ];

    /// The tool's protocol name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListServers => "list_servers",
            Self::SearchDatasets => "search_datasets",
            Self::GetDatasetInfo => "get_dataset_info",
            Self::ToPandas => "to_pandas",
        }
    }

    /// Builds the tool's definition.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let server_url = json!({
            "type": "string",
            "description": "ERDDAP server base URL or a short name from list_servers \
                            (default: the configured default server)"
        });
        let protocol = json!({
            "type": "string",
            "enum": DataProtocol::NAMES,
            "description": "Data protocol: 'tabledap' for tabular data, 'griddap' for gridded data (default: tabledap)"
        });

        let (description, input_schema) = match self {
            Self::ListServers => (
                "List the known ERDDAP servers, grouped into public and private servers.",
                json!({
                    "type": "object",
                    "properties": {}
                }),
            ),
            Self::SearchDatasets => (
                "Search for datasets on an ERDDAP server. Returns dataset IDs, titles and \
                 short summaries.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search terms, e.g. 'sea surface temperature'"
                        },
                        "server_url": server_url,
                        "protocol": protocol
                    },
                    "required": ["query"]
                }),
            ),
            Self::GetDatasetInfo => (
                "Get metadata for a dataset: title, summary, institution, time and \
                 geographic coverage, and its variables with units.",
                json!({
                    "type": "object",
                    "properties": {
                        "dataset_id": {
                            "type": "string",
                            "description": "ERDDAP dataset ID"
                        },
                        "server_url": server_url,
                        "protocol": protocol
                    },
                    "required": ["dataset_id"]
                }),
            ),
            Self::ToPandas => (
                "Download a bounded sample of a dataset and preview it: shape, columns, \
                 the first rows and summary statistics (count, mean, std, min, max) per \
                 numeric column. Statistics describe the sample only, not the whole dataset.",
                json!({
                    "type": "object",
                    "properties": {
                        "dataset_id": {
                            "type": "string",
                            "description": "ERDDAP dataset ID"
                        },
                        "variables": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Variables to download (default: all)"
                        },
                        "constraints": {
                            "type": "object",
                            "description": "Constraints keyed by variable and operator, \
                                            e.g. {\"time>=\": \"2020-01-01\", \"latitude>\": 30}. \
                                            For griddap, use 'dim>=', 'dim<=' and 'dim_step'."
                        },
                        "server_url": server_url,
                        "protocol": protocol
                    },
                    "required": ["dataset_id"]
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: Some(description.to_string()),
            input_schema,
            kind: self,
        }
    }
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// Handler bound to this tool.
    #[serde(skip)]
    pub kind: ToolKind,
}

/// Registry of callable tools.
pub struct ToolRegistry {
    tools: IndexMap<String, ToolDefinition>,
    context: ToolContext,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(context: ToolContext) -> Self {
        Self {
            tools: IndexMap::new(),
            context,
        }
    }

    /// Creates a registry holding the full tool catalog.
    #[must_use]
    pub fn with_builtin_tools(context: ToolContext) -> Self {
        let mut registry = Self::new(context);
        for kind in ToolKind::ALL {
            if let Err(e) = registry.register(kind.definition()) {
                warn!(error = %e, "Skipping tool registration");
            }
        }
        registry
    }

    /// Adds a tool. Only called while the server is being set up.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        if self.tools.contains_key(&definition.name) {
            return Err(ToolError::DuplicateTool {
                name: definition.name,
            });
        }
        self.tools.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// All registered tools in registration order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        self.tools.values().collect()
    }

    /// Invokes a tool by exact name.
    ///
    /// Always returns a result; failures are reported with `isError` set.
    pub async fn invoke(&self, name: &str, arguments: &Value) -> ToolCallResult {
        info!(tool = name, "Invoking tool");

        match self.try_invoke(name, arguments).await {
            Ok(text) => ToolCallResult::text(text),
            Err(err) => {
                warn!(tool = name, error = %err, "Tool call failed");
                ToolCallResult::error(describe_failure(name, &err))
            }
        }
    }

    async fn try_invoke(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        let definition = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;

        let args = validate_arguments(&definition.input_schema, arguments)?;
        let ctx = &self.context;

        match definition.kind {
            ToolKind::ListServers => Ok(handlers::list_servers(ctx)),
            ToolKind::SearchDatasets => handlers::search_datasets(ctx, args).await,
            ToolKind::GetDatasetInfo => handlers::get_dataset_info(ctx, args).await,
            ToolKind::ToPandas => handlers::to_pandas(ctx, args).await,
        }
    }
}

fn describe_failure(name: &str, err: &ToolError) -> String {
    let mut message = match err {
        ToolError::UnknownTool { .. } => err.to_string(),
        _ => format!("Error in {name}: {err}"),
    };
    if let Some(hint) = err.hint() {
        message.push('\n');
        message.push_str(hint);
    }
    message
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn check_value(key: &str, schema: &Value, value: &Value) -> Result<(), ToolError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(ToolError::validation(format!(
                "'{key}' must be of type {expected}"
            )));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return Err(ToolError::validation(format!(
                "'{key}' must be one of {}",
                options.join(", ")
            )));
        }
    }

    if let (Some(items), Some(elements)) = (schema.get("items"), value.as_array()) {
        for (index, element) in elements.iter().enumerate() {
            check_value(&format!("{key}[{index}]"), items, element)?;
        }
    }

    Ok(())
}

/// Checks `arguments` against a tool's input schema.
///
/// Required keys must be present and non-null, and present keys must match
/// their declared type. Keys the schema does not mention are ignored.
/// Missing or `null` arguments are treated as an empty object.
///
/// # Errors
///
/// Returns [`ToolError::Validation`] describing the first mismatch.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<Map<String, Value>, ToolError> {
    let args = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(ToolError::validation(format!(
                "arguments must be an object, got {other}"
            )))
        }
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str);
    for key in required {
        if args.get(key).map_or(true, Value::is_null) {
            return Err(ToolError::validation(format!(
                "missing required argument '{key}'"
            )));
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, property) in properties {
            match args.get(key) {
                None | Some(Value::Null) => {}
                Some(value) => check_value(key, property, value)?,
            }
        }
    }

    Ok(args)
}
