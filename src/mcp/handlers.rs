//! Tool handlers and their text rendering.
//!
//! Each handler takes already-validated arguments, talks to the upstream
//! through the shared [`ErddapClient`], and renders a plain-text answer
//! meant to be read by an assistant.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::erddap::error::truncate_chars;
use crate::erddap::metadata::VariableKind;
use crate::erddap::{
    parse_dataset_metadata, parse_search_results, DataPreview, DataProtocol, DatasetMetadata,
    DatasetSummary, ErddapClient, PreviewLimits, ServerDescriptor, ServerRegistry,
    UpstreamHandle,
};
use crate::mcp::tools::ToolError;

/// Search results shown in full before the "... and N more" tail.
const SEARCH_DISPLAY_LIMIT: usize = 10;
const SEARCH_SUMMARY_CHARS: usize = 100;
const INFO_SUMMARY_CHARS: usize = 300;
const INFO_VARIABLE_LIMIT: usize = 15;

/// Preview sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Download and column limits.
    pub limits: PreviewLimits,
    /// Rows printed in the preview table.
    pub display_rows: usize,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            limits: PreviewLimits::default(),
            display_rows: 5,
        }
    }
}

/// State shared by every tool handler.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Known servers.
    pub servers: Arc<ServerRegistry>,
    /// Upstream handle cache.
    pub client: Arc<ErddapClient>,
    /// Server used when a call names none.
    pub default_server_url: String,
    /// Preview sizing.
    pub preview: PreviewSettings,
}

impl ToolContext {
    /// Creates a context with default preview settings.
    #[must_use]
    pub fn new(
        servers: Arc<ServerRegistry>,
        client: Arc<ErddapClient>,
        default_server_url: impl Into<String>,
    ) -> Self {
        Self {
            servers,
            client,
            default_server_url: normalise_url(&default_server_url.into()),
            preview: PreviewSettings::default(),
        }
    }

    /// Replaces the preview settings.
    #[must_use]
    pub const fn with_preview(mut self, preview: PreviewSettings) -> Self {
        self.preview = preview;
        self
    }

    /// Resolves a `server_url` argument to a base URL.
    ///
    /// Accepts an absolute `http(s)` URL or a registered short name; `None`
    /// selects the default server.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown short name.
    pub fn server_url(&self, requested: Option<&str>) -> Result<String, ToolError> {
        let Some(requested) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(self.default_server_url.clone());
        };

        if requested.starts_with("http://") || requested.starts_with("https://") {
            return Ok(normalise_url(requested));
        }

        self.servers
            .find_by_short_name(requested)
            .map(|server| normalise_url(&server.base_url))
            .ok_or_else(|| {
                ToolError::validation(format!(
                    "unknown server '{requested}'; pass a URL or a short name from list_servers"
                ))
            })
    }

    fn handle(
        &self,
        server_url: Option<&str>,
        protocol: Option<&str>,
    ) -> Result<Arc<UpstreamHandle>, ToolError> {
        let url = self.server_url(server_url)?;
        let protocol = match protocol {
            Some(p) => p.parse::<DataProtocol>().map_err(ToolError::validation)?,
            None => DataProtocol::default(),
        };
        Ok(self.client.resolve(&url, protocol)?)
    }
}

fn normalise_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::validation(e.to_string()))
}

fn require_non_empty<'a>(name: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ToolError::validation(format!("'{name}' must not be empty")));
    }
    Ok(value)
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    server_url: Option<String>,
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetArgs {
    dataset_id: String,
    server_url: Option<String>,
    protocol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreviewArgs {
    dataset_id: String,
    #[serde(default)]
    variables: Option<Vec<String>>,
    #[serde(default)]
    constraints: Option<Map<String, Value>>,
    server_url: Option<String>,
    protocol: Option<String>,
}

/// Lists the registry grouped into public and private servers.
#[must_use]
pub fn list_servers(ctx: &ToolContext) -> String {
    info!(servers = ctx.servers.len(), "Listing servers");
    let (public, private) = ctx.servers.list_servers();
    render_server_list(&public, &private, &ctx.default_server_url)
}

/// Searches a server for datasets.
///
/// # Errors
///
/// Returns an error for invalid arguments or upstream failures. An upstream
/// "no matching results" answer is an empty result, not an error.
pub async fn search_datasets(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let args: SearchArgs = parse_args(args)?;
    let query = require_non_empty("query", &args.query)?;
    let handle = ctx.handle(args.server_url.as_deref(), args.protocol.as_deref())?;
    info!(server = handle.base_url(), query, "Searching datasets");

    let results = match handle.search(query).await {
        Ok(csv) => parse_search_results(&csv, query)?,
        Err(e) if e.is_no_match() => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    Ok(render_search_results(query, handle.base_url(), &results))
}

/// Fetches and summarises a dataset's metadata.
///
/// # Errors
///
/// Returns an error for invalid arguments, upstream failures, or an
/// unparseable metadata table.
pub async fn get_dataset_info(
    ctx: &ToolContext,
    args: Map<String, Value>,
) -> Result<String, ToolError> {
    let args: DatasetArgs = parse_args(args)?;
    let dataset_id = require_non_empty("dataset_id", &args.dataset_id)?;
    let handle = ctx.handle(args.server_url.as_deref(), args.protocol.as_deref())?;
    info!(server = handle.base_url(), dataset_id, "Fetching dataset info");

    let csv = handle.get_info(dataset_id).await?;
    let metadata = parse_dataset_metadata(&csv, dataset_id)?;
    Ok(render_dataset_info(&metadata))
}

/// Downloads a bounded sample and renders it with statistics.
///
/// # Errors
///
/// Returns an error for invalid arguments, constraints that cannot be
/// expressed as a query, or upstream failures.
pub async fn to_pandas(ctx: &ToolContext, args: Map<String, Value>) -> Result<String, ToolError> {
    let args: PreviewArgs = parse_args(args)?;
    let dataset_id = require_non_empty("dataset_id", &args.dataset_id)?;
    let handle = ctx.handle(args.server_url.as_deref(), args.protocol.as_deref())?;
    let variables = args.variables.unwrap_or_default();
    let constraints = args.constraints.unwrap_or_default();
    info!(
        server = handle.base_url(),
        protocol = %handle.protocol(),
        dataset_id,
        variables = variables.len(),
        constraints = constraints.len(),
        "Downloading preview"
    );

    let preview = handle
        .preview(dataset_id, &variables, &constraints, ctx.preview.limits)
        .await?;
    Ok(render_preview(&preview, &ctx.preview))
}

fn render_server_list(
    public: &[&ServerDescriptor],
    private: &[&ServerDescriptor],
    default_server_url: &str,
) -> String {
    let mut out = format!(
        "**Known ERDDAP servers ({})**\n",
        public.len() + private.len()
    );

    for (heading, group) in [("Public servers", public), ("Private servers", private)] {
        if group.is_empty() {
            continue;
        }
        let _ = write!(out, "\n**{heading} ({}):**\n", group.len());
        for server in group {
            let _ = writeln!(
                out,
                "• {} [{}]: {}",
                server.name, server.short_name, server.base_url
            );
        }
    }

    let _ = write!(
        out,
        "\nDefault server: {default_server_url}\n\
         Pass a URL or a short name as 'server_url' to use another server."
    );
    out
}

fn render_search_results(query: &str, server: &str, results: &[DatasetSummary]) -> String {
    if results.is_empty() {
        return format!("No datasets found matching '{query}' on {server}");
    }

    let mut out = format!(
        "Found {} datasets matching '{query}' on {server}:\n\n",
        results.len()
    );
    for dataset in results.iter().take(SEARCH_DISPLAY_LIMIT) {
        let _ = writeln!(out, "• **{}**: {}", dataset.dataset_id, dataset.title);
        if !dataset.summary.is_empty() {
            let _ = writeln!(
                out,
                "  {}",
                truncate_chars(&dataset.summary, SEARCH_SUMMARY_CHARS)
            );
        }
        out.push('\n');
    }
    if results.len() > SEARCH_DISPLAY_LIMIT {
        let _ = writeln!(
            out,
            "... and {} more datasets",
            results.len() - SEARCH_DISPLAY_LIMIT
        );
    }
    out.trim_end().to_string()
}

fn render_dataset_info(metadata: &DatasetMetadata) -> String {
    let mut out = format!("**Dataset: {}**\n\n", metadata.dataset_id);

    let fields = [
        ("Title", "title"),
        ("Institution", "institution"),
        ("Creator", "creator_name"),
        ("Publisher", "publisher_name"),
        ("Platform", "platform"),
        ("Instrument", "instrument"),
    ];
    for (label, attribute) in fields {
        if let Some(value) = metadata.global(attribute) {
            let _ = writeln!(out, "**{label}:** {value}");
        }
        if attribute == "title" {
            if let Some(summary) = metadata.global("summary") {
                let _ = writeln!(
                    out,
                    "**Summary:** {}",
                    truncate_chars(summary, INFO_SUMMARY_CHARS)
                );
            }
        }
    }

    let start = metadata.global("time_coverage_start");
    let end = metadata.global("time_coverage_end");
    if start.is_some() || end.is_some() {
        let _ = write!(
            out,
            "\n**Time Coverage:** {} to {}\n",
            start.unwrap_or("?"),
            end.unwrap_or("?")
        );
    }

    let bounds = [
        ("Latitude", "geospatial_lat_min", "geospatial_lat_max"),
        ("Longitude", "geospatial_lon_min", "geospatial_lon_max"),
    ];
    let mut geo = String::new();
    for (label, min, max) in bounds {
        if let (Some(min), Some(max)) = (metadata.global(min), metadata.global(max)) {
            let _ = writeln!(geo, "  {label}: {min} to {max}");
        }
    }
    if !geo.is_empty() {
        let _ = write!(out, "\n**Geographic Coverage:**\n{geo}");
    }

    let dimensions: Vec<&str> = metadata.dimensions().map(|d| d.name.as_str()).collect();
    if !dimensions.is_empty() {
        let _ = write!(out, "\n**Dimensions:** {}\n", dimensions.join(", "));
    }

    let total = metadata.variables.len();
    if total > 0 {
        let _ = write!(out, "\n**Variables ({total}):**\n");
        for variable in metadata.variables.values().take(INFO_VARIABLE_LIMIT) {
            let _ = write!(out, "  • {}", variable.name);
            if let Some(data_type) = &variable.data_type {
                let _ = write!(out, " [{data_type}]");
            }
            if variable.kind == VariableKind::Dimension {
                out.push_str(" (dimension)");
            }
            if let Some(long_name) = variable.attribute("long_name") {
                let _ = write!(out, ": {long_name}");
            }
            match variable.attribute("units") {
                Some(units) if !units.is_empty() && units != "1" => {
                    let _ = write!(out, " ({units})");
                }
                _ => {}
            }
            out.push('\n');
        }
        if total > INFO_VARIABLE_LIMIT {
            let _ = writeln!(out, "  ... and {} more variables", total - INFO_VARIABLE_LIMIT);
        }
    }

    out.trim_end().to_string()
}

fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if value != 0.0 && !(1e-3..1e7).contains(&magnitude) {
        format!("{value:.4e}")
    } else {
        let fixed = format!("{value:.4}");
        fixed
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let format_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![format_row(header)];
    lines.extend(rows.iter().map(|row| format_row(row.as_slice())));
    lines.join("\n")
}

fn render_preview(preview: &DataPreview, settings: &PreviewSettings) -> String {
    let mut out = format!("**Data from {}**\n\n", preview.dataset_id);

    let _ = write!(
        out,
        "**Shape:** {} rows × {} columns",
        preview.rows.len(),
        preview.columns.len()
    );
    if preview.truncated {
        let _ = write!(
            out,
            " (sample capped at {} rows; the dataset has more)",
            settings.limits.max_rows
        );
    }
    out.push('\n');
    if preview.omitted_columns > 0 {
        let _ = writeln!(
            out,
            "**Omitted columns:** {} (limit is {} columns; request fewer variables to see them)",
            preview.omitted_columns, settings.limits.max_columns
        );
    }

    let columns: Vec<String> = preview
        .columns
        .iter()
        .zip(preview.units.iter().map(String::as_str).chain(std::iter::repeat("")))
        .map(|(name, units)| {
            if units.is_empty() {
                name.clone()
            } else {
                format!("{name} ({units})")
            }
        })
        .collect();
    let _ = write!(out, "**Columns:** {}\n\n", columns.join(", "));

    if preview.rows.is_empty() {
        out.push_str("No rows returned.");
        return out;
    }

    let shown = settings.display_rows.min(preview.rows.len());
    let _ = write!(
        out,
        "**First {shown} rows:**\n```\n{}\n```\n",
        render_table(&preview.columns, &preview.rows[..shown])
    );

    if !preview.statistics.is_empty() {
        let header: Vec<String> = ["column", "count", "mean", "std", "min", "max"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let rows: Vec<Vec<String>> = preview
            .statistics
            .iter()
            .map(|s| {
                vec![
                    s.column.clone(),
                    s.count.to_string(),
                    format_number(s.mean),
                    s.std.map_or_else(|| "NaN".to_string(), format_number),
                    format_number(s.min),
                    format_number(s.max),
                ]
            })
            .collect();
        let _ = write!(
            out,
            "\n**Summary statistics (sample only):**\n```\n{}\n```",
            render_table(&header, &rows)
        );
    }

    out.trim_end().to_string()
}
