//! Parsers for the CSV dialects returned by ERDDAP.
//!
//! ERDDAP answers search and metadata requests with two different CSV
//! layouts:
//!
//! - **Search results** (`search/index.csv`): one row per dataset with a wide
//!   set of columns (`griddap`, `tabledap`, ..., `Title`, `Summary`, ...,
//!   `Dataset ID`).
//! - **Dataset info** (`info/{id}/index.csv`): a long/narrow table with the
//!   columns `Row Type`, `Variable Name`, `Attribute Name`, `Data Type`,
//!   `Value`.
//!
//! Columns are located by header name, never by position, because servers
//! have reordered and extended both layouts over time. Rows that cannot be
//! parsed are skipped with a warning rather than failing the whole document.

use std::collections::HashSet;

use csv::{ReaderBuilder, StringRecord};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::error::MetadataParseError;

/// Variable name ERDDAP uses for dataset-level attributes.
pub const GLOBAL_VARIABLE: &str = "NC_GLOBAL";

/// One dataset from a search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    /// ERDDAP dataset identifier.
    pub dataset_id: String,
    /// Dataset title.
    pub title: String,
    /// Free-text summary.
    pub summary: String,
}

/// How a variable was declared in the metadata table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// A data variable.
    #[default]
    Variable,
    /// A grid axis (griddap datasets only).
    Dimension,
}

/// A variable and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VariableMetadata {
    /// Variable name.
    pub name: String,
    /// Whether the variable is a data variable or a grid dimension.
    pub kind: VariableKind,
    /// Declared data type, if a declaration row was seen.
    pub data_type: Option<String>,
    /// Attributes in first-seen order.
    pub attributes: IndexMap<String, String>,
}

impl VariableMetadata {
    /// Returns an attribute value by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Structured metadata for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DatasetMetadata {
    /// ERDDAP dataset identifier.
    pub dataset_id: String,
    /// Dataset-level (`NC_GLOBAL`) attributes.
    pub global_attributes: IndexMap<String, String>,
    /// Variables keyed by name, in first-seen order.
    pub variables: IndexMap<String, VariableMetadata>,
}

impl DatasetMetadata {
    /// Returns a global attribute value by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&str> {
        self.global_attributes.get(name).map(String::as_str)
    }

    /// Grid dimensions in declaration order.
    pub fn dimensions(&self) -> impl Iterator<Item = &VariableMetadata> {
        self.variables
            .values()
            .filter(|v| v.kind == VariableKind::Dimension)
    }

    /// Data variables (everything that is not a dimension).
    pub fn data_variables(&self) -> impl Iterator<Item = &VariableMetadata> {
        self.variables
            .values()
            .filter(|v| v.kind == VariableKind::Variable)
    }

    fn variable_entry(&mut self, name: &str) -> &mut VariableMetadata {
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| VariableMetadata {
                name: name.to_string(),
                ..VariableMetadata::default()
            })
    }
}

/// Normalises a header cell for comparison: lowercase, alphanumerics only.
fn normalise_header(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Column positions resolved from a header row.
struct Columns {
    names: Vec<String>,
}

impl Columns {
    fn new(header: &StringRecord) -> Self {
        Self {
            names: header.iter().map(normalise_header).collect(),
        }
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    /// Finds the first column whose normalised name matches any candidate.
    fn find(&self, candidates: &[&str]) -> Option<usize> {
        candidates
            .iter()
            .find_map(|c| self.names.iter().position(|n| n.as_str() == *c))
    }
}

fn field(record: &StringRecord, index: Option<usize>) -> &str {
    index.and_then(|i| record.get(i)).map_or("", str::trim)
}

/// Reads the header row and returns the reader positioned at the first data row.
fn open_reader<'a>(
    csv_text: &'a str,
    context: &str,
) -> Result<(csv::Reader<&'a [u8]>, Columns), MetadataParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| MetadataParseError::new(context, format!("unreadable header row: {e}")))?
        .clone();

    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(MetadataParseError::new(context, "missing header row"));
    }

    Ok((reader, Columns::new(&header)))
}

/// Iterates over well-formed data rows, skipping broken ones with a warning.
fn data_rows<'r, R: std::io::Read + 'r>(
    reader: &'r mut csv::Reader<R>,
    width: usize,
    context: &'r str,
) -> impl Iterator<Item = StringRecord> + 'r {
    reader
        .records()
        .enumerate()
        .filter_map(move |(index, result)| {
            // Line numbers are 1-based and the header is line 1.
            let row = index + 2;
            match result {
                Ok(record) if record.len() == width => Some(record),
                Ok(record) if record.len() == 1 && record[0].trim().is_empty() => None,
                Ok(record) => {
                    warn!(
                        context,
                        row,
                        expected = width,
                        actual = record.len(),
                        "Skipping CSV row with wrong column count"
                    );
                    None
                }
                Err(e) => {
                    warn!(context, row, error = %e, "Skipping malformed CSV row");
                    None
                }
            }
        })
}

/// Parses an ERDDAP search response into dataset summaries.
///
/// `query` is only used to label diagnostics. A response that contains just
/// the header row yields an empty list. Duplicate or empty dataset IDs are
/// dropped.
///
/// # Errors
///
/// Returns an error if the header row is missing or has no dataset ID column.
pub fn parse_search_results(
    csv_text: &str,
    query: &str,
) -> Result<Vec<DatasetSummary>, MetadataParseError> {
    let (mut reader, columns) = open_reader(csv_text, query)?;

    let id_col = columns
        .find(&["datasetid"])
        .ok_or_else(|| MetadataParseError::new(query, "search results have no 'Dataset ID' column"))?;
    let title_col = columns.find(&["title"]);
    let summary_col = columns.find(&["summary"]);

    let mut seen = HashSet::new();
    let mut results = Vec::new();

    for record in data_rows(&mut reader, columns.len(), query) {
        let dataset_id = field(&record, Some(id_col));
        if dataset_id.is_empty() {
            warn!(query, "Skipping search result without a dataset ID");
            continue;
        }
        if !seen.insert(dataset_id.to_string()) {
            warn!(query, dataset_id, "Skipping duplicate search result");
            continue;
        }

        results.push(DatasetSummary {
            dataset_id: dataset_id.to_string(),
            title: field(&record, title_col).to_string(),
            summary: field(&record, summary_col).to_string(),
        });
    }

    Ok(results)
}

/// Parses an ERDDAP dataset info table into structured metadata.
///
/// - `attribute` rows with an empty (or `NC_GLOBAL`) variable name become
///   global attributes.
/// - `attribute` rows naming a variable are attached to that variable,
///   creating it on first sight.
/// - `variable` and `dimension` rows declare a variable and its data type.
/// - Any other row type is ignored.
///
/// # Errors
///
/// Returns an error if the header row is missing or lacks the row type,
/// variable name, attribute name or value columns.
pub fn parse_dataset_metadata(
    csv_text: &str,
    dataset_id: &str,
) -> Result<DatasetMetadata, MetadataParseError> {
    let (mut reader, columns) = open_reader(csv_text, dataset_id)?;

    let require = |name: &str, key: &str| {
        columns
            .find(&[key])
            .ok_or_else(|| MetadataParseError::new(dataset_id, format!("missing '{name}' column")))
    };
    let row_type_col = require("Row Type", "rowtype")?;
    let variable_col = require("Variable Name", "variablename")?;
    let attribute_col = require("Attribute Name", "attributename")?;
    let value_col = require("Value", "value")?;
    let data_type_col = columns.find(&["datatype"]);

    let mut metadata = DatasetMetadata {
        dataset_id: dataset_id.to_string(),
        ..DatasetMetadata::default()
    };

    for record in data_rows(&mut reader, columns.len(), dataset_id) {
        let row_type = field(&record, Some(row_type_col));
        let variable = field(&record, Some(variable_col));
        let data_type = field(&record, data_type_col);

        match row_type.to_ascii_lowercase().as_str() {
            "attribute" => {
                let name = field(&record, Some(attribute_col));
                if name.is_empty() {
                    continue;
                }
                let value = field(&record, Some(value_col)).to_string();
                if variable.is_empty() || variable == GLOBAL_VARIABLE {
                    metadata.global_attributes.insert(name.to_string(), value);
                } else {
                    metadata
                        .variable_entry(variable)
                        .attributes
                        .insert(name.to_string(), value);
                }
            }
            kind @ ("variable" | "dimension") if !variable.is_empty() => {
                let entry = metadata.variable_entry(variable);
                if kind == "dimension" {
                    entry.kind = VariableKind::Dimension;
                }
                if !data_type.is_empty() {
                    entry.data_type = Some(data_type.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(metadata)
}
