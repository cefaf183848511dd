//! Bounded data previews with summary statistics.
//!
//! ERDDAP `.csv` data responses carry two header rows: column names, then
//! units. The preview keeps at most `max_rows` data rows and `max_columns`
//! columns. Statistics describe the kept sample only, not the full dataset.

use csv::ReaderBuilder;
use serde::Serialize;
use tracing::warn;

use super::error::MetadataParseError;

/// Limits applied when building a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewLimits {
    /// Maximum number of data rows kept.
    pub max_rows: usize,
    /// Maximum number of columns kept.
    pub max_columns: usize,
}

impl Default for PreviewLimits {
    fn default() -> Self {
        Self {
            max_rows: 1000,
            max_columns: 20,
        }
    }
}

impl PreviewLimits {
    /// Number of response lines needed to fill the preview and detect
    /// whether more rows exist: names, units, `max_rows`, plus one.
    #[must_use]
    pub const fn line_budget(&self) -> usize {
        self.max_rows + 3
    }
}

/// Summary statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStatistics {
    /// Column name.
    pub column: String,
    /// Number of numeric (non-NaN) values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// Sample standard deviation (`None` for fewer than two values).
    pub std: Option<f64>,
}

/// A sample of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPreview {
    /// Dataset the sample was taken from.
    pub dataset_id: String,
    /// Kept column names.
    pub columns: Vec<String>,
    /// Units for each kept column (may be empty strings).
    pub units: Vec<String>,
    /// Kept data rows.
    pub rows: Vec<Vec<String>>,
    /// Whether the upstream response had more rows than were kept.
    pub truncated: bool,
    /// Number of columns dropped by the column limit.
    pub omitted_columns: usize,
    /// Statistics for every numeric kept column.
    pub statistics: Vec<ColumnStatistics>,
}

/// Parses an ERDDAP `.csv` data response into a bounded preview.
///
/// # Errors
///
/// Returns an error if the column header row is missing.
pub fn parse_preview(
    csv_text: &str,
    dataset_id: &str,
    limits: PreviewLimits,
) -> Result<DataPreview, MetadataParseError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(csv_text.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(Ok(header)) if header.iter().any(|h| !h.trim().is_empty()) => header,
        Some(Err(e)) => {
            return Err(MetadataParseError::new(
                dataset_id,
                format!("unreadable data header: {e}"),
            ))
        }
        _ => return Err(MetadataParseError::new(dataset_id, "missing data header")),
    };

    let width = header.len();
    let kept = width.min(limits.max_columns);
    let take = |record: &csv::StringRecord| -> Vec<String> {
        record.iter().take(kept).map(|s| s.trim().to_string()).collect()
    };

    let columns = take(&header);
    let units = match records.next() {
        Some(Ok(units)) if units.len() == width => take(&units),
        _ => vec![String::new(); kept],
    };

    let mut rows = Vec::new();
    let mut truncated = false;
    for (index, result) in records.enumerate() {
        match result {
            Ok(record) if record.len() == width => {
                if rows.len() == limits.max_rows {
                    truncated = true;
                    break;
                }
                rows.push(take(&record));
            }
            Ok(record) => {
                warn!(
                    dataset_id,
                    row = index + 3,
                    expected = width,
                    actual = record.len(),
                    "Skipping data row with wrong column count"
                );
            }
            Err(e) => warn!(dataset_id, row = index + 3, error = %e, "Skipping malformed data row"),
        }
    }

    let statistics = summarise(&columns, &rows);

    Ok(DataPreview {
        dataset_id: dataset_id.to_string(),
        columns,
        units,
        rows,
        truncated,
        omitted_columns: width - kept,
        statistics,
    })
}

/// Computes statistics for every column whose non-missing cells are all numeric.
#[must_use]
pub fn summarise(columns: &[String], rows: &[Vec<String>]) -> Vec<ColumnStatistics> {
    columns
        .iter()
        .enumerate()
        .filter_map(|(index, column)| {
            let values = numeric_values(rows.iter().map(|row| row[index].as_str()))?;
            column_statistics(column, &values)
        })
        .collect()
}

/// Parses a column's cells as numbers.
///
/// Empty and `NaN` cells are missing values. Returns `None` if any other
/// cell is not a number.
fn numeric_values<'a>(cells: impl Iterator<Item = &'a str>) -> Option<Vec<f64>> {
    let mut values = Vec::new();
    for cell in cells {
        if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
            continue;
        }
        let value: f64 = cell.parse().ok()?;
        if value.is_finite() {
            values.push(value);
        }
    }
    Some(values)
}

#[allow(clippy::cast_precision_loss)] // sample sizes are far below 2^52
fn column_statistics(column: &str, values: &[f64]) -> Option<ColumnStatistics> {
    if values.is_empty() {
        return None;
    }

    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std = (count > 1).then(|| {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt()
    });

    Some(ColumnStatistics {
        column: column.to_string(),
        count,
        mean,
        min,
        max,
        std,
    })
}
