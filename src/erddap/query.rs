//! Construction of ERDDAP data request queries.
//!
//! # tabledap
//!
//! ```text
//! temperature,salinity&time>=2020-01-01&station="A"
//! ```
//!
//! Constraint keys carry their comparison operator (`"time>="`). String
//! values are quoted, except for time variables which ERDDAP accepts as bare
//! ISO 8601 strings.
//!
//! # griddap
//!
//! ```text
//! sst[(2020-01-01):1:(last)][(30):1:(31)]
//! ```
//!
//! Every data variable is subset along every dimension, in the dimension
//! order declared by the dataset's metadata. Ranges come from `dim>=`,
//! `dim<=` and `dim_step` constraints.

use serde_json::{Map, Value};

use super::error::{UpstreamError, UpstreamResult};
use super::metadata::DatasetMetadata;

const OPERATION: &str = "preview";

/// Comparison operators accepted in tabledap constraints, longest first.
const OPERATORS: [&str; 7] = [">=", "<=", "!=", "=~", ">", "<", "="];

fn encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

fn is_time_variable(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with("time")
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits a constraint key such as `"time>="` into `("time", ">=")`.
fn split_constraint_key(key: &str) -> UpstreamResult<(&str, &'static str)> {
    OPERATORS
        .iter()
        .find_map(|op| {
            key.strip_suffix(op)
                .map(|var| (var.trim(), *op))
                .filter(|(var, _)| is_variable_name(var))
        })
        .ok_or_else(|| {
            UpstreamError::invalid_query(
                OPERATION,
                format!(
                    "constraint '{key}' must be a variable name followed by one of {}",
                    OPERATORS.join(" ")
                ),
            )
        })
}

fn tabledap_value(variable: &str, value: &Value) -> UpstreamResult<String> {
    match value {
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::String(s) if is_time_variable(variable) => Ok(s.clone()),
        Value::String(s) => Ok(format!("\"{}\"", s.replace('"', "\\\""))),
        other => Err(UpstreamError::invalid_query(
            OPERATION,
            format!("constraint value for '{variable}' must be a string, number or boolean, got {other}"),
        )),
    }
}

/// Builds the query string of a tabledap request.
///
/// # Errors
///
/// Returns an error if a constraint key has no operator or a value is not a
/// scalar.
pub fn tabledap_query(variables: &[String], constraints: &Map<String, Value>) -> UpstreamResult<String> {
    let mut parts = vec![variables
        .iter()
        .map(|v| encode(v))
        .collect::<Vec<_>>()
        .join(",")];

    for (key, value) in constraints {
        let (variable, op) = split_constraint_key(key)?;
        let value = tabledap_value(variable, value)?;
        parts.push(encode(&format!("{variable}{op}{value}")));
    }

    Ok(parts.join("&"))
}

/// Range selected along one grid dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DimensionRange {
    start: String,
    stride: u64,
    stop: String,
}

impl DimensionRange {
    fn render(&self) -> String {
        if self.start == self.stop {
            format!("[{}]", self.start)
        } else {
            format!("[{}:{}:{}]", self.start, self.stride, self.stop)
        }
    }
}

fn griddap_bound(dimension: &str, value: &Value) -> UpstreamResult<String> {
    match value {
        Value::Number(n) => Ok(format!("({n})")),
        Value::String(s) if s == "last" => Ok(s.clone()),
        Value::String(s) => Ok(format!("({s})")),
        other => Err(UpstreamError::invalid_query(
            OPERATION,
            format!("bound for dimension '{dimension}' must be a string or number, got {other}"),
        )),
    }
}

fn dimension_range(dimension: &str, constraints: &Map<String, Value>) -> UpstreamResult<DimensionRange> {
    let lower = constraints
        .get(&format!("{dimension}>="))
        .or_else(|| constraints.get(&format!("{dimension}>")));
    let upper = constraints
        .get(&format!("{dimension}<="))
        .or_else(|| constraints.get(&format!("{dimension}<")));
    let stride = match constraints.get(&format!("{dimension}_step")) {
        None => 1,
        Some(step) => step.as_u64().filter(|s| *s > 0).ok_or_else(|| {
            UpstreamError::invalid_query(
                OPERATION,
                format!("'{dimension}_step' must be a positive integer"),
            )
        })?,
    };

    // An unconstrained time axis defaults to the latest step only.
    if lower.is_none() && upper.is_none() && is_time_variable(dimension) {
        return Ok(DimensionRange {
            start: "(last)".to_string(),
            stride,
            stop: "(last)".to_string(),
        });
    }

    Ok(DimensionRange {
        start: lower.map_or_else(|| Ok("0".to_string()), |v| griddap_bound(dimension, v))?,
        stride,
        stop: upper.map_or_else(|| Ok("last".to_string()), |v| griddap_bound(dimension, v))?,
    })
}

/// Builds the query string of a griddap request.
///
/// If `variables` is empty every data variable of the dataset is requested.
///
/// # Errors
///
/// Returns an error if the dataset declares no dimensions, a requested
/// variable is unknown, or a bound is not a scalar.
pub fn griddap_query(
    metadata: &DatasetMetadata,
    variables: &[String],
    constraints: &Map<String, Value>,
) -> UpstreamResult<String> {
    let ranges = metadata
        .dimensions()
        .map(|dim| dimension_range(&dim.name, constraints))
        .collect::<UpstreamResult<Vec<_>>>()?;
    if ranges.is_empty() {
        return Err(UpstreamError::invalid_query(
            OPERATION,
            format!("dataset '{}' declares no grid dimensions", metadata.dataset_id),
        ));
    }
    let subset: String = ranges.iter().map(DimensionRange::render).collect();

    let selected: Vec<&str> = if variables.is_empty() {
        metadata.data_variables().map(|v| v.name.as_str()).collect()
    } else {
        for name in variables {
            if !metadata.variables.contains_key(name) {
                return Err(UpstreamError::invalid_query(
                    OPERATION,
                    format!("dataset '{}' has no variable '{name}'", metadata.dataset_id),
                ));
            }
        }
        variables.iter().map(String::as_str).collect()
    };

    Ok(selected
        .iter()
        .map(|name| encode(&format!("{name}{subset}")))
        .collect::<Vec<_>>()
        .join(","))
}
