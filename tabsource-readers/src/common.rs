//! Shared reader options, source kinds and type inference

use std::path::Path;

use serde::{Deserialize, Serialize};

use tabsource_core::{ColumnType, Value};

/// The structured format of a raw data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Comma-delimited table
    Csv,

    /// Tab-delimited table
    Tsv,

    /// JSON record collection (array of objects or newline-delimited)
    Json,
}

impl SourceKind {
    /// Delimited reader options for this kind, if it is a delimited format
    pub fn delimited_options(self) -> Option<DelimitedOptions> {
        match self {
            SourceKind::Csv => Some(DelimitedOptions::default()),
            SourceKind::Tsv => Some(DelimitedOptions {
                delimiter: b'\t',
                ..DelimitedOptions::default()
            }),
            SourceKind::Json => None,
        }
    }
}

/// Detect the source kind of a file from its extension
pub fn detect_kind(path: &Path) -> Option<SourceKind> {
    let extension = path.extension()?.to_str()?.to_lowercase();

    match extension.as_str() {
        "csv" => Some(SourceKind::Csv),
        "tsv" => Some(SourceKind::Tsv),
        "json" | "jsonl" | "ndjson" => Some(SourceKind::Json),
        _ => None,
    }
}

/// Options for delimited readers
#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    /// Delimiter character
    pub delimiter: u8,

    /// Whether the input has a header row
    pub has_header: bool,

    /// Whether to trim whitespace around cells
    pub trim: bool,
}

impl Default for DelimitedOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            trim: false,
        }
    }
}

/// Policy for rows that fail schema coercion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Fail the whole read on the first non-conforming row
    #[default]
    Raise,

    /// Drop non-conforming rows and count them on the result
    Partial,
}

/// Infer the column type for a column of raw string cells
///
/// The narrowest type that fits every non-empty value wins, probing
/// int, then float, then bool; a column whose values fit none of those,
/// or one that is entirely empty, is a string column.
pub(crate) fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: Iterator<Item = &'a str> + Clone,
{
    let mut non_empty = values.filter(|s| !s.is_empty()).peekable();
    if non_empty.peek().is_none() {
        return ColumnType::String;
    }

    if non_empty.clone().all(|s| s.parse::<i64>().is_ok()) {
        return ColumnType::Int;
    }

    if non_empty.clone().all(|s| s.parse::<f64>().is_ok()) {
        return ColumnType::Float;
    }

    if non_empty.clone().all(|s| parse_bool(s).is_some()) {
        return ColumnType::Bool;
    }

    ColumnType::String
}

/// Parse a boolean cell
///
/// Accepts the same token set the inference probe does.
pub(crate) fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Coerce one raw string cell to a typed value
///
/// Empty cells are null regardless of the column type. Returns `None`
/// when the cell does not fit the type.
pub(crate) fn coerce_cell(s: &str, column_type: ColumnType) -> Option<Value> {
    if s.is_empty() {
        return Some(Value::Null);
    }

    match column_type {
        ColumnType::Int => s.parse::<i64>().ok().map(Value::Int),
        ColumnType::Float => s.parse::<f64>().ok().map(Value::Float),
        ColumnType::Bool => parse_bool(s).map(Value::Bool),
        ColumnType::String => Some(Value::Str(s.to_string())),
    }
}
