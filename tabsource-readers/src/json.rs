//! JSON record reader
//!
//! Accepts either a JSON array of objects or newline-delimited objects.
//! Each object is one row; column order is the order keys are first
//! seen across the records.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use tabsource_core::{ColumnType, Field, Schema, Table, Value};

use crate::common::ErrorPolicy;
use crate::error::{Error, Result};

/// Reader for JSON record collections
#[derive(Debug, Default)]
pub struct JsonReader;

impl JsonReader {
    /// Create a new JSON reader
    pub fn new() -> Self {
        Self
    }

    /// Read a payload into a table
    ///
    /// With a declared schema, record values are coerced to the declared
    /// types (only int-to-float widening is permitted) and non-conforming
    /// rows follow `policy`. Without one, each column gets the narrowest
    /// type fitting every non-null value, widening int to float and
    /// falling back to stringified scalars for mixed columns.
    pub fn read_bytes(
        &self,
        data: &[u8],
        declared: Option<&Arc<Schema>>,
        policy: ErrorPolicy,
    ) -> Result<Table> {
        let mut dropped_rows = 0usize;
        let records = self.parse_records(data, policy, &mut dropped_rows)?;

        match declared {
            Some(schema) => {
                let rows = self.coerce_records(&records, schema, policy, &mut dropped_rows)?;
                let table = Table::new(schema.clone(), rows)
                    .map_err(Error::Core)?
                    .with_dropped_rows(dropped_rows);
                Ok(table)
            }
            None => self.infer_records(&records, policy, dropped_rows),
        }
    }

    /// Parse the payload into JSON objects
    ///
    /// Tries a whole-payload document first (array of objects, or a
    /// single object), then falls back to newline-delimited objects.
    fn parse_records(
        &self,
        data: &[u8],
        policy: ErrorPolicy,
        dropped_rows: &mut usize,
    ) -> Result<Vec<Map<String, JsonValue>>> {
        if let Ok(document) = serde_json::from_slice::<JsonValue>(data) {
            return match document {
                JsonValue::Array(items) => {
                    let mut records = Vec::with_capacity(items.len());
                    for (idx, item) in items.into_iter().enumerate() {
                        match item {
                            JsonValue::Object(map) => records.push(map),
                            other => match policy {
                                ErrorPolicy::Raise => {
                                    return Err(Error::Schema(format!(
                                        "record {} is not an object: {}",
                                        idx, other
                                    )));
                                }
                                ErrorPolicy::Partial => *dropped_rows += 1,
                            },
                        }
                    }
                    Ok(records)
                }
                JsonValue::Object(map) => Ok(vec![map]),
                other => Err(Error::Schema(format!(
                    "payload is not a record collection: {}",
                    other
                ))),
            };
        }

        // Newline-delimited fallback
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Schema(format!("payload is not UTF-8: {}", e)))?;
        let mut records = Vec::new();
        for (line_idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonValue>(line) {
                Ok(JsonValue::Object(map)) => records.push(map),
                Ok(other) => match policy {
                    ErrorPolicy::Raise => {
                        return Err(Error::Schema(format!(
                            "line {} is not an object: {}",
                            line_idx, other
                        )));
                    }
                    ErrorPolicy::Partial => *dropped_rows += 1,
                },
                Err(e) => match policy {
                    ErrorPolicy::Raise => return Err(Error::Json(e)),
                    ErrorPolicy::Partial => *dropped_rows += 1,
                },
            }
        }
        Ok(records)
    }

    /// Coerce records against a declared schema
    fn coerce_records(
        &self,
        records: &[Map<String, JsonValue>],
        schema: &Schema,
        policy: ErrorPolicy,
        dropped_rows: &mut usize,
    ) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::with_capacity(records.len());
        'records: for (row_idx, record) in records.iter().enumerate() {
            let mut row = Vec::with_capacity(schema.len());
            for field in schema.fields() {
                let raw = record.get(field.name()).unwrap_or(&JsonValue::Null);
                let cell = scalar(raw).and_then(|v| coerce_value(v, field.column_type()));
                match cell {
                    Some(value) => row.push(value),
                    None => match policy {
                        ErrorPolicy::Raise => {
                            return Err(Error::RowType {
                                row: row_idx,
                                column: field.name().to_string(),
                                value: raw.to_string(),
                                expected: field.column_type(),
                            });
                        }
                        ErrorPolicy::Partial => {
                            *dropped_rows += 1;
                            continue 'records;
                        }
                    },
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Build a table from records with an inferred schema
    fn infer_records(
        &self,
        records: &[Map<String, JsonValue>],
        policy: ErrorPolicy,
        mut dropped_rows: usize,
    ) -> Result<Table> {
        // Column order is first-seen key order across the records
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.iter().any(|n| n == key) {
                    names.push(key.clone());
                }
            }
        }

        // Scalar cells aligned to the column list; nested values follow
        // the policy
        let mut raw_rows: Vec<Vec<Value>> = Vec::with_capacity(records.len());
        'records: for (row_idx, record) in records.iter().enumerate() {
            let mut row = Vec::with_capacity(names.len());
            for name in &names {
                let raw = record.get(name).unwrap_or(&JsonValue::Null);
                match scalar(raw) {
                    Some(value) => row.push(value),
                    None => match policy {
                        ErrorPolicy::Raise => {
                            return Err(Error::Schema(format!(
                                "row {} column '{}' holds a nested value",
                                row_idx, name
                            )));
                        }
                        ErrorPolicy::Partial => {
                            dropped_rows += 1;
                            continue 'records;
                        }
                    },
                }
            }
            raw_rows.push(row);
        }

        let fields: Vec<Field> = names
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let column_type = infer_value_type(raw_rows.iter().map(|r| &r[col]));
                Field::new(name, column_type)
            })
            .collect();
        let schema = Arc::new(Schema::new(fields).map_err(Error::Core)?);

        let rows: Vec<Vec<Value>> = raw_rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(schema.fields())
                    .map(|(value, field)| normalize(value, field.column_type()))
                    .collect()
            })
            .collect();

        let table = Table::new(schema, rows)
            .map_err(Error::Core)?
            .with_dropped_rows(dropped_rows);
        Ok(table)
    }
}

/// Convert a JSON value to a scalar cell, or `None` for nested values
fn scalar(raw: &JsonValue) -> Option<Value> {
    match raw {
        JsonValue::Null => Some(Value::Null),
        JsonValue::Bool(b) => Some(Value::Bool(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(Value::Float)
            }
        }
        JsonValue::String(s) => Some(Value::Str(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

/// Coerce a scalar to a declared column type
///
/// Only int-to-float widening is permitted; JSON cells are already
/// typed, so anything else is a mismatch.
fn coerce_value(value: Value, column_type: ColumnType) -> Option<Value> {
    match (value, column_type) {
        (Value::Null, _) => Some(Value::Null),
        (Value::Int(i), ColumnType::Int) => Some(Value::Int(i)),
        #[allow(clippy::cast_precision_loss)]
        (Value::Int(i), ColumnType::Float) => Some(Value::Float(i as f64)),
        (Value::Float(f), ColumnType::Float) => Some(Value::Float(f)),
        (Value::Bool(b), ColumnType::Bool) => Some(Value::Bool(b)),
        (Value::Str(s), ColumnType::String) => Some(Value::Str(s)),
        _ => None,
    }
}

/// Infer the narrowest column type fitting every non-null scalar
fn infer_value_type<'a, I>(values: I) -> ColumnType
where
    I: Iterator<Item = &'a Value>,
{
    let mut saw_any = false;
    let (mut all_int, mut all_float, mut all_bool) = (true, true, true);

    for value in values {
        match value {
            Value::Null => continue,
            Value::Int(_) => {
                // ints widen to float, so a float column still fits
                saw_any = true;
                all_bool = false;
            }
            Value::Float(_) => {
                saw_any = true;
                all_int = false;
                all_bool = false;
            }
            Value::Bool(_) => {
                saw_any = true;
                all_int = false;
                all_float = false;
            }
            Value::Str(_) => {
                saw_any = true;
                all_int = false;
                all_float = false;
                all_bool = false;
            }
        }
    }

    if !saw_any {
        ColumnType::String
    } else if all_int {
        ColumnType::Int
    } else if all_float {
        ColumnType::Float
    } else if all_bool {
        ColumnType::Bool
    } else {
        ColumnType::String
    }
}

/// Normalize a scalar into its inferred column type (cannot fail)
fn normalize(value: Value, column_type: ColumnType) -> Value {
    match (&value, column_type) {
        (Value::Null, _) => Value::Null,
        #[allow(clippy::cast_precision_loss)]
        (Value::Int(i), ColumnType::Float) => Value::Float(*i as f64),
        (Value::Str(_), ColumnType::String) => value,
        (_, ColumnType::String) => Value::Str(value.to_string()),
        _ => value,
    }
}
