//! Delimited text reader (CSV/TSV)

use std::collections::HashMap;
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::warn;

use tabsource_core::{Field, Schema, Table, Value};

use crate::common::{coerce_cell, infer_column_type, DelimitedOptions, ErrorPolicy};
use crate::error::{Error, Result};

/// One output column and the raw input column that feeds it
struct ColumnPlan {
    /// Output column name
    name: String,

    /// Index into the raw record supplying this column's cells
    source: usize,
}

/// Reader for delimited tables
///
/// Parses a full payload into a [`Table`], resolving duplicate headers,
/// coercing cells against a declared schema or inferring one, and
/// applying the raise/partial policy to non-conforming rows.
pub struct DelimitedReader {
    /// Reader options
    options: DelimitedOptions,
}

impl DelimitedReader {
    /// Create a new delimited reader
    pub fn new(options: DelimitedOptions) -> Self {
        Self { options }
    }

    /// Read a payload into a table
    ///
    /// With a declared schema, cells are coerced to the declared types
    /// and non-conforming rows follow `policy`. Without one, each
    /// column gets the narrowest type fitting every non-empty cell.
    pub fn read_bytes(
        &self,
        data: &[u8],
        declared: Option<&Arc<Schema>>,
        policy: ErrorPolicy,
    ) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(false)
            .flexible(true)
            .trim(if self.options.trim {
                Trim::All
            } else {
                Trim::None
            })
            .from_reader(data);

        let mut records = reader.records();

        // Header row, or synthetic column_{i} names for headerless input
        let (raw_names, mut first_data_record) = if self.options.has_header {
            match records.next() {
                Some(record) => {
                    let record = record?;
                    let names: Vec<String> =
                        record.iter().map(|s| s.to_string()).collect();
                    (names, None)
                }
                None => (Vec::new(), None),
            }
        } else {
            match records.next() {
                Some(record) => {
                    let record = record?;
                    let names = (0..record.len()).map(|i| format!("column_{}", i)).collect();
                    (names, Some(record))
                }
                None => (Vec::new(), None),
            }
        };

        let arity = raw_names.len();
        let (plan, duplicate_headers) = resolve_header(&raw_names);
        if duplicate_headers > 0 {
            warn!(duplicates = duplicate_headers, "duplicate column headers resolved");
        }

        // Collect raw rows, enforcing arity; malformed rows follow the policy
        let mut raw_rows: Vec<StringRecord> = Vec::new();
        let mut dropped_rows = 0usize;
        let next = |rec: StringRecord, row_idx: usize| -> Result<Option<StringRecord>> {
            if rec.len() != arity {
                match policy {
                    ErrorPolicy::Raise => Err(Error::Schema(format!(
                        "row {} has {} fields, expected {}",
                        row_idx,
                        rec.len(),
                        arity
                    ))),
                    ErrorPolicy::Partial => Ok(None),
                }
            } else {
                Ok(Some(rec))
            }
        };

        if let Some(record) = first_data_record.take() {
            match next(record, 0)? {
                Some(rec) => raw_rows.push(rec),
                None => dropped_rows += 1,
            }
        }
        for record in records {
            let record = record?;
            let row_idx = raw_rows.len() + dropped_rows;
            match next(record, row_idx)? {
                Some(rec) => raw_rows.push(rec),
                None => dropped_rows += 1,
            }
        }

        // Resolve the output schema
        let schema = match declared {
            Some(declared) => {
                self.check_declared(declared, &plan)?;
                declared.clone()
            }
            None => {
                let fields = plan
                    .iter()
                    .map(|col| {
                        let cells = raw_rows.iter().map(|rec| &rec[col.source]);
                        Field::new(&col.name, infer_column_type(cells))
                    })
                    .collect();
                Arc::new(Schema::new(fields).map_err(Error::Core)?)
            }
        };

        // Source index for each output column, in schema order
        let sources: Vec<usize> = match declared {
            Some(_) if self.options.has_header => schema
                .names()
                .map(|name| {
                    plan.iter()
                        .find(|col| col.name == name)
                        .map(|col| col.source)
                        .expect("checked against the plan above")
                })
                .collect(),
            _ => plan.iter().map(|col| col.source).collect(),
        };

        // Coerce rows
        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(raw_rows.len());
        'rows: for (row_idx, record) in raw_rows.iter().enumerate() {
            let mut row = Vec::with_capacity(schema.len());
            for (field, &source) in schema.fields().iter().zip(&sources) {
                let cell = &record[source];
                match coerce_cell(cell, field.column_type()) {
                    Some(value) => row.push(value),
                    None => match policy {
                        ErrorPolicy::Raise => {
                            return Err(Error::RowType {
                                row: row_idx,
                                column: field.name().to_string(),
                                value: cell.to_string(),
                                expected: field.column_type(),
                            });
                        }
                        ErrorPolicy::Partial => {
                            dropped_rows += 1;
                            continue 'rows;
                        }
                    },
                }
            }
            rows.push(row);
        }

        let table = Table::new(schema, rows)
            .map_err(Error::Core)?
            .with_dropped_rows(dropped_rows)
            .with_duplicate_headers(duplicate_headers);
        Ok(table)
    }

    /// Check a declared schema against the resolved header
    fn check_declared(&self, declared: &Schema, plan: &[ColumnPlan]) -> Result<()> {
        if self.options.has_header {
            for name in declared.names() {
                if !plan.iter().any(|col| col.name == name) {
                    return Err(Error::Schema(format!(
                        "declared column '{}' not present in header",
                        name
                    )));
                }
            }
        } else if declared.len() != plan.len() {
            return Err(Error::Schema(format!(
                "declared schema has {} columns, input has {}",
                declared.len(),
                plan.len()
            )));
        }
        Ok(())
    }
}

impl Default for DelimitedReader {
    fn default() -> Self {
        Self::new(DelimitedOptions::default())
    }
}

/// Resolve duplicate header names
///
/// The later occurrence supplies the values; the name keeps its first
/// position so column order stays stable. Returns the column plan and
/// the number of collisions.
fn resolve_header(raw_names: &[String]) -> (Vec<ColumnPlan>, usize) {
    let mut plan: Vec<ColumnPlan> = Vec::with_capacity(raw_names.len());
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(raw_names.len());
    let mut duplicates = 0;

    for (source, name) in raw_names.iter().enumerate() {
        match seen.get(name.as_str()) {
            Some(&at) => {
                plan[at].source = source;
                duplicates += 1;
            }
            None => {
                seen.insert(name, plan.len());
                plan.push(ColumnPlan {
                    name: name.clone(),
                    source,
                });
            }
        }
    }

    (plan, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabsource_core::ColumnType;

    fn declared(fields: &[(&str, ColumnType)]) -> Arc<Schema> {
        Arc::new(
            Schema::new(
                fields
                    .iter()
                    .map(|(name, ct)| Field::new(name, *ct))
                    .collect(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_round_trip_typed() {
        let data = b"id,name,score\n1,Alice,10.5\n2,Bob,20.1\n3,Charlie,30.9\n";

        let table = DelimitedReader::default()
            .read_bytes(data, None, ErrorPolicy::Raise)
            .unwrap();

        assert_eq!(table.num_rows(), 3);
        let schema = table.schema();
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(0).column_type(), ColumnType::Int);
        assert_eq!(schema.field(1).column_type(), ColumnType::String);
        assert_eq!(schema.field(2).column_type(), ColumnType::Float);
        assert_eq!(table.get(1, "name").unwrap(), &Value::from("Bob"));
        assert_eq!(table.get(2, "score").unwrap(), &Value::Float(30.9));
    }

    #[test]
    fn test_header_only_yields_empty_table() {
        let data = b"id,name,score\n";

        let table = DelimitedReader::default()
            .read_bytes(data, None, ErrorPolicy::Raise)
            .unwrap();

        assert_eq!(table.num_rows(), 0);
        assert_eq!(table.num_columns(), 3);
        assert_eq!(table.schema().field(2).name(), "score");
    }

    #[test]
    fn test_partial_drops_bad_row() {
        let data = b"id,v\n1,a\n2,b\nx,c\n4,d\n5,e\n";
        let schema = declared(&[("id", ColumnType::Int), ("v", ColumnType::String)]);

        let table = DelimitedReader::default()
            .read_bytes(data, Some(&schema), ErrorPolicy::Partial)
            .unwrap();

        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.dropped_rows(), 1);
        let ids: Vec<i64> = table
            .column("id")
            .unwrap()
            .filter_map(Value::as_int)
            .collect();
        assert_eq!(ids, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_raise_fails_on_bad_row() {
        let data = b"id,v\n1,a\n2,b\nx,c\n4,d\n5,e\n";
        let schema = declared(&[("id", ColumnType::Int), ("v", ColumnType::String)]);

        let err = DelimitedReader::default()
            .read_bytes(data, Some(&schema), ErrorPolicy::Raise)
            .unwrap_err();

        match err {
            Error::RowType {
                row,
                column,
                value,
                expected,
            } => {
                assert_eq!(row, 2);
                assert_eq!(column, "id");
                assert_eq!(value, "x");
                assert_eq!(expected, ColumnType::Int);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_header_later_wins() {
        let data = b"a,b,a\n1,2,3\n4,5,6\n";

        let table = DelimitedReader::default()
            .read_bytes(data, None, ErrorPolicy::Raise)
            .unwrap();

        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.duplicate_headers(), 1);
        // "a" keeps first position but is fed by the later column
        assert_eq!(table.schema().field(0).name(), "a");
        assert_eq!(table.get(0, "a").unwrap(), &Value::Int(3));
        assert_eq!(table.get(1, "a").unwrap(), &Value::Int(6));
        assert_eq!(table.get(0, "b").unwrap(), &Value::Int(2));
    }

    #[test]
    fn test_empty_cells_are_null() {
        let data = b"id,score\n1,\n2,3.5\n";

        let table = DelimitedReader::default()
            .read_bytes(data, None, ErrorPolicy::Raise)
            .unwrap();

        assert!(table.get(0, "score").unwrap().is_null());
        assert_eq!(
            table.schema().field_by_name("score").unwrap().column_type(),
            ColumnType::Float
        );
    }

    #[test]
    fn test_headerless_positional_schema() {
        let data = b"1,x\n2,y\n";
        let options = DelimitedOptions {
            has_header: false,
            ..DelimitedOptions::default()
        };
        let schema = declared(&[("id", ColumnType::Int), ("label", ColumnType::String)]);

        let table = DelimitedReader::new(options)
            .read_bytes(data, Some(&schema), ErrorPolicy::Raise)
            .unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.get(1, "label").unwrap(), &Value::from("y"));
    }

    #[test]
    fn test_tsv_delimiter() {
        let data = b"id\tname\n1\tAlice\n";
        let options = crate::common::SourceKind::Tsv.delimited_options().unwrap();

        let table = DelimitedReader::new(options)
            .read_bytes(data, None, ErrorPolicy::Raise)
            .unwrap();

        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.get(0, "name").unwrap(), &Value::from("Alice"));
    }

    #[test]
    fn test_declared_column_missing_from_header() {
        let data = b"id\n1\n";
        let schema = declared(&[("id", ColumnType::Int), ("name", ColumnType::String)]);

        let err = DelimitedReader::default()
            .read_bytes(data, Some(&schema), ErrorPolicy::Raise)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_ragged_row_partial() {
        let data = b"a,b\n1,2\n3\n4,5\n";

        let table = DelimitedReader::default()
            .read_bytes(data, None, ErrorPolicy::Partial)
            .unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.dropped_rows(), 1);
    }
}
