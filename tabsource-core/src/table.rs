//! Immutable, normalized tables

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::Value;

/// The normalized in-memory result of loading a data source
///
/// A table is immutable once built: the cache publishes it behind an
/// `Arc` and consumers must derive new tables instead of mutating it.
/// The constructor enforces the shape invariants — every row has exactly
/// the schema's arity, in schema order, and every non-null value matches
/// its column's type. A violation is a loader bug and fails construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Column names and types, in column order
    schema: Arc<Schema>,

    /// Row-major cell storage, aligned to the schema
    rows: Vec<Vec<Value>>,

    /// Rows discarded under the partial error policy
    dropped_rows: usize,

    /// Duplicate header names resolved while reading the raw input
    duplicate_headers: usize,
}

impl Table {
    /// Create a new table, validating the shape invariants
    pub fn new(schema: Arc<Schema>, rows: Vec<Vec<Value>>) -> Result<Self> {
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(Error::Corrupt {
                    detail: format!(
                        "row {} has {} cells, schema has {} columns",
                        row_idx,
                        row.len(),
                        schema.len()
                    ),
                });
            }
            for (col_idx, value) in row.iter().enumerate() {
                let field = schema.field(col_idx);
                if !value.fits(field.column_type()) {
                    return Err(Error::Corrupt {
                        detail: format!(
                            "row {} column '{}' holds {:?}, declared {}",
                            row_idx,
                            field.name(),
                            value,
                            field.column_type()
                        ),
                    });
                }
            }
        }

        Ok(Self {
            schema,
            rows,
            dropped_rows: 0,
            duplicate_headers: 0,
        })
    }

    /// Create an empty table with the given schema
    pub fn new_empty(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            dropped_rows: 0,
            duplicate_headers: 0,
        }
    }

    /// Attach the number of rows dropped under the partial policy
    #[must_use]
    pub fn with_dropped_rows(mut self, dropped_rows: usize) -> Self {
        self.dropped_rows = dropped_rows;
        self
    }

    /// Attach the number of duplicate headers resolved during the read
    #[must_use]
    pub fn with_duplicate_headers(mut self, duplicate_headers: usize) -> Self {
        self.duplicate_headers = duplicate_headers;
        self
    }

    /// Get the schema of this table
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the number of data rows
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Get the number of columns
    pub fn num_columns(&self) -> usize {
        self.schema.len()
    }

    /// Get all rows, in order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Get a row by index
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Get a single cell by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Result<&Value> {
        let col = self.schema.index_of(column)?;
        self.rows
            .get(row)
            .map(|r| &r[col])
            .ok_or_else(|| Error::InvalidArgument(format!("row {} out of bounds", row)))
    }

    /// Iterate over one column's values, in row order
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Value>> {
        let col = self.schema.index_of(name)?;
        Ok(self.rows.iter().map(move |r| &r[col]))
    }

    /// Rows discarded under the partial error policy
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Duplicate header names resolved while reading the raw input
    pub fn duplicate_headers(&self) -> usize {
        self.duplicate_headers
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table: {} rows x {} columns",
            self.num_rows(),
            self.num_columns()
        )?;
        if self.dropped_rows > 0 {
            write!(f, " ({} rows dropped)", self.dropped_rows)?;
        }
        Ok(())
    }
}
