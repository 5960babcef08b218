//! Error types for format readers

use thiserror::Error;

use tabsource_core::ColumnType;

/// Error type for format readers
#[derive(Error, Debug)]
pub enum Error {
    /// Core data model error
    #[error("Core error: {0}")]
    Core(#[from] tabsource_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited format error
    #[cfg(feature = "delimited")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON format error
    #[cfg(feature = "json")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Structural schema error (header/declared-schema mismatch)
    #[error("Schema error: {0}")]
    Schema(String),

    /// A cell could not be coerced to its declared column type
    #[error("cannot coerce '{value}' at row {row}, column '{column}' to {expected}")]
    RowType {
        /// Zero-based data row index
        row: usize,
        /// Column name
        column: String,
        /// Offending raw value
        value: String,
        /// Declared column type
        expected: ColumnType,
    },
}

/// Result type for format readers
pub type Result<T> = std::result::Result<T, Error>;
