//! Error types for the core data model

use thiserror::Error;

/// Result type for core data model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core data model operations
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema construction or lookup error
    #[error("Schema error: {0}")]
    Schema(String),

    /// A table invariant was violated
    ///
    /// This indicates a bug in the code that built the table, not bad
    /// input data. It is never repaired in place.
    #[error("Corrupt table: {detail}")]
    Corrupt {
        /// Description of the violated invariant
        detail: String,
    },
}
