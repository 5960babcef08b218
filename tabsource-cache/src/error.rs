//! Error taxonomy for the loader/cache layer
//!
//! The taxonomy is deliberately small and every variant is cloneable,
//! because a failed in-flight load hands the same result to every
//! caller that attached to it.

use std::fmt;

/// Result type for loader/cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for loader/cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The identifier is not configured, or storage stayed unreachable
    /// after the retry bound
    SourceNotFound {
        /// Source identifier
        source: String,
        /// What went wrong
        reason: String,
    },

    /// The payload did not conform to the declared or inferred schema
    /// under the raise policy
    ///
    /// Data-quality failures are never retried; retrying will not fix a
    /// parse error.
    SchemaViolation {
        /// Source identifier
        source: String,
        /// What failed to conform
        detail: String,
    },

    /// An internal table invariant was violated
    ///
    /// Indicates a bug in the loader itself; the offending result is
    /// never published to the cache.
    CacheCorruption(String),
}

// A derived `thiserror` impl would treat the `source` field as the error
// source, which `String` cannot be; implement Display/Error by hand with
// the same messages instead.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SourceNotFound { source, reason } => {
                write!(f, "source '{source}' not found: {reason}")
            }
            Error::SchemaViolation { source, detail } => {
                write!(f, "schema violation in source '{source}': {detail}")
            }
            Error::CacheCorruption(detail) => {
                write!(f, "cache corruption: {detail}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Build a `SourceNotFound` error
    pub(crate) fn source_not_found(source: &str, reason: impl fmt::Display) -> Self {
        Error::SourceNotFound {
            source: source.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Build a `SchemaViolation` error
    pub(crate) fn schema_violation(source: &str, detail: impl fmt::Display) -> Self {
        Error::SchemaViolation {
            source: source.to_string(),
            detail: detail.to_string(),
        }
    }
}
