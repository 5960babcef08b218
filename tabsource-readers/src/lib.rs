//! Format readers for the tabsource data layer
//!
//! This crate turns raw payload bytes into normalized [`Table`]s. Each
//! reader handles one source kind: delimited text (CSV/TSV) or JSON
//! record collections. Schema inference, duplicate-header resolution and
//! the raise/partial coercion policy live here; fetching the bytes and
//! caching the result are the cache layer's concern.

mod common;
mod error;

#[cfg(feature = "delimited")]
pub mod delimited;

#[cfg(feature = "json")]
pub mod json;

pub use common::{detect_kind, DelimitedOptions, ErrorPolicy, SourceKind};
pub use error::{Error, Result};

#[cfg(feature = "delimited")]
pub use delimited::DelimitedReader;

#[cfg(feature = "json")]
pub use json::JsonReader;

// Re-export core types for convenience
pub use tabsource_core::{ColumnType, Field, Schema, Table, Value};
