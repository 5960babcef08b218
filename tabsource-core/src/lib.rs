//! Core types for the tabsource data layer
//!
//! This crate provides the normalized in-memory representation that the
//! loader and cache layers build on: tagged scalar values, column types,
//! schemas, and immutable tables. Everything downstream of a successful
//! load speaks these types.

#![warn(missing_docs)]

pub mod error;
pub mod schema;
pub mod table;
pub mod value;

// Re-export key types for convenience
pub use error::{Error, Result};
pub use schema::{ColumnType, Field, Schema};
pub use table::Table;
pub use value::Value;
