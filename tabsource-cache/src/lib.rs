//! Cached data ingestion for dashboard pages
//!
//! This crate is the top of the tabsource stack: it owns the configured
//! sources, checks storage freshness markers, runs the format readers
//! and publishes immutable [`Table`] snapshots behind `Arc`. Pages call
//! [`TableCache::load`] and get the cached table whenever the source is
//! unchanged; concurrent loads of the same source share a single
//! storage read.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabsource_cache::{CacheConfig, FsStorage, LoadOptions, SourceSpec, TableCache};
//!
//! # fn main() -> Result<(), tabsource_cache::Error> {
//! let config = CacheConfig::default()
//!     .with_source("ratings", SourceSpec::new("data/ratings.csv"));
//! let cache = TableCache::new(config, Arc::new(FsStorage::new()));
//!
//! let table = cache.load("ratings", &LoadOptions::default())?;
//! println!("{table}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod storage;

pub use cache::{CacheStats, LoadOptions, TableCache};
pub use config::{CacheConfig, RetryConfig, SourceSpec};
pub use error::{Error, Result};
pub use storage::{FsStorage, Marker, Storage};

// Re-export the vocabulary types callers handle
pub use tabsource_core::{ColumnType, Field, Schema, Table, Value};
pub use tabsource_readers::{ErrorPolicy, SourceKind};
