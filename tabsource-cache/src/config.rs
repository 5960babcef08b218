//! Process-wide cache configuration
//!
//! Configuration is fixed at startup: the cache takes it by value at
//! construction and never mutates it. The staleness and eviction knobs
//! are tunable defaults, not contracts; see `CacheConfig::default`.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use tabsource_core::{Field, Schema};
use tabsource_readers::{ErrorPolicy, SourceKind};

/// Configuration for a [`crate::TableCache`]
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Window (seconds) within which a cached entry is served without
    /// re-checking its modification marker
    ///
    /// After the window elapses the marker is re-checked and, if
    /// unchanged, the window resets without a payload read. Zero
    /// disables the window: every load re-checks the marker.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Entry-count ceiling triggering least-recently-used eviction
    ///
    /// Zero disables the ceiling.
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Policy for non-conforming rows when a load does not specify one
    #[serde(default)]
    pub default_on_error: ErrorPolicy,

    /// Retry bound and backoff for transient storage errors
    #[serde(default)]
    pub retry: RetryConfig,

    /// Configured sources, by identifier
    #[serde(default)]
    pub sources: HashMap<String, SourceSpec>,
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_max_cache_entries() -> usize {
    64
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_cache_entries: default_max_cache_entries(),
            default_on_error: ErrorPolicy::default(),
            retry: RetryConfig::default(),
            sources: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Register a source, replacing any previous spec for the identifier
    #[must_use]
    pub fn with_source(mut self, identifier: impl Into<String>, spec: SourceSpec) -> Self {
        self.sources.insert(identifier.into(), spec);
        self
    }

    /// Look up a configured source
    pub fn source(&self, identifier: &str) -> Option<&SourceSpec> {
        self.sources.get(identifier)
    }

    /// The serve-without-recheck window
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Retry bound and backoff for transient storage errors
///
/// Only storage I/O goes through the retry loop; malformed data is
/// never retried.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts before the failure surfaces
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds; doubles per attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    50
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// One configured data source
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    /// Storage location of the raw payload
    pub path: PathBuf,

    /// Structured format; detected from the path extension when absent
    #[serde(default)]
    pub kind: Option<SourceKind>,

    /// Declared column types; inferred from the data when absent
    #[serde(default)]
    pub schema: Option<Vec<Field>>,

    /// Whether a delimited payload starts with a header row
    #[serde(default)]
    pub has_header: Option<bool>,
}

impl SourceSpec {
    /// Create a spec for a path, with everything else defaulted
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: None,
            schema: None,
            has_header: None,
        }
    }

    /// Set the source kind explicitly
    #[must_use]
    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Declare the column types
    #[must_use]
    pub fn with_schema(mut self, fields: Vec<Field>) -> Self {
        self.schema = Some(fields);
        self
    }

    /// Build the declared schema, if one is configured
    pub(crate) fn declared_schema(&self) -> tabsource_core::Result<Option<Arc<Schema>>> {
        self.schema
            .clone()
            .map(|fields| Schema::new(fields).map(Arc::new))
            .transpose()
    }
}
