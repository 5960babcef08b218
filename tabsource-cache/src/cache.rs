//! Cached, single-flight table loading
//!
//! [`TableCache`] is the entire surface offered to dashboard pages:
//! `load`, `invalidate` and `schema_of`. Pages never touch storage
//! directly, and the tables they receive are immutable snapshots behind
//! `Arc` — a page holding a superseded table keeps it alive until the
//! page drops it, so eviction never invalidates a consumer's view.
//!
//! A single registry mutex guards the cache maps. It is held only for
//! map operations, never across storage I/O or parsing; callers waiting
//! for data block on the in-flight handle for their own key, so loads
//! of unrelated sources proceed independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use tabsource_core::{Schema, Table};
use tabsource_readers::{detect_kind, DelimitedReader, ErrorPolicy, JsonReader, SourceKind};

use crate::config::{CacheConfig, SourceSpec};
use crate::error::{Error, Result};
use crate::storage::{Marker, Storage};

/// Options for a single load call
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Bypass cached entries even if the marker is unchanged
    pub force_refresh: bool,

    /// Declared column types, overriding the source's configured schema
    pub schema: Option<Arc<Schema>>,

    /// Row policy, overriding the configured default
    pub on_error: Option<ErrorPolicy>,
}

impl LoadOptions {
    /// Options that bypass the cache
    pub fn force_refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }
}

/// Counter snapshot from a [`TableCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Loads served from a published entry
    pub hits: u64,

    /// Loads that performed a storage read
    pub misses: u64,

    /// Loads that attached to another caller's in-flight read
    pub coalesced: u64,

    /// Entries removed by supersession, invalidation or the ceiling
    pub evictions: u64,

    /// Invalidate calls
    pub invalidations: u64,
}

#[derive(Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Cache key: one entry per (source, marker) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    source: String,
    marker: Marker,
}

/// A published table bound to the marker it was read under
struct CacheEntry {
    table: Arc<Table>,

    /// When the payload was read and parsed
    computed_at: Instant,

    /// Cache-clock tick of the last marker confirmation
    checked_at: AtomicU64,

    /// Cache-clock tick of the last serve, for LRU eviction
    last_used: AtomicU64,
}

/// Shared handle for one in-flight load
///
/// Late arrivals for the same key block here instead of starting a
/// second storage read; the loader publishes one shared result.
struct Inflight {
    result: Mutex<Option<Result<Arc<Table>>>>,
    done: Condvar,
}

impl Inflight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<Arc<Table>> {
        let mut guard = self.result.lock().unwrap();
        while guard.is_none() {
            guard = self.done.wait(guard).unwrap();
        }
        guard.as_ref().cloned().unwrap_or_else(|| {
            unreachable!("in-flight result checked above")
        })
    }

    fn publish(&self, result: Result<Arc<Table>>) {
        *self.result.lock().unwrap() = Some(result);
        self.done.notify_all();
    }
}

struct InflightSlot {
    /// Source generation the load started under; bumped by invalidate
    generation: u64,
    handle: Arc<Inflight>,
}

#[derive(Default)]
struct CacheState {
    /// Published entries by (source, marker)
    entries: HashMap<EntryKey, Arc<CacheEntry>>,

    /// Most recent successful entry per source
    latest: HashMap<String, EntryKey>,

    /// Schema of the most recent successful load per source; survives
    /// eviction and invalidation
    schemas: HashMap<String, Arc<Schema>>,

    /// One slot per key with a storage read in progress
    inflight: HashMap<EntryKey, InflightSlot>,

    /// Invalidation generation per source
    generations: HashMap<String, u64>,
}

/// What a load call decided to do while holding the registry lock
enum Plan {
    Serve(Arc<Table>),
    Attach(Arc<Inflight>),
    Read { handle: Arc<Inflight>, generation: u64 },
}

/// The data loader/cache
///
/// Owns every published entry. Constructed explicitly with its
/// configuration and storage so tests and embedders build isolated
/// instances; there is no process-global cache.
pub struct TableCache {
    config: CacheConfig,
    storage: Arc<dyn Storage>,
    state: Mutex<CacheState>,
    stats: StatCounters,
    epoch: Instant,
}

impl TableCache {
    /// Create a cache over the given storage
    pub fn new(config: CacheConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            state: Mutex::new(CacheState::default()),
            stats: StatCounters::default(),
            epoch: Instant::now(),
        }
    }

    /// The configuration this cache was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Number of published entries
    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Load a source, from cache when possible
    ///
    /// Checks the source's modification marker and serves the published
    /// entry for that exact marker when one exists; otherwise reads and
    /// parses the payload, publishes the result and returns it. While
    /// the marker is unchanged the payload is read at most once, and
    /// concurrent calls for the same (source, marker) share one read.
    pub fn load(&self, source: &str, options: &LoadOptions) -> Result<Arc<Table>> {
        let spec = self
            .config
            .source(source)
            .ok_or_else(|| Error::source_not_found(source, "not a configured source"))?;

        let ttl = self.config.cache_ttl();
        if !options.force_refresh && !ttl.is_zero() {
            if let Some(table) = self.serve_within_ttl(source, ttl) {
                debug!(source, "cache hit within ttl window");
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(table);
            }
        }

        // Cheap freshness probe; never reads the payload.
        let marker = self.resolve_marker(source, spec)?;
        let key = EntryKey {
            source: source.to_string(),
            marker,
        };

        let plan = self.plan(&key, options.force_refresh);
        match plan {
            Plan::Serve(table) => {
                debug!(source, "cache hit, marker unchanged");
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(table)
            }
            Plan::Attach(handle) => {
                debug!(source, "attaching to in-flight load");
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                handle.wait()
            }
            Plan::Read { handle, generation } => {
                debug!(source, marker = %key.marker, "cache miss, reading payload");
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                let result = self
                    .read_and_parse(source, spec, options)
                    .map(Arc::new);
                self.finish(&key, generation, &handle, result)
            }
        }
    }

    /// Remove every entry for a source, forcing the next load to
    /// re-read storage
    ///
    /// Idempotent; invalidating an absent source is a no-op. Does not
    /// block on in-flight loads: bumping the source's generation stops
    /// their results from being published, without cancelling the read.
    pub fn invalidate(&self, source: &str) {
        let mut state = self.state.lock().unwrap();
        *state.generations.entry(source.to_string()).or_insert(0) += 1;

        let stale: Vec<EntryKey> = state
            .entries
            .keys()
            .filter(|key| key.source == source)
            .cloned()
            .collect();
        let removed = stale.len();
        for key in stale {
            state.entries.remove(&key);
        }
        state.latest.remove(source);

        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        debug!(source, removed, "invalidated");
    }

    /// Schema of the most recent successful load, without loading
    pub fn schema_of(&self, source: &str) -> Option<Arc<Schema>> {
        self.state.lock().unwrap().schemas.get(source).cloned()
    }

    /// Serve the latest entry if its marker was confirmed recently
    fn serve_within_ttl(&self, source: &str, ttl: Duration) -> Option<Arc<Table>> {
        let state = self.state.lock().unwrap();
        let key = state.latest.get(source)?;
        let entry = state.entries.get(key)?;

        let now = self.tick();
        let checked = entry.checked_at.load(Ordering::Relaxed);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(checked) < ttl_ms {
            entry.last_used.store(now, Ordering::Relaxed);
            Some(entry.table.clone())
        } else {
            None
        }
    }

    /// Decide, under the registry lock, whether to serve, attach or read
    fn plan(&self, key: &EntryKey, force_refresh: bool) -> Plan {
        let mut state = self.state.lock().unwrap();
        let generation = *state
            .generations
            .entry(key.source.clone())
            .or_insert(0);

        if !force_refresh {
            if let Some(entry) = state.entries.get(key) {
                let now = self.tick();
                entry.checked_at.store(now, Ordering::Relaxed);
                entry.last_used.store(now, Ordering::Relaxed);
                return Plan::Serve(entry.table.clone());
            }
        }

        match state.inflight.get(key) {
            // A force refresh may still attach: the in-flight read is
            // itself fresh.
            Some(slot) if slot.generation == generation => Plan::Attach(slot.handle.clone()),
            _ => {
                let handle = Arc::new(Inflight::new());
                state.inflight.insert(
                    key.clone(),
                    InflightSlot {
                        generation,
                        handle: handle.clone(),
                    },
                );
                Plan::Read { handle, generation }
            }
        }
    }

    /// Publish a finished load to waiters and, when still current, to
    /// the cache
    fn finish(
        &self,
        key: &EntryKey,
        generation: u64,
        handle: &Arc<Inflight>,
        result: Result<Arc<Table>>,
    ) -> Result<Arc<Table>> {
        {
            let mut state = self.state.lock().unwrap();

            // Only this load's own slot is removed; a newer slot for
            // the same key belongs to someone else.
            if let Some(slot) = state.inflight.get(key) {
                if Arc::ptr_eq(&slot.handle, handle) {
                    state.inflight.remove(key);
                }
            }

            if let Ok(table) = &result {
                let current = state.generations.get(&key.source).copied().unwrap_or(0);
                if current == generation {
                    self.publish_entry(&mut state, key, table.clone());
                } else {
                    debug!(source = %key.source, "invalidated mid-flight; result not cached");
                }
            }
        }

        handle.publish(result.clone());
        result
    }

    /// Insert a new entry, superseding prior markers for the source and
    /// enforcing the entry ceiling
    fn publish_entry(&self, state: &mut CacheState, key: &EntryKey, table: Arc<Table>) {
        let superseded: Vec<EntryKey> = state
            .entries
            .keys()
            .filter(|k| k.source == key.source && *k != key)
            .cloned()
            .collect();
        for old in superseded {
            if let Some(entry) = state.entries.remove(&old) {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    source = %old.source,
                    age_ms = entry.computed_at.elapsed().as_millis() as u64,
                    "evicted superseded entry"
                );
            }
        }

        let now = self.tick();
        state.schemas.insert(key.source.clone(), table.schema().clone());
        state.entries.insert(
            key.clone(),
            Arc::new(CacheEntry {
                table,
                computed_at: Instant::now(),
                checked_at: AtomicU64::new(now),
                last_used: AtomicU64::new(now),
            }),
        );
        state.latest.insert(key.source.clone(), key.clone());

        self.enforce_ceiling(state);
    }

    /// LRU eviction down to the configured ceiling
    ///
    /// Entries that are no longer the latest for their source go first;
    /// when every entry is a source's latest, plain LRU applies.
    fn enforce_ceiling(&self, state: &mut CacheState) {
        let max = self.config.max_cache_entries;
        if max == 0 {
            return;
        }

        while state.entries.len() > max {
            let victim = state
                .entries
                .iter()
                .filter(|(k, _)| state.latest.get(&k.source) != Some(*k))
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
                .or_else(|| {
                    state
                        .entries
                        .iter()
                        .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                        .map(|(k, _)| k.clone())
                });

            match victim {
                Some(key) => {
                    state.entries.remove(&key);
                    if state.latest.get(&key.source) == Some(&key) {
                        state.latest.remove(&key.source);
                    }
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                    debug!(source = %key.source, "evicted at capacity");
                }
                None => break,
            }
        }
    }

    /// Resolve the source's current marker, retrying transient errors
    fn resolve_marker(&self, source: &str, spec: &SourceSpec) -> Result<Marker> {
        if !self.storage.exists(&spec.path) {
            return Err(Error::source_not_found(
                source,
                format!("{} does not exist", spec.path.display()),
            ));
        }
        self.with_retry(source, || self.storage.modification_marker(&spec.path))
    }

    /// Read the payload and normalize it into a table
    fn read_and_parse(
        &self,
        source: &str,
        spec: &SourceSpec,
        options: &LoadOptions,
    ) -> Result<Table> {
        let payload = self.with_retry(source, || self.storage.read_payload(&spec.path))?;

        let declared = match &options.schema {
            Some(schema) => Some(schema.clone()),
            None => spec
                .declared_schema()
                .map_err(|e| Error::schema_violation(source, e))?,
        };
        let policy = options.on_error.unwrap_or(self.config.default_on_error);

        let kind = spec
            .kind
            .or_else(|| detect_kind(&spec.path))
            .ok_or_else(|| Error::source_not_found(source, "cannot determine source kind"))?;

        let parsed = match kind {
            SourceKind::Csv | SourceKind::Tsv => {
                let mut reader_options = kind.delimited_options().unwrap_or_default();
                if let Some(has_header) = spec.has_header {
                    reader_options.has_header = has_header;
                }
                DelimitedReader::new(reader_options).read_bytes(&payload, declared.as_ref(), policy)
            }
            SourceKind::Json => JsonReader::new().read_bytes(&payload, declared.as_ref(), policy),
        };

        parsed.map_err(|e| match e {
            // A violated table invariant is a loader bug, not bad data.
            tabsource_readers::Error::Core(core @ tabsource_core::Error::Corrupt { .. }) => {
                Error::CacheCorruption(core.to_string())
            }
            // Malformed data is never retried.
            other => Error::schema_violation(source, other),
        })
    }

    /// Run a storage operation with bounded exponential backoff
    fn with_retry<T>(
        &self,
        source: &str,
        mut op: impl FnMut() -> std::io::Result<T>,
    ) -> Result<T> {
        let bound = self.config.retry.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.config.retry.backoff_ms);

        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= bound {
                        return Err(Error::source_not_found(source, e));
                    }
                    warn!(source, attempt, error = %e, "storage error, retrying");
                    thread::sleep(delay);
                    delay = delay.saturating_mul(2);
                }
            }
        }
    }

    /// Milliseconds since this cache was constructed
    fn tick(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Barrier;

    use tabsource_core::{ColumnType, Field, Value};

    use crate::storage::testing::MemStorage;

    const RATINGS_CSV: &[u8] = b"id,name,score\n1,Alice,10.5\n2,Bob,20.1\n3,Charlie,30.9\n";

    /// Cache over an in-memory storage with one CSV source named "ratings"
    fn ratings_cache(ttl_secs: u64) -> (Arc<TableCache>, Arc<MemStorage>) {
        let storage = Arc::new(MemStorage::new());
        storage.insert("ratings.csv", RATINGS_CSV);

        let config = CacheConfig {
            cache_ttl_secs: ttl_secs,
            retry: crate::config::RetryConfig {
                max_attempts: 3,
                backoff_ms: 1,
            },
            ..CacheConfig::default()
        }
        .with_source("ratings", SourceSpec::new("ratings.csv"));

        let cache = Arc::new(TableCache::new(config, storage.clone()));
        (cache, storage)
    }

    #[test]
    fn test_round_trip_typed_table() {
        let (cache, _) = ratings_cache(0);
        let table = cache.load("ratings", &LoadOptions::default()).unwrap();

        assert_eq!(table.num_rows(), 3);
        let schema = table.schema();
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(0).column_type(), ColumnType::Int);
        assert_eq!(schema.field(1).column_type(), ColumnType::String);
        assert_eq!(schema.field(2).column_type(), ColumnType::Float);
        assert_eq!(table.get(2, "score").unwrap(), &Value::Float(30.9));
    }

    #[test]
    fn test_unchanged_marker_reads_payload_once() {
        let (cache, storage) = ratings_cache(0);

        let first = cache.load("ratings", &LoadOptions::default()).unwrap();
        let second = cache.load("ratings", &LoadOptions::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.payload_reads(), 1);
        // ttl 0: the marker is re-checked on every load
        assert_eq!(storage.marker_reads(), 2);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_ttl_window_skips_marker_check() {
        let (cache, storage) = ratings_cache(3600);

        cache.load("ratings", &LoadOptions::default()).unwrap();
        cache.load("ratings", &LoadOptions::default()).unwrap();
        cache.load("ratings", &LoadOptions::default()).unwrap();

        assert_eq!(storage.payload_reads(), 1);
        assert_eq!(storage.marker_reads(), 1);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_marker_change_supersedes_entry() {
        let (cache, storage) = ratings_cache(0);

        let before = cache.load("ratings", &LoadOptions::default()).unwrap();
        storage.insert("ratings.csv", b"id,name,score\n9,Zoe,1.0\n".as_slice());
        let after = cache.load("ratings", &LoadOptions::default()).unwrap();

        assert_eq!(storage.payload_reads(), 2);
        assert_eq!(before.num_rows(), 3);
        assert_eq!(after.num_rows(), 1);
        assert_eq!(after.get(0, "name").unwrap(), &Value::from("Zoe"));
        // one entry per source: the superseded marker was evicted
        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_invalidate_forces_fresh_read() {
        let (cache, storage) = ratings_cache(3600);

        cache.load("ratings", &LoadOptions::default()).unwrap();
        cache.invalidate("ratings");
        assert_eq!(cache.entry_count(), 0);

        cache.load("ratings", &LoadOptions::default()).unwrap();
        assert_eq!(storage.payload_reads(), 2);
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (cache, storage) = ratings_cache(3600);

        cache.load("ratings", &LoadOptions::default()).unwrap();
        cache.invalidate("ratings");
        cache.invalidate("ratings");
        cache.invalidate("never-loaded");

        cache.load("ratings", &LoadOptions::default()).unwrap();
        assert_eq!(storage.payload_reads(), 2);
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_force_refresh_rereads() {
        let (cache, storage) = ratings_cache(3600);

        cache.load("ratings", &LoadOptions::default()).unwrap();
        cache.load("ratings", &LoadOptions::force_refresh()).unwrap();

        assert_eq!(storage.payload_reads(), 2);
    }

    #[test]
    fn test_unknown_source() {
        let (cache, _) = ratings_cache(0);
        let err = cache.load("nope", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }

    #[test]
    fn test_missing_file_fails_without_retry() {
        let storage = Arc::new(MemStorage::new());
        let config =
            CacheConfig::default().with_source("ghost", SourceSpec::new("ghost.csv"));
        let cache = TableCache::new(config, storage.clone());

        let err = cache.load("ghost", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
        assert_eq!(storage.marker_reads(), 0);
    }

    #[test]
    fn test_transient_fault_is_retried() {
        let (cache, storage) = ratings_cache(0);
        storage.fail_next_payloads(1);

        let table = cache.load("ratings", &LoadOptions::default()).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(storage.payload_reads(), 2);
    }

    #[test]
    fn test_retry_bound_exhausted() {
        let (cache, storage) = ratings_cache(0);
        storage.fail_next_markers(10);

        let err = cache.load("ratings", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
        assert_eq!(storage.marker_reads(), 3);
    }

    #[test]
    fn test_schema_of_without_loading() {
        let (cache, storage) = ratings_cache(3600);
        assert!(cache.schema_of("ratings").is_none());

        cache.load("ratings", &LoadOptions::default()).unwrap();
        let schema = cache.schema_of("ratings").unwrap();
        assert_eq!(schema.field_by_name("score").unwrap().column_type(), ColumnType::Float);
        let marker_reads = storage.marker_reads();

        // invalidation clears entries but not schema knowledge, and
        // schema_of never triggers a load
        cache.invalidate("ratings");
        assert!(cache.schema_of("ratings").is_some());
        assert_eq!(storage.marker_reads(), marker_reads);
    }

    #[test]
    fn test_partial_and_raise_policies() {
        let storage = Arc::new(MemStorage::new());
        storage.insert(
            "rows.csv",
            b"id,v\n1,a\n2,b\nbad,c\n4,d\n5,e\n".as_slice(),
        );

        let spec = SourceSpec::new("rows.csv").with_schema(vec![
            Field::new("id", ColumnType::Int),
            Field::new("v", ColumnType::String),
        ]);
        let config = CacheConfig {
            cache_ttl_secs: 0,
            ..CacheConfig::default()
        }
        .with_source("rows", spec);
        let cache = TableCache::new(config, storage);

        let err = cache.load("rows", &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));

        let options = LoadOptions {
            on_error: Some(ErrorPolicy::Partial),
            ..LoadOptions::default()
        };
        let table = cache.load("rows", &options).unwrap();
        assert_eq!(table.num_rows(), 4);
        assert_eq!(table.dropped_rows(), 1);
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let storage = Arc::new(MemStorage::new());
        storage.insert("rows.csv", b"id\nbad\n".as_slice());

        let spec = SourceSpec::new("rows.csv")
            .with_schema(vec![Field::new("id", ColumnType::Int)]);
        let config = CacheConfig::default().with_source("rows", spec);
        let cache = TableCache::new(config, storage);

        assert!(cache.load("rows", &LoadOptions::default()).is_err());
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.schema_of("rows").is_none());
    }

    #[test]
    fn test_json_source_via_kind_detection() {
        let storage = Arc::new(MemStorage::new());
        storage.insert(
            "events.ndjson",
            b"{\"kind\": \"view\", \"count\": 3}\n{\"kind\": \"click\", \"count\": 1}\n".as_slice(),
        );

        let config = CacheConfig::default()
            .with_source("events", SourceSpec::new("events.ndjson"));
        let cache = TableCache::new(config, storage);

        let table = cache.load("events", &LoadOptions::default()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.schema().field_by_name("count").unwrap().column_type(),
            ColumnType::Int
        );
    }

    #[test]
    fn test_lru_ceiling() {
        let storage = Arc::new(MemStorage::new());
        let mut config = CacheConfig {
            cache_ttl_secs: 3600,
            max_cache_entries: 2,
            ..CacheConfig::default()
        };
        for name in ["a", "b", "c"] {
            let path = PathBuf::from(format!("{name}.csv"));
            storage.insert(path.clone(), b"x\n1\n".as_slice());
            config = config.with_source(name, SourceSpec::new(path));
        }
        let cache = TableCache::new(config, storage);

        cache.load("a", &LoadOptions::default()).unwrap();
        cache.load("b", &LoadOptions::default()).unwrap();
        cache.load("c", &LoadOptions::default()).unwrap();

        assert_eq!(cache.entry_count(), 2);
        assert!(cache.stats().evictions >= 1);
    }

    #[test]
    fn test_concurrent_loads_share_one_read() {
        let (cache, storage) = ratings_cache(0);
        storage.set_payload_delay(Duration::from_millis(50));

        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    cache.load("ratings", &LoadOptions::default())
                })
            })
            .collect();

        let tables: Vec<Arc<Table>> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        assert_eq!(storage.payload_reads(), 1);
        for table in &tables {
            assert_eq!(table, &tables[0]);
        }
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced + stats.hits, workers as u64 - 1);
    }

    #[test]
    fn test_invalidate_during_inflight_is_not_cached() {
        let (cache, storage) = ratings_cache(0);
        storage.set_payload_delay(Duration::from_millis(100));

        let loader = {
            let cache = cache.clone();
            thread::spawn(move || cache.load("ratings", &LoadOptions::default()))
        };

        // let the load reach the payload read, then invalidate under it
        thread::sleep(Duration::from_millis(30));
        cache.invalidate("ratings");

        // the in-flight caller still gets its table
        let table = loader.join().unwrap().unwrap();
        assert_eq!(table.num_rows(), 3);

        // but the result was not published
        assert_eq!(cache.entry_count(), 0);

        storage.set_payload_delay(Duration::ZERO);
        cache.load("ratings", &LoadOptions::default()).unwrap();
        assert_eq!(storage.payload_reads(), 2);
    }
}
