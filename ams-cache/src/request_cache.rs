//! Two-tier request cache.
//!
//! Memory is checked first, then the persistent store; a fresh persisted
//! hit is promoted into memory so the next read never touches the store.
//! Writes go through both tiers. The persistent tier is advisory: anything
//! it fails to do is logged and counted, never returned to the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use ams_core::{CacheEntry, CacheKey};
use chrono::Utc;
use tracing::{debug, warn};

use crate::freshness::{CacheRead, Freshness, ReadSource};
use crate::invalidator::{evict_matching, EvictionReport};
use crate::memory_store::MemoryStore;
use crate::namespace::Namespace;
use crate::traits::{CacheStats, PersistentStore};

/// Payload shared between the memory tier and every reader.
pub type SharedPayload = Arc<serde_json::Value>;

/// Outcome of a write-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteThrough {
    /// Both tiers hold the entry.
    Persisted,
    /// The persistent store rejected the entry; memory still holds it.
    MemoryOnly,
}

#[derive(Debug, Default)]
struct StatsCounters {
    memory_hits: AtomicU64,
    persisted_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    corrupt_entries: AtomicU64,
    persist_failures: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Memory + persistent TTL cache keyed by canonical request URL.
///
/// Constructed once and shared via `Arc`; there is no global instance.
pub struct RequestCache {
    memory: RwLock<HashMap<CacheKey, CacheEntry<SharedPayload>>>,
    store: Arc<dyn PersistentStore>,
    namespace: Namespace,
    stats: StatsCounters,
}

impl RequestCache {
    pub fn new(store: Arc<dyn PersistentStore>, namespace: Namespace) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            store,
            namespace,
            stats: StatsCounters::default(),
        }
    }

    /// Cache backed by a fresh [`MemoryStore`] under the default namespace.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Namespace::default())
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Any entry for `key`, regardless of age.
    ///
    /// Reads memory, then the persistent store, promoting a persisted hit.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<SharedPayload>> {
        if let Some(entry) = self.memory_entry(key) {
            return Some(entry);
        }
        let entry = self.read_persisted(key)?;
        self.promote(key, entry.clone());
        Some(entry)
    }

    /// An entry for `key` that satisfies `freshness`, from whichever tier has one.
    ///
    /// [`Freshness::Refresh`] never reads the persistent store.
    pub fn get_fresh(
        &self,
        key: &CacheKey,
        freshness: &Freshness,
    ) -> Option<CacheRead<SharedPayload>> {
        let now = Utc::now();

        if let Some(entry) = self.memory_entry(key) {
            if freshness.accepts(entry.age_at(now)) {
                StatsCounters::bump(&self.stats.memory_hits);
                debug!(key = %key, "memory cache hit");
                return Some(CacheRead::from_cache(
                    entry.payload,
                    entry.timestamp,
                    ReadSource::Memory,
                ));
            }
        }

        if freshness.forces_refresh() {
            StatsCounters::bump(&self.stats.misses);
            return None;
        }

        match self.read_persisted(key) {
            Some(entry) if freshness.accepts(entry.age_at(now)) => {
                StatsCounters::bump(&self.stats.persisted_hits);
                debug!(key = %key, "persistent cache hit");
                self.promote(key, entry.clone());
                Some(CacheRead::from_cache(
                    entry.payload,
                    entry.timestamp,
                    ReadSource::Persistent,
                ))
            }
            _ => {
                StatsCounters::bump(&self.stats.misses);
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Whether the memory tier holds `key`, without touching the store.
    pub fn contains_in_memory(&self, key: &CacheKey) -> bool {
        self.memory
            .read()
            .map(|memory| memory.contains_key(key))
            .unwrap_or(false)
    }

    /// Whether the persistent tier holds a raw value for `key`.
    pub fn contains_persisted(&self, key: &CacheKey) -> bool {
        matches!(self.store.get(&self.namespace.scoped(key)), Ok(Some(_)))
    }

    fn memory_entry(&self, key: &CacheKey) -> Option<CacheEntry<SharedPayload>> {
        self.memory.read().ok()?.get(key).cloned()
    }

    /// Decode the persisted entry for `key`. Corrupt or unreadable entries are misses.
    fn read_persisted(&self, key: &CacheKey) -> Option<CacheEntry<SharedPayload>> {
        let raw = match self.store.get(&self.namespace.scoped(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "persistent cache read failed");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<serde_json::Value>>(&raw) {
            Ok(entry) => Some(entry.map(Arc::new)),
            Err(e) => {
                StatsCounters::bump(&self.stats.corrupt_entries);
                debug!(key = %key, error = %e, "ignoring corrupt persisted entry");
                None
            }
        }
    }

    fn promote(&self, key: &CacheKey, entry: CacheEntry<SharedPayload>) {
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key.clone(), entry);
            StatsCounters::bump(&self.stats.promotions);
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Write `entry` through both tiers, replacing whatever was there.
    pub fn put(&self, key: &CacheKey, entry: CacheEntry<SharedPayload>) -> WriteThrough {
        let outcome = match self.persist(key, &entry) {
            Ok(()) => WriteThrough::Persisted,
            Err(e) => {
                StatsCounters::bump(&self.stats.persist_failures);
                warn!(key = %key, error = %e, "persistent cache write failed, keeping memory copy");
                WriteThrough::MemoryOnly
            }
        };

        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key.clone(), entry);
        }
        outcome
    }

    fn persist(
        &self,
        key: &CacheKey,
        entry: &CacheEntry<SharedPayload>,
    ) -> Result<(), ams_core::PersistenceError> {
        let store_key = self.namespace.scoped(key);
        let raw = serde_json::to_string(entry).map_err(|e| {
            ams_core::PersistenceError::Serialization {
                key: store_key.clone(),
                reason: e.to_string(),
            }
        })?;
        self.store.set(&store_key, &raw)
    }

    /// Drop `key` from both tiers.
    pub fn remove(&self, key: &CacheKey) {
        self.remove_from_memory(key);
        if let Err(e) = self.store.remove(&self.namespace.scoped(key)) {
            warn!(key = %key, error = %e, "persistent cache remove failed");
        }
    }

    pub(crate) fn remove_from_memory(&self, key: &CacheKey) -> bool {
        self.memory
            .write()
            .map(|mut memory| memory.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Keys currently held in memory.
    pub fn memory_keys(&self) -> Vec<CacheKey> {
        self.memory
            .read()
            .map(|memory| memory.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Forget the memory tier, as a process restart would.
    pub fn reset(&self) {
        if let Ok(mut memory) = self.memory.write() {
            memory.clear();
        }
    }

    /// Remove every entry from memory and every namespaced persisted entry.
    pub fn clear(&self) -> EvictionReport {
        evict_matching(self, "")
    }

    pub fn stats(&self) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            memory_hits: load(&self.stats.memory_hits),
            persisted_hits: load(&self.stats.persisted_hits),
            misses: load(&self.stats.misses),
            promotions: load(&self.stats.promotions),
            corrupt_entries: load(&self.stats.corrupt_entries),
            persist_failures: load(&self.stats.persist_failures),
            memory_entries: self
                .memory
                .read()
                .map(|memory| memory.len() as u64)
                .unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("namespace", &self.namespace.prefix())
            .field("stats", &self.stats())
            .finish()
    }
}
