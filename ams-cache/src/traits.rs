//! Persistent store trait and cache statistics.

use std::sync::Arc;

use ams_core::PersistenceError;

/// Synchronous key/value string store backing the persistent cache tier.
///
/// Every operation reports failure explicitly. The cache treats the store
/// as advisory: read failures become misses and write failures are logged,
/// so an implementation should never panic on quota or I/O problems.
///
/// Keys passed in are already namespaced; implementations may share the
/// underlying storage with unrelated data.
pub trait PersistentStore: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Remove `key`. Returns whether a value was present.
    fn remove(&self, key: &str) -> Result<bool, PersistenceError>;

    /// All keys currently in the store.
    fn keys(&self) -> Result<Vec<String>, PersistenceError>;

    /// Keys starting with `prefix`. The default is a linear scan of [`keys`](Self::keys).
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}

impl<S: PersistentStore + ?Sized> PersistentStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<bool, PersistenceError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        (**self).keys()
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        (**self).keys_with_prefix(prefix)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Fresh reads answered by the memory tier.
    pub memory_hits: u64,
    /// Fresh reads answered by the persistent tier.
    pub persisted_hits: u64,
    /// Reads neither tier could answer.
    pub misses: u64,
    /// Persisted entries copied into memory.
    pub promotions: u64,
    /// Persisted entries that failed to parse and were ignored.
    pub corrupt_entries: u64,
    /// Write-through attempts the persistent store rejected.
    pub persist_failures: u64,
    /// Entries currently held in memory.
    pub memory_entries: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.persisted_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
