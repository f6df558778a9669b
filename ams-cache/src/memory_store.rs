//! In-process persistent store.
//!
//! Stands in for a real persistent store in tests and in deployments that
//! do not want anything written to disk. An optional byte quota reproduces
//! the "storage full" failures of size-limited origin stores.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use ams_core::PersistenceError;

use crate::traits::PersistentStore;

/// `BTreeMap`-backed [`PersistentStore`] with read/write counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    /// Maximum total bytes (keys + values) the store accepts.
    quota_bytes: Option<usize>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Number of `get` calls served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of accepted `set` calls so far.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn used_bytes(entries: &BTreeMap<String, String>, excluding: &str) -> usize {
        entries
            .iter()
            .filter(|(key, _)| key.as_str() != excluding)
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let entries = self
            .entries
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;

        if let Some(quota) = self.quota_bytes {
            let used = Self::used_bytes(&entries, key);
            let needed = key.len() + value.len();
            if used + needed > quota {
                return Err(PersistenceError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available: quota.saturating_sub(used),
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, PersistenceError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}
