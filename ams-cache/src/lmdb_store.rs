//! LMDB-backed persistent store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cached API
//! responses across process restarts. Keys and values are UTF-8 strings;
//! the map size doubles as the storage quota, so a full map surfaces as
//! [`PersistenceError::QuotaExceeded`] rather than a generic failure.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and `keys`
//! - Write transactions for `set` and `remove`

use std::path::Path;

use ams_core::PersistenceError;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};

use crate::traits::PersistentStore;

/// Error type for opening an LMDB store.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for PersistenceError {
    fn from(e: LmdbStoreError) -> Self {
        PersistenceError::Backend {
            reason: e.to_string(),
        }
    }
}

/// LMDB-backed [`PersistentStore`].
///
/// # Example
///
/// ```ignore
/// use ams_cache::{LmdbStore, Namespace, RequestCache};
/// use std::sync::Arc;
///
/// let store = LmdbStore::open("/var/cache/ams", 64)?;
/// let cache = RequestCache::new(Arc::new(store), Namespace::default());
/// ```
pub struct LmdbStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbStore {
    /// Open (or create) a store under `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn backend_error(e: heed::Error) -> PersistenceError {
        PersistenceError::Backend {
            reason: e.to_string(),
        }
    }

    fn write_error(key: &str, needed: usize, e: heed::Error) -> PersistenceError {
        match e {
            heed::Error::Mdb(MdbError::MapFull) => PersistenceError::QuotaExceeded {
                key: key.to_string(),
                needed,
                available: 0,
            },
            other => Self::backend_error(other),
        }
    }
}

impl PersistentStore for LmdbStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let rtxn = self.env.read_txn().map_err(Self::backend_error)?;
        let value = self.db.get(&rtxn, key).map_err(Self::backend_error)?;
        Ok(value.map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        let needed = key.len() + value.len();
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| Self::write_error(key, needed, e))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| Self::write_error(key, needed, e))?;

        wtxn.commit().map_err(|e| Self::write_error(key, needed, e))
    }

    fn remove(&self, key: &str) -> Result<bool, PersistenceError> {
        let mut wtxn = self.env.write_txn().map_err(Self::backend_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(Self::backend_error)?;
        wtxn.commit().map_err(Self::backend_error)?;
        Ok(deleted)
    }

    fn keys(&self) -> Result<Vec<String>, PersistenceError> {
        let rtxn = self.env.read_txn().map_err(Self::backend_error)?;
        let iter = self.db.iter(&rtxn).map_err(Self::backend_error)?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => keys.push(key.to_string()),
                Err(_) => continue,
            }
        }
        Ok(keys)
    }
}

impl std::fmt::Debug for LmdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbStore")
            .field("path", &self.env.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (store, _temp_dir) = create_test_store();
        store
            .set("ams.apiCache.v1:/a", r#"{"timestamp":1,"payload":null}"#)
            .expect("set should succeed");

        let value = store.get("ams.apiCache.v1:/a").expect("get should succeed");
        assert_eq!(value.as_deref(), Some(r#"{"timestamp":1,"payload":null}"#));
    }

    #[test]
    fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        assert_eq!(store.get("missing").expect("get should succeed"), None);
    }

    #[test]
    fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", "old").expect("set should succeed");
        store.set("k", "new").expect("set should succeed");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("new"));
    }

    #[test]
    fn test_remove() {
        let (store, _temp_dir) = create_test_store();
        store.set("k", "v").expect("set should succeed");
        assert!(store.remove("k").expect("remove should succeed"));
        assert!(!store.remove("k").expect("remove should succeed"));
        assert_eq!(store.get("k").expect("get"), None);
    }

    #[test]
    fn test_keys_with_prefix_scan() {
        let (store, _temp_dir) = create_test_store();
        store.set("ns:/overall?x=1", "1").expect("set");
        store.set("ns:/overall?x=2", "2").expect("set");
        store.set("other:/overall", "3").expect("set");

        let keys = store.keys_with_prefix("ns:").expect("scan should succeed");
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.starts_with("ns:")));
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbStore::open(temp_dir.path(), 10).expect("open");
            store.set("k", "persisted").expect("set");
        }
        let store = LmdbStore::open(temp_dir.path(), 10).expect("reopen");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("persisted"));
    }
}
