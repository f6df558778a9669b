//! AMS Cache - Two-Tier Request Cache and Request Coalescing
//!
//! Responses are cached under their canonical request URL in a memory tier
//! and a persistent tier. Persisted keys live under a versioned namespace
//! (default `ams.apiCache.v1:`) so a format change abandons old entries.
//!
//! # Explicit Freshness
//!
//! Staleness is judged at read time against the caller's [`Freshness`],
//! never at write time. Reads return [`CacheRead<T>`], which carries the
//! serving tier and the entry's age.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(RequestCache::in_memory());
//! let key = CacheKey::new("/api/PVCI/kpis/overall");
//!
//! if let Some(read) = cache.get_fresh(&key, &Freshness::from_ttl_ms(15 * 60 * 1000)) {
//!     println!("served from {:?}, {:?} old", read.source(), read.staleness());
//! }
//!
//! // Manual refresh
//! CacheInvalidator::new(cache.clone()).evict("/api/PVCI/");
//! ```

pub mod freshness;
pub mod in_flight;
pub mod invalidator;
pub mod lmdb_store;
pub mod memory_store;
pub mod namespace;
pub mod request_cache;
pub mod traits;

pub use freshness::{CacheRead, Freshness, ReadSource};
pub use in_flight::{InFlightRegistry, Registration, SharedOperation};
pub use invalidator::{CacheInvalidator, EvictionReport};
pub use lmdb_store::{LmdbStore, LmdbStoreError};
pub use memory_store::MemoryStore;
pub use namespace::{Namespace, DEFAULT_NAMESPACE};
pub use request_cache::{RequestCache, SharedPayload, WriteThrough};
pub use traits::{CacheStats, PersistentStore};
