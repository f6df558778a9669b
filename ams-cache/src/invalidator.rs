//! Prefix eviction across both cache tiers.

use std::sync::Arc;

use tracing::{info, warn};

use crate::request_cache::RequestCache;

/// Number of entries an eviction removed from each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub memory: usize,
    pub persisted: usize,
}

impl EvictionReport {
    pub fn total(&self) -> usize {
        self.memory + self.persisted
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Linear scan of both tiers, removing every key that starts with `prefix`.
///
/// Persisted keys are matched inside the cache's namespace only.
pub(crate) fn evict_matching(cache: &RequestCache, prefix: &str) -> EvictionReport {
    let mut report = EvictionReport::default();

    for key in cache.memory_keys() {
        if key.starts_with(prefix) && cache.remove_from_memory(&key) {
            report.memory += 1;
        }
    }

    let store = cache.store();
    let scoped = cache.namespace().scoped_prefix(prefix);
    match store.keys_with_prefix(&scoped) {
        Ok(keys) => {
            for store_key in keys {
                match store.remove(&store_key) {
                    Ok(true) => report.persisted += 1,
                    Ok(false) => {}
                    Err(e) => warn!(key = %store_key, error = %e, "failed to evict persisted entry"),
                }
            }
        }
        Err(e) => warn!(prefix = %scoped, error = %e, "failed to scan persisted entries"),
    }

    report
}

/// Bulk eviction used by manual refresh and forced recompute.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    cache: Arc<RequestCache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<RequestCache>) -> Self {
        Self { cache }
    }

    /// Remove every entry whose key starts with `prefix`, in both tiers.
    ///
    /// The next fetch for any matching key goes to the network.
    pub fn evict(&self, prefix: &str) -> EvictionReport {
        let report = evict_matching(&self.cache, prefix);
        info!(
            prefix,
            memory = report.memory,
            persisted = report.persisted,
            "evicted cached responses"
        );
        report
    }

    /// Remove everything this cache's namespace owns.
    pub fn evict_all(&self) -> EvictionReport {
        self.evict("")
    }
}
