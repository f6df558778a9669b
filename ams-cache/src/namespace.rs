//! Versioned key namespace for the persistent tier.
//!
//! Persisted keys look like `ams.apiCache.v1:/api/PVCI/kpis/overall?...`.
//! Bumping the version abandons every entry written in an older format
//! without having to migrate or delete it.

use ams_core::CacheKey;

/// Default namespace for persisted API responses.
pub const DEFAULT_NAMESPACE: &str = "ams.apiCache.v1:";

/// Prefix applied to every key the cache writes to its persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<app>.apiCache.v<version>:`
    pub fn versioned(app: &str, version: u32) -> Self {
        Self::new(format!("{}.apiCache.v{}:", app, version))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Store key for a cache key.
    pub fn scoped(&self, key: &CacheKey) -> String {
        self.scoped_prefix(key.as_str())
    }

    /// Store-key prefix selecting every cache key that starts with `prefix`.
    pub fn scoped_prefix(&self, prefix: &str) -> String {
        format!("{}{}", self.prefix, prefix)
    }

    /// Recover the cache key from a store key, if it belongs to this namespace.
    pub fn strip(&self, store_key: &str) -> Option<CacheKey> {
        store_key
            .strip_prefix(&self.prefix)
            .map(CacheKey::from_canonical)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_and_strip_roundtrip() {
        let ns = Namespace::default();
        let key = CacheKey::new("/api/PVCI/kpis/overall");
        let stored = ns.scoped(&key);

        assert_eq!(stored, "ams.apiCache.v1:/api/PVCI/kpis/overall");
        assert_eq!(ns.strip(&stored), Some(key));
    }

    #[test]
    fn test_other_versions_are_foreign() {
        let v1 = Namespace::versioned("ams", 1);
        let v2 = Namespace::versioned("ams", 2);
        let stored = v1.scoped(&CacheKey::new("/x"));

        assert_eq!(v1, Namespace::default());
        assert_eq!(v2.strip(&stored), None);
        assert_eq!(v2.strip("theme"), None);
    }
}
