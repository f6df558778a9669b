//! Canonical request keys.
//!
//! A [`CacheKey`] is the request path plus its query parameters in a fixed
//! order, so two callers asking for the same data always land on the same
//! cache slot and the same in-flight request. The path always comes first,
//! which lets a bare path act as an eviction prefix for every parameter
//! variant of that endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonicalized request URL (path + query), relative to the backend base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a request with no query parameters.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Start building a key with query parameters.
    pub fn builder(path: impl Into<String>) -> CacheKeyBuilder {
        CacheKeyBuilder {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Wrap an already-canonical key, e.g. one read back from a store.
    pub fn from_canonical(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component, without the query string.
    pub fn path(&self) -> &str {
        match self.0.split_once('?') {
            Some((path, _)) => path,
            None => &self.0,
        }
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.0.split_once('?').map(|(_, query)| query)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builder collecting query parameters before canonicalization.
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    path: String,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Add a parameter only when a value is present.
    pub fn opt_param<V: fmt::Display>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Sort parameters by name and encode them into the final key.
    ///
    /// The sort is stable, so repeated names keep their insertion order.
    pub fn build(mut self) -> CacheKey {
        if self.params.is_empty() {
            return CacheKey(self.path);
        }

        self.params.sort_by(|a, b| a.0.cmp(&b.0));
        let query = self
            .params
            .iter()
            .map(|(name, value)| {
                format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&");

        CacheKey(format!("{}?{}", self.path, query))
    }
}
