//! Freshness contracts for cache reads.
//!
//! TTL is not stored with an entry. Each caller states how old a cached
//! payload it is willing to accept, so the same physical entry can be fresh
//! for one caller and stale for another.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Staleness tolerance supplied by the caller at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Accept cached data strictly younger than `max_age`.
    MaxAge {
        /// Oldest acceptable entry age.
        max_age: Duration,
    },

    /// Skip both cache tiers and go to the network.
    ///
    /// The request is still coalesced with any identical request already in
    /// flight, and the result still refreshes the cache.
    Refresh,
}

impl Freshness {
    /// Accept entries younger than `max_age`. A zero age means [`Freshness::Refresh`].
    pub fn max_age(max_age: Duration) -> Self {
        if max_age.is_zero() {
            Self::Refresh
        } else {
            Self::MaxAge { max_age }
        }
    }

    /// Build from a signed millisecond TTL; `ttl_ms <= 0` forces a refresh.
    pub fn from_ttl_ms(ttl_ms: i64) -> Self {
        if ttl_ms <= 0 {
            Self::Refresh
        } else {
            Self::max_age(Duration::from_millis(ttl_ms as u64))
        }
    }

    pub fn refresh() -> Self {
        Self::Refresh
    }

    pub fn forces_refresh(&self) -> bool {
        matches!(self, Self::Refresh)
    }

    /// The TTL, or zero for [`Freshness::Refresh`].
    pub fn ttl(&self) -> Duration {
        match self {
            Self::MaxAge { max_age } => *max_age,
            Self::Refresh => Duration::ZERO,
        }
    }

    /// Whether an entry of the given age may be served.
    pub fn accepts(&self, age: Duration) -> bool {
        match self {
            Self::MaxAge { max_age } => age < *max_age,
            Self::Refresh => false,
        }
    }
}

impl From<Duration> for Freshness {
    fn from(ttl: Duration) -> Self {
        Self::max_age(ttl)
    }
}

/// Where a read was ultimately served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadSource {
    Memory,
    Persistent,
    Network,
}

/// Result of a cache-aware read, carrying staleness metadata.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    /// The payload.
    value: T,
    /// When the payload was fetched from the network.
    cached_at: DateTime<Utc>,
    /// Which tier answered.
    source: ReadSource,
    /// Whether this caller piggybacked on someone else's network call.
    joined: bool,
}

impl<T> CacheRead<T> {
    /// A read served from one of the cache tiers.
    pub fn from_cache(value: T, cached_at: DateTime<Utc>, source: ReadSource) -> Self {
        Self {
            value,
            cached_at,
            source,
            joined: false,
        }
    }

    /// A read that required a network call.
    pub fn from_network(value: T, cached_at: DateTime<Utc>, joined: bool) -> Self {
        Self {
            value,
            cached_at,
            source: ReadSource::Network,
            joined,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> DateTime<Utc> {
        self.cached_at
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source != ReadSource::Network
    }

    /// True when this caller joined an in-flight request instead of issuing one.
    pub fn joined_in_flight(&self) -> bool {
        self.joined
    }

    /// Time since the payload was fetched.
    pub fn staleness(&self) -> Duration {
        Utc::now()
            .signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            source: self.source,
            joined: self.joined,
        }
    }

    /// Fallible [`CacheRead::map`], used to decode a shared payload into a schema.
    pub fn try_map<U, E, F>(self, f: F) -> Result<CacheRead<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(CacheRead {
            value: f(self.value)?,
            cached_at: self.cached_at,
            source: self.source,
            joined: self.joined,
        })
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
