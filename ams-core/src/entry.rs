//! Timestamped cache entries.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Timestamp;

/// A payload and the moment it was fetched.
///
/// Entries are replaced wholesale on refresh, never patched in place.
/// The persisted form is `{"timestamp": <unix millis>, "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: Timestamp,
    pub payload: T,
}

impl<T> CacheEntry<T> {
    /// Entry stamped with the current time.
    pub fn new(payload: T) -> Self {
        Self::at(payload, Utc::now())
    }

    pub fn at(payload: T, timestamp: Timestamp) -> Self {
        Self { timestamp, payload }
    }

    /// Age of this entry relative to `now`.
    ///
    /// Entries stamped in the future (clock skew) report zero age.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.timestamp)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            timestamp: self.timestamp,
            payload: f(self.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_wire_format() {
        let ts = chrono::DateTime::from_timestamp_millis(1_700_000_000_123)
            .expect("valid timestamp");
        let entry = CacheEntry::at(json!({"total": 4}), ts);

        let encoded = serde_json::to_value(&entry).expect("serialize should succeed");
        assert_eq!(
            encoded,
            json!({"timestamp": 1_700_000_000_123i64, "payload": {"total": 4}})
        );

        let decoded: CacheEntry<serde_json::Value> =
            serde_json::from_value(encoded).expect("deserialize should succeed");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_age_clamps_future_timestamps() {
        let now = Utc::now();
        let entry = CacheEntry::at((), now + chrono::Duration::seconds(30));
        assert_eq!(entry.age_at(now), Duration::ZERO);
    }

    #[test]
    fn test_age_of_backdated_entry() {
        let now = Utc::now();
        let entry = CacheEntry::at((), now - chrono::Duration::seconds(90));
        assert_eq!(entry.age_at(now), Duration::from_secs(90));
    }
}
