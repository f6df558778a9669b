//! Alarm analytics response schemas and query parameters.
//!
//! Every backend endpoint gets its own type so payloads are validated at the
//! network boundary before anything is cached.

use serde::{Deserialize, Serialize};

use crate::{CacheKey, Timestamp};

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// Common parameters accepted by the alarm analytics GET endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmQuery {
    /// Inclusive start of the analysis window.
    pub start: Option<Timestamp>,
    /// Exclusive end of the analysis window.
    pub end: Option<Timestamp>,
    /// Alarms per 10-minute bucket that counts as a flood.
    pub threshold: Option<u32>,
    /// Number of sources to return for ranked endpoints.
    pub top_n: Option<u32>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Cache-busting tag; bumped by the backend after regeneration.
    pub version: Option<String>,
}

impl AlarmQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(mut self, start: Timestamp, end: Timestamp) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn top_n(mut self, top_n: u32) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Canonical cache key for `path` with these parameters.
    pub fn key_for(&self, path: &str) -> CacheKey {
        CacheKey::builder(path)
            .opt_param("start", self.start.map(|t| t.to_rfc3339()))
            .opt_param("end", self.end.map(|t| t.to_rfc3339()))
            .opt_param("threshold", self.threshold)
            .opt_param("top_n", self.top_n)
            .opt_param("page", self.page)
            .opt_param("page_size", self.page_size)
            .opt_param("v", self.version.as_deref())
            .build()
    }
}

// ============================================================================
// KPI RESPONSES
// ============================================================================

/// Plant-wide alarm KPIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallKpis {
    pub plant: String,
    pub total_alarms: u64,
    pub avg_alarms_per_hour: f64,
    pub avg_alarms_per_10min: f64,
    /// Share of 10-minute buckets above the flood threshold, in percent.
    pub flood_percentage: f64,
    pub peak_alarms_per_10min: u64,
    #[serde(default)]
    pub standing_alarms: u64,
    #[serde(default)]
    pub chattering_alarms: u64,
    #[serde(default)]
    pub generated_at: Option<Timestamp>,
}

/// KPIs for a single alarm source (tag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceKpis {
    pub source: String,
    pub total_alarms: u64,
    #[serde(default)]
    pub flood_count: u64,
    #[serde(default)]
    pub unhealthy_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerSourceKpis {
    pub plant: String,
    pub sources: Vec<SourceKpis>,
}

// ============================================================================
// FLOODS AND BAD ACTORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
}

/// A contiguous period where the alarm rate exceeded the flood threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodWindow {
    pub start: Timestamp,
    pub end: Timestamp,
    pub alarm_count: u64,
    pub peak_rate_per_10min: f64,
    #[serde(default)]
    pub top_sources: Vec<SourceCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodWindows {
    pub plant: String,
    pub threshold: u32,
    pub windows: Vec<FloodWindow>,
}

/// A source responsible for a disproportionate share of alarms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadActor {
    pub source: String,
    pub count: u64,
    /// Share of all alarms in the window, in percent.
    pub share: f64,
    #[serde(default)]
    pub top_condition: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadActors {
    pub plant: String,
    pub bad_actors: Vec<BadActor>,
}

// ============================================================================
// BREAKDOWNS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBreakdown {
    pub plant: String,
    pub priorities: Vec<CategoryCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBreakdown {
    pub plant: String,
    pub conditions: Vec<CategoryCount>,
}

// ============================================================================
// RAW RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub event_time: Timestamp,
    pub source: String,
    pub condition: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecordPage {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub records: Vec<AlarmRecord>,
}

/// Acknowledgement of a cache regeneration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerateResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    /// New cache-busting tag, when the backend issues one.
    #[serde(default)]
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_query_key_includes_only_set_params() {
        let query = AlarmQuery::new().threshold(10).top_n(5);
        let key = query.key_for("/api/PVCI/bad-actors");
        assert_eq!(key.as_str(), "/api/PVCI/bad-actors?threshold=10&top_n=5");
    }

    #[test]
    fn test_query_key_encodes_window() {
        let start = chrono::Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = chrono::Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let key = AlarmQuery::new()
            .window(start, end)
            .version("7")
            .key_for("/api/PVCI/kpis/overall");

        assert!(key.starts_with("/api/PVCI/kpis/overall?end=2025-01-02T00%3A00%3A00%2B00%3A00"));
        assert!(key.as_str().ends_with("&v=7"));
    }

    #[test]
    fn test_overall_kpis_defaults_optional_counters() {
        let kpis: OverallKpis = serde_json::from_value(json!({
            "plant": "PVCI",
            "total_alarms": 1200,
            "avg_alarms_per_hour": 50.0,
            "avg_alarms_per_10min": 8.3,
            "flood_percentage": 12.5,
            "peak_alarms_per_10min": 91
        }))
        .expect("valid payload");

        assert_eq!(kpis.standing_alarms, 0);
        assert_eq!(kpis.generated_at, None);
    }

    #[test]
    fn test_schema_rejects_wrong_shape() {
        let result = serde_json::from_value::<BadActors>(json!({"plant": "PVCI"}));
        assert!(result.is_err());
    }
}
