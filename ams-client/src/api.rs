//! Typed alarm analytics endpoints for one plant.

use std::sync::Arc;

use ams_cache::{CacheInvalidator, CacheRead, EvictionReport, Freshness};
use ams_core::{
    AlarmQuery, AlarmRecordPage, AmsResult, BadActors, CacheKey, ConditionBreakdown,
    FloodWindows, OverallKpis, PerSourceKpis, PriorityBreakdown, RegenerateResponse,
};
use serde::de::DeserializeOwned;
use tracing::info;

use crate::orchestrator::{FetchOptions, FetchOrchestrator};

/// Cached GET endpoints, relative to `/api/{plant}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    OverallKpis,
    PerSourceKpis,
    FloodWindows,
    BadActors,
    PriorityBreakdown,
    ConditionBreakdown,
    Alarms,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Endpoint::OverallKpis,
        Endpoint::PerSourceKpis,
        Endpoint::FloodWindows,
        Endpoint::BadActors,
        Endpoint::PriorityBreakdown,
        Endpoint::ConditionBreakdown,
        Endpoint::Alarms,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Endpoint::OverallKpis => "kpis/overall",
            Endpoint::PerSourceKpis => "kpis/per-source",
            Endpoint::FloodWindows => "flood-windows",
            Endpoint::BadActors => "bad-actors",
            Endpoint::PriorityBreakdown => "breakdown/priority",
            Endpoint::ConditionBreakdown => "breakdown/condition",
            Endpoint::Alarms => "alarms",
        }
    }

    /// Raw records change on every ingest; everything else is an aggregate.
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Endpoint::Alarms)
    }
}

/// Per-endpoint TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointTtls {
    pub aggregates: Freshness,
    pub records: Freshness,
}

impl EndpointTtls {
    pub fn for_endpoint(&self, endpoint: Endpoint) -> Freshness {
        if endpoint.is_aggregate() {
            self.aggregates
        } else {
            self.records
        }
    }
}

pub struct AlarmApi {
    orchestrator: Arc<FetchOrchestrator>,
    invalidator: CacheInvalidator,
    plant: String,
    ttls: EndpointTtls,
}

impl AlarmApi {
    pub fn new(orchestrator: Arc<FetchOrchestrator>, plant: impl Into<String>, ttls: EndpointTtls) -> Self {
        let invalidator = CacheInvalidator::new(Arc::clone(orchestrator.cache()));
        Self {
            orchestrator,
            invalidator,
            plant: plant.into(),
            ttls,
        }
    }

    pub fn plant(&self) -> &str {
        &self.plant
    }

    /// `/api/{plant}/`
    pub fn plant_prefix(&self) -> String {
        format!("/api/{}/", urlencoding::encode(&self.plant))
    }

    pub fn path(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.plant_prefix(), endpoint.suffix())
    }

    pub fn key(&self, endpoint: Endpoint, query: &AlarmQuery) -> CacheKey {
        query.key_for(&self.path(endpoint))
    }

    /// Fetch any endpoint with its configured TTL.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        query: &AlarmQuery,
    ) -> AmsResult<CacheRead<T>> {
        self.get_with(endpoint, query, FetchOptions::new(self.ttls.for_endpoint(endpoint)))
            .await
    }

    /// Fetch any endpoint with explicit options.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        query: &AlarmQuery,
        options: FetchOptions,
    ) -> AmsResult<CacheRead<T>> {
        let key = self.key(endpoint, query);
        self.orchestrator.fetch::<T>(&key, options).await
    }

    pub async fn overall_kpis(&self, query: &AlarmQuery) -> AmsResult<CacheRead<OverallKpis>> {
        self.get(Endpoint::OverallKpis, query).await
    }

    pub async fn per_source_kpis(&self, query: &AlarmQuery) -> AmsResult<CacheRead<PerSourceKpis>> {
        self.get(Endpoint::PerSourceKpis, query).await
    }

    pub async fn flood_windows(&self, query: &AlarmQuery) -> AmsResult<CacheRead<FloodWindows>> {
        self.get(Endpoint::FloodWindows, query).await
    }

    pub async fn bad_actors(&self, query: &AlarmQuery) -> AmsResult<CacheRead<BadActors>> {
        self.get(Endpoint::BadActors, query).await
    }

    pub async fn priority_breakdown(
        &self,
        query: &AlarmQuery,
    ) -> AmsResult<CacheRead<PriorityBreakdown>> {
        self.get(Endpoint::PriorityBreakdown, query).await
    }

    pub async fn condition_breakdown(
        &self,
        query: &AlarmQuery,
    ) -> AmsResult<CacheRead<ConditionBreakdown>> {
        self.get(Endpoint::ConditionBreakdown, query).await
    }

    pub async fn alarms(&self, query: &AlarmQuery) -> AmsResult<CacheRead<AlarmRecordPage>> {
        self.get(Endpoint::Alarms, query).await
    }

    /// Manual refresh: forget every cached response for this plant.
    pub fn refresh(&self) -> EvictionReport {
        self.invalidator.evict(&self.plant_prefix())
    }

    /// Forget every cached variant of one endpoint.
    pub fn refresh_endpoint(&self, endpoint: Endpoint) -> EvictionReport {
        self.invalidator.evict(&self.path(endpoint))
    }

    /// Ask the backend to recompute its caches, then drop ours.
    ///
    /// Local entries are evicted only if the backend accepted the request.
    pub async fn regenerate(&self) -> AmsResult<RegenerateResponse> {
        let path = format!("{}cache/regenerate", self.plant_prefix());
        let response: RegenerateResponse = self
            .orchestrator
            .post(&path, &serde_json::json!({ "plant": self.plant }))
            .await?;
        let report = self.refresh();
        info!(
            plant = %self.plant,
            status = %response.status,
            evicted = report.total(),
            "backend cache regenerated"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for AlarmApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmApi")
            .field("plant", &self.plant)
            .field("ttls", &self.ttls)
            .finish()
    }
}
