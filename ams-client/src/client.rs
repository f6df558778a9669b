//! Wiring of transport, cache tiers, orchestrator, API and agent stream.

use std::sync::Arc;

use ams_cache::{
    CacheInvalidator, LmdbStore, MemoryStore, Namespace, PersistentStore, RequestCache,
};
use ams_core::{AgentQuery, AmsResult, HttpTransport};
use tracing::info;

use crate::api::{AlarmApi, EndpointTtls};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::orchestrator::FetchOrchestrator;
use crate::stream::{AgentStream, StreamClient};
use crate::transport::ReqwestTransport;

/// One explicitly constructed cache and everything that shares it.
#[derive(Debug, Clone)]
pub struct AmsClient {
    cache: Arc<RequestCache>,
    orchestrator: Arc<FetchOrchestrator>,
    alarms: Arc<AlarmApi>,
    agent: StreamClient,
    plant: String,
}

impl AmsClient {
    /// Build against the real backend described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config)?;
        let store: Arc<dyn PersistentStore> = match &config.cache.store_path {
            Some(path) => Arc::new(LmdbStore::open(path, config.cache.store_max_size_mb)?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_parts(config, Arc::new(transport), store))
    }

    /// Build with an injected transport and persistent store.
    pub fn with_parts(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let cache = Arc::new(RequestCache::new(
            store,
            Namespace::new(config.cache.namespace.clone()),
        ));
        let orchestrator = Arc::new(
            FetchOrchestrator::new(Arc::clone(&transport), Arc::clone(&cache), config.base_url())
                .with_default_timeout(config.request_timeout()),
        );
        let alarms = Arc::new(AlarmApi::new(
            Arc::clone(&orchestrator),
            config.plant.clone(),
            EndpointTtls {
                aggregates: config.kpi_freshness(),
                records: config.records_freshness(),
            },
        ));

        let stream_url = format!("{}{}", config.base_url(), config.stream.path);
        let mut agent = StreamClient::new(transport, stream_url);
        if let Some(idle) = config.idle_timeout() {
            agent = agent.with_idle_timeout(idle);
        }

        info!(
            base_url = %config.base_url(),
            plant = %config.plant,
            namespace = %config.cache.namespace,
            persistent = config.cache.store_path.is_some(),
            "AMS client initialized"
        );

        Self {
            cache,
            orchestrator,
            alarms,
            agent,
            plant: config.plant.clone(),
        }
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn orchestrator(&self) -> &Arc<FetchOrchestrator> {
        &self.orchestrator
    }

    pub fn alarms(&self) -> &AlarmApi {
        &self.alarms
    }

    pub fn agent(&self) -> &StreamClient {
        &self.agent
    }

    pub fn invalidator(&self) -> CacheInvalidator {
        CacheInvalidator::new(Arc::clone(&self.cache))
    }

    /// Ask the agent about this client's plant.
    pub fn ask(&self, query: impl Into<String>, session_id: impl Into<String>) -> AmsResult<AgentStream> {
        let query = AgentQuery::new(query, self.plant.clone(), session_id);
        self.agent.ask(&query)
    }
}
