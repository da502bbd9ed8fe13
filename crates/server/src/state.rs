use std::sync::Arc;

use chrono::{DateTime, Utc};
use prometheus::Registry;

use helios_core::{
    Config, DiscoveryScheduler, ManifestStore, SanitizedConfig, TaskQueue,
};

/// Shared application state
pub struct AppState {
    config: Config,
    manifest: Arc<dyn ManifestStore>,
    queue: Arc<dyn TaskQueue>,
    scheduler: Arc<DiscoveryScheduler>,
    registry: Registry,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Config,
        manifest: Arc<dyn ManifestStore>,
        queue: Arc<dyn TaskQueue>,
        scheduler: Arc<DiscoveryScheduler>,
        registry: Registry,
    ) -> Self {
        Self {
            config,
            manifest,
            queue,
            scheduler,
            registry,
            started_at: Utc::now(),
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn manifest(&self) -> &dyn ManifestStore {
        self.manifest.as_ref()
    }

    pub fn queue(&self) -> &dyn TaskQueue {
        self.queue.as_ref()
    }

    pub fn scheduler(&self) -> &DiscoveryScheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
