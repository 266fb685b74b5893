use std::sync::Arc;
use std::time::Duration;

use crate::{
    cache::MediaCache,
    config::{Config, PipelineConfig, PrefetchConfig},
    image_pipeline::ImageDecoder,
    protocol::Bus,
    registry::{Freshness, RegistryStore},
    user_data::UserDataStore,
};

/// Shared state handed to every view and its workers.
#[derive(Clone)]
pub struct AppContext {
    pub registry: Arc<RegistryStore>,
    pub user_data: Arc<UserDataStore>,
    pub cache: Arc<MediaCache>,
    pub decoder: Arc<dyn ImageDecoder>,
    pub bus: Bus,
    pub pipeline: PipelineConfig,
    pub prefetch: PrefetchConfig,
}

impl AppContext {
    pub fn new(
        config: &Config,
        registry: Arc<RegistryStore>,
        user_data: Arc<UserDataStore>,
        cache: Arc<MediaCache>,
        decoder: Arc<dyn ImageDecoder>,
        bus: Bus,
    ) -> Self {
        Self {
            registry,
            user_data,
            cache,
            decoder,
            bus,
            pipeline: config.pipeline.clone(),
            prefetch: config.prefetch.clone(),
        }
    }

    pub fn builder_entry_sleep(&self) -> Duration {
        Duration::from_millis(self.pipeline.builder_entry_sleep_ms)
    }

    pub fn worker_pass_sleep(&self) -> Duration {
        Duration::from_millis(self.pipeline.worker_pass_sleep_ms)
    }

    /// Freshness used by a view's builder. Reload views wait longer for a new fetch.
    pub fn freshness(&self, reload: bool) -> Freshness {
        let timeout_ms = if reload {
            self.pipeline.reload_freshness_timeout_ms
        } else {
            self.pipeline.view_freshness_timeout_ms
        };
        Freshness {
            timeout: Duration::from_millis(timeout_ms),
            poll: Duration::from_millis(self.pipeline.registry_wait_poll_ms.max(1)),
        }
    }
}
