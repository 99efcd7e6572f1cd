//! Process-wide cache of live pipeline instances, keyed by pipeline id.

use crate::error::Result;
use crate::pipeline::{BackendFactory, PipelineConfig, PipelineInstance, PipelineMetrics};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct PipelineRegistry {
    factory: Arc<dyn BackendFactory>,
    instances: Mutex<HashMap<String, Arc<PipelineInstance>>>,
}

impl PipelineRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            factory,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Return the live instance for `id`, building it from `config` on first use.
    ///
    /// On a cache hit `config` is ignored; call [`remove`](Self::remove) first to
    /// pick up a changed config. Concurrent first calls build exactly one instance.
    pub async fn get(&self, id: &str, config: PipelineConfig) -> Result<Arc<PipelineInstance>> {
        let mut instances = self.instances.lock().await;
        if let Some(instance) = instances.get(id) {
            return Ok(instance.clone());
        }

        config.validate()?;
        let backends = self.factory.build(&config)?;
        let instance = Arc::new(PipelineInstance::new(config, backends));
        instances.insert(id.to_string(), instance.clone());
        log::info!("Pipeline {} created ({} live)", id, instances.len());
        Ok(instance)
    }

    /// Evict and close the instance for `id`. Returns whether one was cached.
    pub async fn remove(&self, id: &str) -> bool {
        let evicted = self.instances.lock().await.remove(id);
        match evicted {
            Some(instance) => {
                instance.close().await;
                true
            }
            None => false,
        }
    }

    /// Metrics snapshot; zeroed for unknown ids.
    pub async fn metrics_of(&self, id: &str) -> PipelineMetrics {
        let instances = self.instances.lock().await;
        instances
            .get(id)
            .map(|instance| instance.metrics())
            .unwrap_or_default()
    }

    pub async fn cached_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Close every live instance.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.instances.lock().await.drain().collect();
        for (_, instance) in drained {
            instance.close().await;
        }
    }
}
