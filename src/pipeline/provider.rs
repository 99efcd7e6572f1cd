use crate::error::{RagstudioError, Result};
use crate::pipeline::PipelineConfig;
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only lookup of persisted pipeline configs.
#[async_trait]
pub trait PipelineConfigProvider: Send + Sync {
    async fn pipeline_config(&self, id: &str) -> Result<PipelineConfig>;
}

/// Provider over a fixed set of configs, e.g. the `[[pipelines]]` section of `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConfigProvider {
    configs: HashMap<String, PipelineConfig>,
}

impl InMemoryConfigProvider {
    pub fn new(configs: impl IntoIterator<Item = PipelineConfig>) -> Self {
        Self {
            configs: configs.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }
}

#[async_trait]
impl PipelineConfigProvider for InMemoryConfigProvider {
    async fn pipeline_config(&self, id: &str) -> Result<PipelineConfig> {
        self.configs
            .get(id)
            .cloned()
            .ok_or_else(|| RagstudioError::PipelineNotFound(id.to_string()))
    }
}
