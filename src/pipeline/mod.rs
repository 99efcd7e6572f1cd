//! Pipelines: configuration, the two variants, live instances and the registry.

pub mod config;
pub mod graph;
pub mod metrics;
pub mod provider;
pub mod registry;
pub mod simple;
pub mod templates;

pub use config::{GenerationParams, PipelineConfig, PipelineVariant, QualityParams, RetrievalParams};
pub use graph::GraphPipeline;
pub use metrics::PipelineMetrics;
pub use provider::{InMemoryConfigProvider, PipelineConfigProvider};
pub use registry::PipelineRegistry;
pub use simple::SimplePipeline;

use crate::backend::{CompletionBackend, RetrievalBackend};
use crate::error::Result;
use crate::graph::{GraphDeps, QueryExecutionGraph};
use crate::types::{Query, QueryResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Turns a query into a result. Failures are reported inside the result.
#[async_trait]
pub trait RagPipeline: Send + Sync {
    async fn process(&self, query: &Query) -> QueryResult;
}

/// Backend handles for one pipeline.
#[derive(Clone)]
pub struct Backends {
    pub retrieval: Arc<dyn RetrievalBackend>,
    pub completion: Arc<dyn CompletionBackend>,
}

/// Creates backends for a (validated) pipeline config.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &PipelineConfig) -> Result<Backends>;
}

/// A constructed pipeline plus its metrics. At most one per pipeline id lives
/// in a [`PipelineRegistry`].
pub struct PipelineInstance {
    config: Arc<PipelineConfig>,
    pipeline: Box<dyn RagPipeline>,
    retrieval: Arc<dyn RetrievalBackend>,
    metrics: Mutex<PipelineMetrics>,
}

impl PipelineInstance {
    pub fn new(config: PipelineConfig, backends: Backends) -> Self {
        let config = Arc::new(config);
        let Backends { retrieval, completion } = backends;

        let pipeline: Box<dyn RagPipeline> = match config.variant {
            PipelineVariant::Simple => Box::new(SimplePipeline::new(
                retrieval.clone(),
                completion,
                config.clone(),
            )),
            PipelineVariant::Graph => Box::new(GraphPipeline::new(QueryExecutionGraph::new(GraphDeps {
                retrieval: retrieval.clone(),
                completion,
                config: config.clone(),
            }))),
        };

        Self {
            config,
            pipeline,
            retrieval,
            metrics: Mutex::new(PipelineMetrics::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one query and fold the result into this instance's metrics.
    pub async fn process(&self, query: &Query) -> QueryResult {
        let result = self.pipeline.process(query).await;
        self.metrics.lock().unwrap().record(&result);

        if result.is_failed() {
            log::error!(
                "Pipeline {} failed query {}: {}",
                self.config.id,
                query.id,
                result.metadata.error.as_deref().unwrap_or("unknown error")
            );
        } else {
            log::debug!(
                "Pipeline {} answered query {} in {}ms",
                self.config.id,
                query.id,
                result.latency_ms
            );
        }
        result
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// Release backend resources.
    pub async fn close(&self) {
        self.retrieval.close().await;
        log::info!("Pipeline {} closed", self.config.id);
    }
}
