//! Process-wide services, built once by each binary and passed down.

use crate::backend::opensearch::OpenSearchAuth;
use crate::backend::{OpenAiCompletion, OpenSearchRetriever};
use crate::benchmark::BenchmarkRunner;
use crate::cache::EmbeddingCache;
use crate::config::Config;
use crate::db::SqliteStore;
use crate::embeddings::{OpenAIEmbedder, DEFAULT_OPENAI_BASE_URL};
use crate::error::{RagstudioError, Result};
use crate::pipeline::{BackendFactory, Backends, PipelineConfig, PipelineRegistry};
use std::sync::Arc;
use std::time::Duration;

/// Builds OpenSearch retrievers and OpenAI completion clients for pipelines.
///
/// All retrievers share one query embedder, so its LRU cache is shared too.
pub struct HttpBackendFactory {
    embedder: Arc<OpenAIEmbedder>,
    opensearch_url: String,
    opensearch_auth: Option<OpenSearchAuth>,
    opensearch_timeout: Duration,
    completion_api_key: String,
    completion_model: String,
    completion_base_url: String,
    completion_timeout: Duration,
    max_retries: usize,
}

impl HttpBackendFactory {
    pub fn from_config(config: &Config) -> Result<Self> {
        let embeddings_key = read_env(&config.embeddings.api_key_env)?;
        let completion_api_key = read_env(&config.completion.api_key_env)?;

        let cache = if config.embeddings.cache_capacity > 0 {
            Some(Arc::new(EmbeddingCache::new(config.embeddings.cache_capacity)))
        } else {
            None
        };
        let embedder = OpenAIEmbedder::new(
            embeddings_key,
            config.embeddings.model.clone(),
            config
                .embeddings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            cache,
        )?;

        let opensearch_auth = match &config.opensearch.username {
            Some(username) => Some(OpenSearchAuth {
                username: username.clone(),
                password: config.opensearch_password().ok_or_else(|| {
                    RagstudioError::Config("OpenSearch password env var not set".to_string())
                })?,
            }),
            None => None,
        };

        Ok(Self {
            embedder: Arc::new(embedder),
            opensearch_url: config.opensearch.url.clone(),
            opensearch_auth,
            opensearch_timeout: Duration::from_secs(config.opensearch.timeout_secs),
            completion_api_key,
            completion_model: config.completion.model.clone(),
            completion_base_url: config
                .completion
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            completion_timeout: Duration::from_secs(config.completion.timeout_secs),
            max_retries: config.completion.max_retries as usize,
        })
    }
}

fn read_env(var: &str) -> Result<String> {
    std::env::var(var)
        .map_err(|_| RagstudioError::Config(format!("Environment variable {} not set", var)))
}

impl BackendFactory for HttpBackendFactory {
    fn build(&self, config: &PipelineConfig) -> Result<Backends> {
        let retrieval = OpenSearchRetriever::new(
            &self.opensearch_url,
            self.opensearch_auth.clone(),
            self.embedder.clone(),
            self.opensearch_timeout,
        )?;

        // Per-pipeline model override
        let model = config
            .generation
            .model
            .clone()
            .unwrap_or_else(|| self.completion_model.clone());
        let completion = OpenAiCompletion::new(
            self.completion_api_key.clone(),
            model,
            self.completion_base_url.clone(),
            self.completion_timeout,
            self.max_retries,
        )?;

        log::debug!(
            "Built backends for pipeline {} (index {}, model {})",
            config.id,
            config.index_name,
            completion.model()
        );

        Ok(Backends {
            retrieval: Arc::new(retrieval),
            completion: Arc::new(completion),
        })
    }
}

/// Config, store, registry and benchmark runner for one process.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub registry: Arc<PipelineRegistry>,
    pub runner: BenchmarkRunner,
}

impl AppContext {
    pub async fn new(config: Config) -> Result<Self> {
        let factory = HttpBackendFactory::from_config(&config)?;
        let store = Arc::new(SqliteStore::open(config.db_path()).await?);
        Ok(Self::with_parts(config, store, Arc::new(factory)))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<SqliteStore>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let registry = Arc::new(PipelineRegistry::new(factory));
        let runner = BenchmarkRunner::new(registry.clone(), store.clone());
        Self {
            config,
            store,
            registry,
            runner,
        }
    }

    /// Close every cached pipeline.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
