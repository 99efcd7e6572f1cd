use crate::pipeline::PipelineConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub ragstudio: RagstudioConfig,
    pub opensearch: OpenSearchConfig,
    pub embeddings: EmbeddingsConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub benchmark: BenchmarkDefaults,
    /// Pipelines synced into the store by `ragstudio pipelines sync`.
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagstudioConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// OpenSearch connection
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSearchConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Env var holding the password; required when `username` is set.
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default = "default_opensearch_timeout")]
    pub timeout_secs: u64,
}

/// Query embedding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Chat completion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Defaults for `bench` when not given on the command line
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkDefaults {
    #[serde(default = "default_benchmark_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub warmup_queries: usize,
    /// Cap on generated test cases.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
}

impl Default for BenchmarkDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_benchmark_timeout(),
            warmup_queries: 0,
            max_queries: default_max_queries(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_opensearch_timeout() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_completion_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_benchmark_timeout() -> u64 {
    300
}

fn default_max_queries() -> usize {
    100
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RAGSTUDIO_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RAGSTUDIO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));
        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.opensearch.url)
            .with_context(|| format!("opensearch.url is not a valid URL: {}", self.opensearch.url))?;

        require_env(&self.embeddings.api_key_env, "embeddings API key")?;
        require_env(&self.completion.api_key_env, "completion API key")?;

        if self.opensearch.username.is_some() {
            match &self.opensearch.password_env {
                Some(var) => require_env(var, "OpenSearch password")?,
                None => anyhow::bail!("opensearch.password_env must be set when opensearch.username is set"),
            }
        }

        if self.completion.timeout_secs == 0 || self.opensearch.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }

        if self.benchmark.max_queries == 0 {
            anyhow::bail!("benchmark.max_queries must be greater than 0");
        }

        let mut seen = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen.insert(pipeline.id.as_str()) {
                anyhow::bail!("pipeline '{}' is defined more than once", pipeline.id);
            }
            pipeline.validate()?;
        }

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.ragstudio.db_path
    }

    /// OpenSearch password, if basic auth is configured
    pub fn opensearch_password(&self) -> Option<String> {
        self.opensearch
            .password_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
    }
}

fn require_env(var: &str, what: &str) -> Result<()> {
    std::env::var(var).with_context(|| {
        format!(
            "Environment variable {} ({}) not set. Set it in your .env file or the environment.",
            var, what
        )
    })?;
    Ok(())
}
