use crate::error::{RagstudioError, Result};
use crate::types::SearchFilters;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline implementation a config builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    /// Retrieve once, generate once.
    Simple,
    /// Adaptive query execution graph.
    Graph,
}

impl PipelineVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineVariant::Simple => "simple",
            PipelineVariant::Graph => "graph",
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for PipelineVariant {
    type Err = RagstudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simple" => Ok(PipelineVariant::Simple),
            "graph" => Ok(PipelineVariant::Graph),
            other => Err(RagstudioError::Validation(format!("unknown pipeline variant '{}'", other))),
        }
    }
}

/// Generation parameters passed to every completion call of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationParams {
    /// Overrides the completion backend's default model.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Retrieval, filtering and reranking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalParams {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: SearchFilters,
    /// Chunks scoring below this are dropped by the filter stage.
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f32,
    /// Chunks whose trimmed text is shorter than this are dropped.
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
    /// Ask the completion backend to score each chunk 0-10.
    #[serde(default)]
    pub use_llm_filtering: bool,
    #[serde(default = "default_max_context_docs")]
    pub max_context_docs: usize,
    #[serde(default = "default_max_chunks_per_document")]
    pub max_chunks_per_document: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_min_relevance_score() -> f32 {
    0.3
}

fn default_min_chunk_chars() -> usize {
    20
}

fn default_max_context_docs() -> usize {
    5
}

fn default_max_chunks_per_document() -> usize {
    2
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            filters: SearchFilters::new(),
            min_relevance_score: default_min_relevance_score(),
            min_chunk_chars: default_min_chunk_chars(),
            use_llm_filtering: false,
            max_context_docs: default_max_context_docs(),
            max_chunks_per_document: default_max_chunks_per_document(),
        }
    }
}

/// Answer quality gate used by the graph's refinement branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityParams {
    #[serde(default = "default_min_answer_chars")]
    pub min_answer_chars: usize,
    /// Case-insensitive substrings that mark an answer as a failure.
    #[serde(default = "default_failure_markers")]
    pub failure_markers: Vec<String>,
}

fn default_min_answer_chars() -> usize {
    50
}

fn default_failure_markers() -> Vec<String> {
    vec!["error".to_string(), "failed".to_string()]
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            min_answer_chars: default_min_answer_chars(),
            failure_markers: default_failure_markers(),
        }
    }
}

/// Identity and configuration of one pipeline
///
/// Owned by the caller (persisted externally) and passed by value into the
/// registry. Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub variant: PipelineVariant,
    pub index_name: String,
    #[serde(default)]
    pub generation: GenerationParams,
    #[serde(default)]
    pub retrieval: RetrievalParams,
    #[serde(default)]
    pub quality: QualityParams,
}

impl PipelineConfig {
    /// Config with default parameters.
    pub fn new(id: impl Into<String>, variant: PipelineVariant, index_name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            variant,
            index_name: index_name.into(),
            generation: GenerationParams::default(),
            retrieval: RetrievalParams::default(),
            quality: QualityParams::default(),
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Check value ranges. Returns every problem found, joined.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("id must not be empty".to_string());
        }
        if self.index_name.trim().is_empty() {
            errors.push("index_name must not be empty".to_string());
        }
        if !(1..=100).contains(&self.retrieval.top_k) {
            errors.push("retrieval.top_k must be between 1 and 100".to_string());
        }
        let temperature = self.generation.temperature;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            errors.push("generation.temperature must be between 0 and 2".to_string());
        }
        if !(100..=8000).contains(&self.generation.max_tokens) {
            errors.push("generation.max_tokens must be between 100 and 8000".to_string());
        }
        if !self.retrieval.min_relevance_score.is_finite() {
            errors.push("retrieval.min_relevance_score must be a finite number".to_string());
        }
        if self.retrieval.max_context_docs == 0 {
            errors.push("retrieval.max_context_docs must be greater than 0".to_string());
        }
        if self.retrieval.max_chunks_per_document == 0 {
            errors.push("retrieval.max_chunks_per_document must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RagstudioError::Validation(format!(
                "pipeline '{}': {}",
                self.id,
                errors.join("; ")
            )))
        }
    }
}
