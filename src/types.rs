//! Query-level value types shared by the pipelines, the registry and the benchmark runner.

use crate::graph::QueryAnalysis;
use crate::pipeline::PipelineVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured search filters, field name -> exact value (OpenSearch `term` semantics).
pub type SearchFilters = BTreeMap<String, serde_json::Value>;

/// Answer used when retrieval produced no usable context.
pub const NO_RELEVANT_INFORMATION: &str =
    "Sorry, no relevant information was found for this question.";

/// A user query submitted to a pipeline. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub text: String,
    /// Overrides the pipeline's configured top-k for this query only.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Merged over the pipeline's configured filters (query wins on key clashes).
    #[serde(default)]
    pub filters: Option<SearchFilters>,
}

impl Query {
    /// Create a query with a generated id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: format!("query_{}", uuid::Uuid::new_v4()),
            text: text.into(),
            top_k: None,
            filters: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Configured filters overlaid with this query's own filters.
    pub fn effective_filters(&self, configured: &SearchFilters) -> SearchFilters {
        let mut merged = configured.clone();
        if let Some(own) = &self.filters {
            for (key, value) in own {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// One scored chunk returned by a retrieval backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub title: String,
    pub text: String,
    pub chunk_index: u32,
    pub score: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RetrievedChunk {
    /// Identity used for cross-query deduplication.
    pub fn key(&self) -> (&str, u32) {
        (self.document_id.as_str(), self.chunk_index)
    }
}

/// Mean relevance score of a chunk list, `None` when the list is empty.
pub fn mean_score(chunks: &[RetrievedChunk]) -> Option<f64> {
    if chunks.is_empty() {
        return None;
    }
    let sum: f64 = chunks.iter().map(|c| f64::from(c.score)).sum();
    Some(sum / chunks.len() as f64)
}

/// Outcome class of a processed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Completed,
    /// Retrieval found nothing; the fixed no-information answer was returned.
    NoResults,
    Failed,
}

/// Diagnostic metadata attached to every [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub status: QueryStatus,
    pub pipeline_variant: PipelineVariant,
    #[serde(default)]
    pub execution_path: Vec<String>,
    #[serde(default)]
    pub analysis: Option<QueryAnalysis>,
    #[serde(default)]
    pub search_queries: Vec<String>,
    pub retrieved_count: usize,
    pub filtered_count: usize,
    pub final_count: usize,
    pub refinement_applied: bool,
    /// Nodes that fell back to a default instead of using backend output.
    #[serde(default)]
    pub degraded_nodes: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryMetadata {
    pub fn new(status: QueryStatus, pipeline_variant: PipelineVariant) -> Self {
        Self {
            status,
            pipeline_variant,
            execution_path: Vec::new(),
            analysis: None,
            search_queries: Vec::new(),
            retrieved_count: 0,
            filtered_count: 0,
            final_count: 0,
            refinement_applied: false,
            degraded_nodes: Vec::new(),
            error: None,
        }
    }
}

/// Result of one query. Pipelines always produce one of these, failures included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query_id: String,
    pub query_text: String,
    pub answer: String,
    pub chunks: Vec<RetrievedChunk>,
    pub latency_ms: u64,
    pub metadata: QueryMetadata,
}

impl QueryResult {
    /// Build the uniform failure result for a query.
    pub fn failed(
        query: &Query,
        variant: PipelineVariant,
        error: &str,
        latency_ms: u64,
    ) -> Self {
        let mut metadata = QueryMetadata::new(QueryStatus::Failed, variant);
        metadata.error = Some(error.to_string());
        Self {
            query_id: query.id.clone(),
            query_text: query.text.clone(),
            answer: format!("An error occurred while processing the query: {}", error),
            chunks: Vec::new(),
            latency_ms,
            metadata,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.metadata.status == QueryStatus::Failed
    }

    /// Mean score of the chunks used as final context.
    pub fn mean_chunk_score(&self) -> Option<f64> {
        mean_score(&self.chunks)
    }
}
