//! Working state threaded through the query execution graph.

use crate::types::{Query, RetrievedChunk, SearchFilters};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// What the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Factual,
    Analytical,
    Comparative,
    Procedural,
}

impl Intent {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "factual" => Some(Intent::Factual),
            "analytical" => Some(Intent::Analytical),
            "comparative" => Some(Intent::Comparative),
            "procedural" => Some(Intent::Procedural),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Factual => "factual",
            Intent::Analytical => "analytical",
            Intent::Comparative => "comparative",
            Intent::Procedural => "procedural",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(Complexity::Simple),
            "medium" => Some(Complexity::Medium),
            "complex" => Some(Complexity::Complex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }
}

/// Structured output of the analysis node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub complexity: Complexity,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub needs_multi_query: bool,
    pub needs_clarification: bool,
    #[serde(default)]
    pub suggested_queries: Vec<String>,
}

impl QueryAnalysis {
    /// Used when the completion backend could not be reached.
    pub fn backend_fallback() -> Self {
        Self {
            intent: Intent::Factual,
            complexity: Complexity::Simple,
            entities: Vec::new(),
            keywords: Vec::new(),
            needs_multi_query: false,
            needs_clarification: false,
            suggested_queries: Vec::new(),
        }
    }

    /// Used when the backend answered but its output could not be parsed.
    pub fn unparsed_fallback(query: &str) -> Self {
        Self {
            intent: Intent::Factual,
            complexity: Complexity::Medium,
            entities: Vec::new(),
            keywords: vec![query.to_string()],
            needs_multi_query: false,
            needs_clarification: false,
            suggested_queries: vec![query.to_string()],
        }
    }

    /// One-line summary used in refinement prompts.
    pub fn summary(&self) -> String {
        format!(
            "intent={}, complexity={}, keywords=[{}], entities=[{}]",
            self.intent.as_str(),
            self.complexity.as_str(),
            self.keywords.join(", "),
            self.entities.join(", ")
        )
    }
}

impl Default for QueryAnalysis {
    fn default() -> Self {
        Self::backend_fallback()
    }
}

/// Mutable state for one query's trip through the graph
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub query_id: String,
    pub query: String,
    pub top_k: Option<usize>,
    /// Configured filters already overlaid with the query's own
    pub filters: SearchFilters,
    pub started_at: Instant,

    pub analysis: QueryAnalysis,
    pub search_queries: Vec<String>,

    pub retrieved: Vec<RetrievedChunk>,
    pub filtered: Vec<RetrievedChunk>,
    pub reranked: Vec<RetrievedChunk>,

    pub context: String,
    pub initial_answer: String,
    pub refined_answer: String,
    pub final_answer: String,

    pub execution_path: Vec<String>,
    pub degraded_nodes: Vec<String>,

    pub needs_multi_query: bool,
    pub needs_clarification: bool,
    pub needs_refinement: bool,
    pub is_complete: bool,
}

impl ExecutionState {
    pub fn new(query: &Query, configured: &SearchFilters) -> Self {
        Self {
            query_id: query.id.clone(),
            query: query.text.clone(),
            top_k: query.top_k,
            filters: query.effective_filters(configured),
            started_at: Instant::now(),
            analysis: QueryAnalysis::default(),
            search_queries: Vec::new(),
            retrieved: Vec::new(),
            filtered: Vec::new(),
            reranked: Vec::new(),
            context: String::new(),
            initial_answer: String::new(),
            refined_answer: String::new(),
            final_answer: String::new(),
            execution_path: Vec::new(),
            degraded_nodes: Vec::new(),
            needs_multi_query: false,
            needs_clarification: false,
            needs_refinement: false,
            is_complete: false,
        }
    }

    /// Record that a node fell back to its default value.
    pub fn degrade(&mut self, node: &str, reason: impl std::fmt::Display) {
        log::warn!("{} fell back to default for query {}: {}", node, self.query_id, reason);
        self.degraded_nodes.push(node.to_string());
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}
