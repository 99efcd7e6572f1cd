//! Benchmarking: run a test-case set against several pipelines and compare them.

pub mod compare;
pub mod runner;
pub mod stats;
pub mod testcases;

pub use compare::{compare_all, ComparisonResult, CriterionWinners};
pub use runner::BenchmarkRunner;
pub use stats::{BenchmarkMetrics, LatencySummary, ScoreSummary};

use crate::error::{RagstudioError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// One benchmark query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTestCase {
    #[serde(alias = "query_id")]
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub query_type: Option<String>,
    #[serde(default)]
    pub expected_answer: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// How queries are issued to a pipeline during the measured phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One query at a time, in case order.
    #[default]
    Sequential,
    /// Up to `max_in_flight` queries at once. Latency samples still measure
    /// each query from the moment the pipeline starts it, so time spent
    /// waiting for a slot is excluded; contention between in-flight queries is not.
    Concurrent { max_in_flight: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkParams {
    /// Passes over the full case set per pipeline.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Leading cases run once before measuring; results discarded.
    #[serde(default)]
    pub warmup_queries: usize,
    /// Per-pipeline wall-clock budget for the measured phase.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: Option<u64>,
    /// Overrides every pipeline's configured top-k.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub mode: ExecutionMode,
}

fn default_iterations() -> u32 {
    1
}

fn default_timeout_ms() -> Option<u64> {
    Some(300_000)
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            warmup_queries: 0,
            timeout_ms: default_timeout_ms(),
            top_k: None,
            mode: ExecutionMode::Sequential,
        }
    }
}

impl BenchmarkParams {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Input to [`BenchmarkRunner::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRequest {
    pub id: String,
    pub name: String,
    pub pipeline_ids: Vec<String>,
    pub test_cases: Vec<QueryTestCase>,
    #[serde(default)]
    pub params: BenchmarkParams,
}

impl BenchmarkRequest {
    pub fn new(
        name: impl Into<String>,
        pipeline_ids: Vec<String>,
        test_cases: Vec<QueryTestCase>,
    ) -> Self {
        Self {
            id: format!("bench_{}", uuid::Uuid::new_v4()),
            name: name.into(),
            pipeline_ids,
            test_cases,
            params: BenchmarkParams::default(),
        }
    }

    pub fn with_params(mut self, params: BenchmarkParams) -> Self {
        self.params = params;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline_ids.is_empty() {
            return Err(RagstudioError::Validation("benchmark needs at least one pipeline".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.pipeline_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(RagstudioError::Validation(format!("pipeline '{}' listed twice", dup)));
        }
        if self.test_cases.is_empty() {
            return Err(RagstudioError::Validation("benchmark needs at least one test case".to_string()));
        }
        if self.params.iterations == 0 {
            return Err(RagstudioError::Validation("iterations must be at least 1".to_string()));
        }
        if let ExecutionMode::Concurrent { max_in_flight: 0 } = self.params.mode {
            return Err(RagstudioError::Validation("max_in_flight must be at least 1".to_string()));
        }
        if self.params.top_k == Some(0) {
            return Err(RagstudioError::Validation("top_k must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BenchmarkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BenchmarkStatus::Pending => "pending",
            BenchmarkStatus::Running => "running",
            BenchmarkStatus::Completed => "completed",
            BenchmarkStatus::Failed => "failed",
        }
    }
}

/// A benchmark run and, once finished, its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub id: String,
    pub name: String,
    pub pipeline_ids: Vec<String>,
    pub test_cases: Vec<QueryTestCase>,
    pub params: BenchmarkParams,
    pub status: BenchmarkStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
    /// Per-pipeline results, in run order.
    pub metrics: Vec<BenchmarkMetrics>,
    pub comparisons: Vec<ComparisonResult>,
    pub error: Option<String>,
}

impl BenchmarkRun {
    pub fn pending(request: &BenchmarkRequest) -> Self {
        Self {
            id: request.id.clone(),
            name: request.name.clone(),
            pipeline_ids: request.pipeline_ids.clone(),
            test_cases: request.test_cases.clone(),
            params: request.params.clone(),
            status: BenchmarkStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_secs: 0.0,
            metrics: Vec::new(),
            comparisons: Vec::new(),
            error: None,
        }
    }

    pub fn metrics_for(&self, pipeline_id: &str) -> Option<&BenchmarkMetrics> {
        self.metrics.iter().find(|m| m.pipeline_id == pipeline_id)
    }

    /// Queries executed across all pipelines, warmup excluded.
    pub fn total_queries(&self) -> u64 {
        self.metrics.iter().map(|m| m.total_queries).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str) -> QueryTestCase {
        QueryTestCase {
            id: id.to_string(),
            query: "What is rust?".to_string(),
            query_type: None,
            expected_answer: None,
            metadata: None,
        }
    }

    #[test]
    fn test_request_validation() {
        let ok = BenchmarkRequest::new("b", vec!["a".into(), "b".into()], vec![case("c1")]);
        assert!(ok.validate().is_ok());

        let no_pipelines = BenchmarkRequest::new("b", vec![], vec![case("c1")]);
        assert!(matches!(no_pipelines.validate(), Err(RagstudioError::Validation(_))));

        let duplicate = BenchmarkRequest::new("b", vec!["a".into(), "a".into()], vec![case("c1")]);
        assert!(duplicate.validate().unwrap_err().to_string().contains("listed twice"));

        let no_cases = BenchmarkRequest::new("b", vec!["a".into()], vec![]);
        assert!(no_cases.validate().is_err());

        let zero_iterations = BenchmarkRequest::new("b", vec!["a".into()], vec![case("c1")])
            .with_params(BenchmarkParams { iterations: 0, ..Default::default() });
        assert!(zero_iterations.validate().is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let zero = BenchmarkRequest::new("b", vec!["a".into()], vec![case("c1")])
            .with_params(BenchmarkParams { top_k: Some(0), ..Default::default() });
        let err = zero.validate().unwrap_err();
        assert!(matches!(err, RagstudioError::Validation(_)));
        assert!(err.to_string().contains("top_k"));

        let one = BenchmarkRequest::new("b", vec!["a".into()], vec![case("c1")])
            .with_params(BenchmarkParams { top_k: Some(1), ..Default::default() });
        assert!(one.validate().is_ok());
    }

    #[test]
    fn test_params_deserialize_defaults() {
        let params: BenchmarkParams =
            serde_json::from_str(r#"{"mode": {"mode": "concurrent", "max_in_flight": 4}}"#).unwrap();
        assert_eq!(params.iterations, 1);
        assert_eq!(params.timeout(), Some(Duration::from_secs(300)));
        assert_eq!(params.mode, ExecutionMode::Concurrent { max_in_flight: 4 });
    }
}
