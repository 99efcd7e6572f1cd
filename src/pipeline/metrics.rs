//! Per-instance running metrics.

use crate::types::QueryResult;
use serde::{Deserialize, Serialize};

/// Snapshot of a pipeline instance's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    /// Successful queries that returned at least one chunk.
    pub scored_queries: u64,
    /// Mean latency over successful queries.
    pub avg_latency_ms: f64,
    /// Mean of per-query mean chunk scores over scored queries.
    pub avg_retrieval_score: f64,
}

impl PipelineMetrics {
    /// Fold one result into the running means.
    pub fn record(&mut self, result: &QueryResult) {
        self.total_queries += 1;

        if result.is_failed() {
            self.failed_queries += 1;
            return;
        }

        self.successful_queries += 1;
        self.avg_latency_ms = running_mean(
            self.avg_latency_ms,
            result.latency_ms as f64,
            self.successful_queries,
        );

        if let Some(score) = result.mean_chunk_score() {
            self.scored_queries += 1;
            self.avg_retrieval_score = running_mean(self.avg_retrieval_score, score, self.scored_queries);
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.successful_queries as f64 / self.total_queries as f64
        }
    }
}

/// `old + (sample - old) / count`, where `count` already includes the sample.
pub fn running_mean(old: f64, sample: f64, count: u64) -> f64 {
    old + (sample - old) / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::chunk;
    use crate::pipeline::PipelineVariant;
    use crate::types::{Query, QueryMetadata, QueryStatus};

    fn result(latency_ms: u64, scores: &[f32]) -> QueryResult {
        QueryResult {
            query_id: "q".to_string(),
            query_text: "q".to_string(),
            answer: "a".to_string(),
            chunks: scores
                .iter()
                .enumerate()
                .map(|(i, s)| chunk("d", i as u32, *s, "text"))
                .collect(),
            latency_ms,
            metadata: QueryMetadata::new(QueryStatus::Completed, PipelineVariant::Simple),
        }
    }

    #[test]
    fn test_running_means() {
        let mut metrics = PipelineMetrics::default();
        metrics.record(&result(100, &[0.5, 1.0]));
        metrics.record(&result(300, &[0.25]));
        metrics.record(&result(200, &[]));

        assert_eq!(metrics.total_queries, 3);
        assert_eq!(metrics.successful_queries, 3);
        assert_eq!(metrics.scored_queries, 2);
        assert!((metrics.avg_latency_ms - 200.0).abs() < 1e-9);
        assert!((metrics.avg_retrieval_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_failure_only_counts() {
        let mut metrics = PipelineMetrics::default();
        metrics.record(&result(100, &[0.8]));
        let failed = QueryResult::failed(&Query::new("q"), PipelineVariant::Simple, "boom", 5000);
        metrics.record(&failed);

        assert_eq!(metrics.total_queries, 2);
        assert_eq!(metrics.failed_queries, 1);
        assert_eq!(metrics.successful_queries, 1);
        assert!((metrics.avg_latency_ms - 100.0).abs() < 1e-9);
        assert!((metrics.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_counters_monotonic() {
        let mut metrics = PipelineMetrics::default();
        let mut previous = metrics.clone();
        for i in 0..20u64 {
            if i % 3 == 0 {
                metrics.record(&QueryResult::failed(&Query::new("q"), PipelineVariant::Graph, "x", 1));
            } else {
                metrics.record(&result(i * 10, &[0.4]));
            }
            assert!(metrics.total_queries > previous.total_queries);
            assert!(metrics.failed_queries >= previous.failed_queries);
            assert!(metrics.successful_queries >= previous.successful_queries);
            assert_eq!(metrics.total_queries, metrics.successful_queries + metrics.failed_queries);
            previous = metrics.clone();
        }
    }
}
