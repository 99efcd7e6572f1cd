//! Executes benchmark requests against registry-managed pipelines.

use crate::benchmark::stats::SampleSet;
use crate::benchmark::{
    compare_all, BenchmarkMetrics, BenchmarkRequest, BenchmarkRun, BenchmarkStatus, ExecutionMode,
    QueryTestCase,
};
use crate::error::{RagstudioError, Result};
use crate::pipeline::{PipelineConfigProvider, PipelineInstance, PipelineRegistry};
use crate::types::{Query, QueryResult};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub struct BenchmarkRunner {
    registry: Arc<PipelineRegistry>,
    provider: Arc<dyn PipelineConfigProvider>,
    running: Mutex<HashSet<String>>,
}

/// Clears a benchmark's running marker when dropped.
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.lock().unwrap().remove(&self.id);
    }
}

impl BenchmarkRunner {
    pub fn new(registry: Arc<PipelineRegistry>, provider: Arc<dyn PipelineConfigProvider>) -> Self {
        Self {
            registry,
            provider,
            running: Mutex::new(HashSet::new()),
        }
    }

    fn acquire(&self, id: &str) -> Result<RunningGuard<'_>> {
        let mut running = self.running.lock().unwrap();
        if !running.insert(id.to_string()) {
            return Err(RagstudioError::Conflict(format!("benchmark '{}' is already running", id)));
        }
        Ok(RunningGuard {
            running: &self.running,
            id: id.to_string(),
        })
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.lock().unwrap().contains(id)
    }

    /// Run every pipeline of the request in turn and compare them.
    ///
    /// Returns `Err` only for an invalid request or when the same benchmark id
    /// is already running. Anything that goes wrong mid-run ends the run with
    /// status `failed`, keeping results gathered so far.
    pub async fn run(&self, request: BenchmarkRequest) -> Result<BenchmarkRun> {
        request.validate()?;
        let _guard = self.acquire(&request.id)?;

        let mut run = BenchmarkRun::pending(&request);
        run.status = BenchmarkStatus::Running;
        run.started_at = Some(Utc::now());
        let start = Instant::now();
        log::info!(
            "Benchmark {} started: {} pipelines, {} cases, {} iterations",
            run.id,
            request.pipeline_ids.len(),
            request.test_cases.len(),
            request.params.iterations
        );

        for pipeline_id in &request.pipeline_ids {
            match self.run_pipeline(pipeline_id, &request).await {
                Ok(metrics) => {
                    log::info!(
                        "Benchmark {}: {} mean latency {:.1}ms, success rate {:.1}%",
                        run.id,
                        pipeline_id,
                        metrics.latency_ms.mean,
                        metrics.success_rate * 100.0
                    );
                    run.metrics.push(metrics);
                }
                Err(e) => {
                    log::error!("Benchmark {} failed on pipeline {}: {}", run.id, pipeline_id, e);
                    run.status = BenchmarkStatus::Failed;
                    run.error = Some(format!("pipeline '{}': {}", pipeline_id, e));
                    break;
                }
            }
        }

        run.comparisons = compare_all(&run.metrics);
        if run.status == BenchmarkStatus::Running {
            run.status = BenchmarkStatus::Completed;
        }
        run.finished_at = Some(Utc::now());
        run.duration_secs = start.elapsed().as_secs_f64();

        log::info!(
            "Benchmark {} {} in {:.2}s",
            run.id,
            run.status.as_str(),
            run.duration_secs
        );
        Ok(run)
    }

    async fn run_pipeline(&self, pipeline_id: &str, request: &BenchmarkRequest) -> Result<BenchmarkMetrics> {
        let config = self.provider.pipeline_config(pipeline_id).await?;
        let instance = self.registry.get(pipeline_id, config).await?;
        let params = &request.params;
        let cases = &request.test_cases;

        let warmup = params.warmup_queries.min(cases.len());
        for case in &cases[..warmup] {
            instance.process(&to_query(case, "warmup", params.top_k)).await;
        }
        if warmup > 0 {
            log::debug!("Pipeline {} warmed up with {} queries", pipeline_id, warmup);
        }

        let queries: Vec<Query> = (0..params.iterations)
            .flat_map(move |iteration| {
                cases
                    .iter()
                    .map(move |case| to_query(case, &format!("iter{}", iteration), params.top_k))
            })
            .collect();

        let samples = match params.mode {
            ExecutionMode::Sequential => run_sequential(&instance, queries, params.timeout()).await,
            ExecutionMode::Concurrent { max_in_flight } => {
                run_concurrent(&instance, queries, params.timeout(), max_in_flight).await
            }
        };
        if samples.timed_out {
            log::warn!(
                "Pipeline {} timed out after {} queries",
                pipeline_id,
                samples.executed
            );
        }
        Ok(samples.summarize(pipeline_id))
    }
}

fn to_query(case: &QueryTestCase, round: &str, top_k: Option<usize>) -> Query {
    let query = Query::new(case.query.clone()).with_id(format!("{}_{}", case.id, round));
    match top_k {
        Some(k) => query.with_top_k(k),
        None => query,
    }
}

fn record(samples: &mut SampleSet, number: usize, result: &QueryResult) {
    samples.executed += 1;
    if result.is_failed() {
        samples.failed += 1;
        samples.errors.push(format!("Query {}: {}", number, result.answer));
        return;
    }
    samples.latencies_ms.push(result.latency_ms as f64);
    if let Some(score) = result.mean_chunk_score() {
        samples.scores.push(score);
    }
}

fn expired(start: Instant, timeout: Option<Duration>) -> bool {
    timeout.is_some_and(|limit| start.elapsed() >= limit)
}

async fn run_sequential(instance: &PipelineInstance, queries: Vec<Query>, timeout: Option<Duration>) -> SampleSet {
    let mut samples = SampleSet::default();
    let start = Instant::now();

    for (i, query) in queries.iter().enumerate() {
        if expired(start, timeout) {
            samples.timed_out = true;
            break;
        }
        let result = instance.process(query).await;
        record(&mut samples, i + 1, &result);
    }
    samples
}

async fn run_concurrent(
    instance: &PipelineInstance,
    queries: Vec<Query>,
    timeout: Option<Duration>,
    max_in_flight: usize,
) -> SampleSet {
    let start = Instant::now();

    let mut outcomes: Vec<(usize, Option<QueryResult>)> = stream::iter(queries.iter().enumerate())
        .map(|(i, query)| async move {
            if expired(start, timeout) {
                (i, None)
            } else {
                (i, Some(instance.process(query).await))
            }
        })
        .buffer_unordered(max_in_flight.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(i, _)| *i);

    let mut samples = SampleSet::default();
    for (i, outcome) in outcomes {
        match outcome {
            Some(result) => record(&mut samples, i + 1, &result),
            None => samples.timed_out = true,
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkParams;
    use crate::pipeline::test_support::ScriptedFactory;
    use crate::pipeline::{InMemoryConfigProvider, PipelineConfig, PipelineVariant};

    fn cases(n: usize) -> Vec<QueryTestCase> {
        (0..n)
            .map(|i| QueryTestCase {
                id: format!("case{}", i),
                query: format!("What does rust feature number {} do?", i),
                query_type: None,
                expected_answer: None,
                metadata: None,
            })
            .collect()
    }

    fn runner(factory: ScriptedFactory, configs: Vec<PipelineConfig>) -> (BenchmarkRunner, Arc<PipelineRegistry>) {
        let registry = Arc::new(PipelineRegistry::new(Arc::new(factory)));
        let provider = Arc::new(InMemoryConfigProvider::new(configs));
        (BenchmarkRunner::new(registry.clone(), provider), registry)
    }

    fn simple(id: &str, index: &str) -> PipelineConfig {
        PipelineConfig::new(id, PipelineVariant::Simple, index)
    }

    fn request(ids: &[&str], n: usize) -> BenchmarkRequest {
        BenchmarkRequest::new("test", ids.iter().map(|s| s.to_string()).collect(), cases(n))
    }

    #[tokio::test]
    async fn test_two_pipelines_complete() {
        let (runner, registry) = runner(
            ScriptedFactory::new(),
            vec![simple("a", "docs"), PipelineConfig::new("b", PipelineVariant::Graph, "docs")],
        );
        let params = BenchmarkParams { iterations: 2, warmup_queries: 1, ..Default::default() };
        let run = runner.run(request(&["a", "b"], 3).with_params(params)).await.unwrap();

        assert_eq!(run.status, BenchmarkStatus::Completed);
        assert!(run.error.is_none());
        assert_eq!(run.metrics.len(), 2);
        assert_eq!(run.metrics_for("a").unwrap().total_queries, 6);
        assert_eq!(run.total_queries(), 12);
        assert_eq!(run.comparisons.len(), 1);
        assert_eq!(run.comparisons[0].pipeline_a, "a");
        assert!(run.started_at.is_some() && run.finished_at.is_some());
        // Warmup queries hit the instance but not the benchmark samples
        assert_eq!(registry.metrics_of("a").await.total_queries, 7);
        assert!(!runner.is_running(&run.id));
    }

    #[tokio::test]
    async fn test_failing_pipeline_recorded_not_fatal() {
        let factory = ScriptedFactory::new().failing_index("broken");
        let (runner, _) = runner(factory, vec![simple("good", "docs"), simple("bad", "broken")]);

        let run = runner.run(request(&["good", "bad"], 4)).await.unwrap();

        assert_eq!(run.status, BenchmarkStatus::Completed);
        let bad = run.metrics_for("bad").unwrap();
        assert_eq!(bad.success_rate, 0.0);
        assert_eq!(bad.failed_queries, 4);
        assert_eq!(bad.errors.len(), 4);
        assert!(bad.errors[0].starts_with("Query 1: "));
        assert_eq!(run.metrics_for("good").unwrap().success_rate, 1.0);

        let comparison = &run.comparisons[0];
        assert_eq!(comparison.winners.success_rate, "good");
        assert_eq!(comparison.overall_winner, "good");
    }

    #[tokio::test]
    async fn test_single_failed_query_among_successes() {
        let factory = ScriptedFactory::new()
            .failing_query("What does rust feature number 2 do?")
            .slow_index("docs", Duration::from_millis(5));
        let (runner, _) = runner(factory, vec![simple("a", "docs"), simple("b", "docs")]);

        let run = runner.run(request(&["a", "b"], 5)).await.unwrap();

        assert_eq!(run.status, BenchmarkStatus::Completed);
        assert!(run.error.is_none());
        let b = run.metrics_for("b").unwrap();
        assert_eq!(b.total_queries, 5);
        assert_eq!(b.failed_queries, 1);
        assert_eq!(b.errors.len(), 1);
        assert!(b.errors[0].starts_with("Query 3:"), "got {}", b.errors[0]);
        assert!((b.success_rate - 0.8).abs() < 1e-9);
        assert!((b.error_rate - 0.2).abs() < 1e-9);

        // Latency stats cover only the 4 successes: throughput = 4 / (4 * mean)
        assert!(b.latency_ms.min >= 5.0);
        assert!((b.throughput_qps * b.latency_ms.mean / 1000.0 - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_fails_run_with_partial_results() {
        let (runner, _) = runner(ScriptedFactory::new(), vec![simple("a", "docs"), simple("b", "docs")]);

        let run = runner.run(request(&["a", "missing", "b"], 2)).await.unwrap();

        assert_eq!(run.status, BenchmarkStatus::Failed);
        assert!(run.error.as_deref().unwrap().contains("missing"));
        assert_eq!(run.metrics.len(), 1);
        assert!(run.comparisons.is_empty());
        assert!(!runner.is_running(&run.id));
    }

    #[tokio::test]
    async fn test_invalid_request_is_error() {
        let (runner, _) = runner(ScriptedFactory::new(), vec![simple("a", "docs")]);
        let err = runner.run(request(&["a", "a"], 1)).await.unwrap_err();
        assert!(matches!(err, RagstudioError::Validation(_)));
    }

    #[tokio::test]
    async fn test_same_id_cannot_run_twice() {
        let factory = ScriptedFactory::new().slow_index("docs", Duration::from_millis(30));
        let (runner, _) = runner(factory, vec![simple("a", "docs")]);
        let first = request(&["a"], 2);
        let second = first.clone();
        let id = first.id.clone();

        let (a, b) = tokio::join!(runner.run(first), runner.run(second));
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(RagstudioError::Conflict(_)))));

        // Marker released: the same id can run again
        let again = BenchmarkRequest { id, ..request(&["a"], 1) };
        assert!(runner.run(again).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_ids_run_concurrently() {
        let factory = ScriptedFactory::new().slow_index("docs", Duration::from_millis(10));
        let (runner, _) = runner(factory, vec![simple("a", "docs")]);
        let (a, b) = tokio::join!(runner.run(request(&["a"], 2)), runner.run(request(&["a"], 2)));
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_samples() {
        let factory = ScriptedFactory::new().slow_index("docs", Duration::from_millis(40));
        let (runner, _) = runner(factory, vec![simple("a", "docs")]);
        let params = BenchmarkParams { timeout_ms: Some(100), ..Default::default() };

        let run = runner.run(request(&["a"], 20).with_params(params)).await.unwrap();

        let metrics = run.metrics_for("a").unwrap();
        assert!(metrics.timed_out);
        assert!(metrics.total_queries >= 1 && metrics.total_queries < 20);
        assert_eq!(run.status, BenchmarkStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_mode_counts_every_query() {
        let factory = ScriptedFactory::new().slow_index("docs", Duration::from_millis(5));
        let (runner, _) = runner(factory, vec![simple("a", "docs")]);
        let params = BenchmarkParams {
            iterations: 2,
            mode: ExecutionMode::Concurrent { max_in_flight: 4 },
            ..Default::default()
        };

        let run = runner.run(request(&["a"], 5).with_params(params)).await.unwrap();
        let metrics = run.metrics_for("a").unwrap();
        assert_eq!(metrics.total_queries, 10);
        assert_eq!(metrics.success_rate, 1.0);
        assert!(metrics.latency_ms.min >= 5.0);
    }
}
