//! Summary statistics over benchmark samples.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
    pub p99: f64,
}

impl LatencySummary {
    /// All zeros for an empty sample set.
    pub fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted(samples);
        if sorted.is_empty() {
            return Self::default();
        }
        Self {
            mean: mean(&sorted),
            median: percentile(&sorted, 50.0),
            stddev: stddev(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
}

impl ScoreSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted(samples);
        if sorted.is_empty() {
            return Self::default();
        }
        Self {
            mean: mean(&sorted),
            median: percentile(&sorted, 50.0),
            stddev: stddev(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Aggregated results of one pipeline in one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub pipeline_id: String,
    pub latency_ms: LatencySummary,
    pub retrieval_score: ScoreSummary,
    pub success_rate: f64,
    pub error_rate: f64,
    pub throughput_qps: f64,
    pub total_queries: u64,
    pub failed_queries: u64,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub timed_out: bool,
}

/// Raw per-pipeline observations collected by the runner.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    /// Latencies of successful queries, in ms.
    pub latencies_ms: Vec<f64>,
    /// Mean chunk score of successful queries that returned chunks.
    pub scores: Vec<f64>,
    pub executed: u64,
    pub failed: u64,
    pub errors: Vec<String>,
    pub timed_out: bool,
}

impl SampleSet {
    pub fn summarize(&self, pipeline_id: &str) -> BenchmarkMetrics {
        let successes = self.executed - self.failed;
        let (success_rate, error_rate) = if self.executed == 0 {
            (0.0, 0.0)
        } else {
            (
                successes as f64 / self.executed as f64,
                self.failed as f64 / self.executed as f64,
            )
        };

        let busy_secs: f64 = self.latencies_ms.iter().sum::<f64>() / 1000.0;
        let throughput_qps = if busy_secs > 0.0 {
            successes as f64 / busy_secs
        } else {
            0.0
        };

        BenchmarkMetrics {
            pipeline_id: pipeline_id.to_string(),
            latency_ms: LatencySummary::from_samples(&self.latencies_ms),
            retrieval_score: ScoreSummary::from_samples(&self.scores),
            success_rate,
            error_rate,
            throughput_qps,
            total_queries: self.executed,
            failed_queries: self.failed,
            errors: self.errors.clone(),
            timed_out: self.timed_out,
        }
    }
}

fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn stddev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile of sorted, non-empty `values` with linear interpolation between ranks.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
