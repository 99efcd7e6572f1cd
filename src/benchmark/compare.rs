//! Pairwise comparison of per-pipeline benchmark metrics.

use crate::benchmark::stats::BenchmarkMetrics;
use serde::{Deserialize, Serialize};

/// Winner of each criterion, by pipeline id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionWinners {
    pub latency: String,
    pub retrieval_score: String,
    pub throughput: String,
    pub success_rate: String,
}

impl CriterionWinners {
    fn all(&self) -> [&str; 4] {
        [
            &self.latency,
            &self.retrieval_score,
            &self.throughput,
            &self.success_rate,
        ]
    }
}

/// Deltas are `b - a`; percentages are relative to `a`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub pipeline_a: String,
    pub pipeline_b: String,
    pub latency_diff_ms: f64,
    pub latency_improvement_pct: f64,
    pub retrieval_score_diff: f64,
    pub retrieval_score_improvement_pct: f64,
    pub throughput_diff_qps: f64,
    pub throughput_improvement_pct: f64,
    pub success_rate_diff: f64,
    pub winners: CriterionWinners,
    pub overall_winner: String,
    /// Criteria won by the overall winner, out of 4.
    pub votes: u8,
    pub summary: String,
}

fn percent_change(a: f64, b: f64) -> f64 {
    if a == 0.0 {
        0.0
    } else {
        (b - a) / a * 100.0
    }
}

/// True when at least one query of the pipeline succeeded, i.e. its latency
/// and score summaries are backed by samples.
fn has_successes(m: &BenchmarkMetrics) -> bool {
    m.total_queries > m.failed_queries
}

/// Whether `b` beats `a` on a criterion measured only over successful queries.
/// A side without successes never wins it.
fn sampled_win(a: &BenchmarkMetrics, b: &BenchmarkMetrics, b_better: bool) -> bool {
    match (has_successes(a), has_successes(b)) {
        (true, true) => b_better,
        (false, true) => true,
        _ => false,
    }
}

/// Compare two pipelines. Exact ties on a criterion go to `a`. A 2-2 split
/// overall goes to the latency winner, or to the higher success rate when
/// either side had no successful query.
pub fn compare(a: &BenchmarkMetrics, b: &BenchmarkMetrics) -> ComparisonResult {
    let pick = |b_wins: bool| {
        if b_wins {
            b.pipeline_id.clone()
        } else {
            a.pipeline_id.clone()
        }
    };

    let winners = CriterionWinners {
        latency: pick(sampled_win(a, b, b.latency_ms.mean < a.latency_ms.mean)),
        retrieval_score: pick(sampled_win(
            a,
            b,
            b.retrieval_score.mean > a.retrieval_score.mean,
        )),
        throughput: pick(b.throughput_qps > a.throughput_qps),
        success_rate: pick(b.success_rate > a.success_rate),
    };

    let votes_a = winners.all().iter().filter(|w| **w == a.pipeline_id).count() as u8;
    let votes_b = 4 - votes_a;
    let (overall_winner, votes) = if votes_a > votes_b {
        (a.pipeline_id.clone(), votes_a)
    } else if votes_b > votes_a {
        (b.pipeline_id.clone(), votes_b)
    } else if has_successes(a) && has_successes(b) {
        (winners.latency.clone(), votes_a)
    } else {
        (winners.success_rate.clone(), votes_a)
    };

    let latency_improvement_pct = percent_change(a.latency_ms.mean, b.latency_ms.mean);
    let summary = format!(
        "{} wins {}/4 criteria ({} vs {}: mean latency {:.1}ms vs {:.1}ms, {:+.1}%)",
        overall_winner,
        votes,
        a.pipeline_id,
        b.pipeline_id,
        a.latency_ms.mean,
        b.latency_ms.mean,
        latency_improvement_pct
    );

    ComparisonResult {
        pipeline_a: a.pipeline_id.clone(),
        pipeline_b: b.pipeline_id.clone(),
        latency_diff_ms: b.latency_ms.mean - a.latency_ms.mean,
        latency_improvement_pct,
        retrieval_score_diff: b.retrieval_score.mean - a.retrieval_score.mean,
        retrieval_score_improvement_pct: percent_change(a.retrieval_score.mean, b.retrieval_score.mean),
        throughput_diff_qps: b.throughput_qps - a.throughput_qps,
        throughput_improvement_pct: percent_change(a.throughput_qps, b.throughput_qps),
        success_rate_diff: b.success_rate - a.success_rate,
        winners,
        overall_winner,
        votes,
        summary,
    }
}

/// Every unordered pair, in run order: (0,1), (0,2), ..., (1,2), ...
pub fn compare_all(metrics: &[BenchmarkMetrics]) -> Vec<ComparisonResult> {
    let mut comparisons = Vec::new();
    for (i, a) in metrics.iter().enumerate() {
        for b in &metrics[i + 1..] {
            comparisons.push(compare(a, b));
        }
    }
    comparisons
}
