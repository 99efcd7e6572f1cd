//! Rendering finished benchmark runs for humans and spreadsheets.

use crate::benchmark::BenchmarkRun;
use crate::error::Result;
use std::fmt::Write;

/// Output format for `bench --format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    /// Aligned text summary
    Table,
    /// The full run as pretty-printed JSON
    Json,
    /// One row per pipeline
    Csv,
    /// Standalone page with the CSV columns and the comparisons
    Html,
}

pub const CSV_HEADER: &str =
    "Pipeline ID,Mean Latency (ms),Retrieval Score,Success Rate,Throughput (QPS)";

pub fn render(run: &BenchmarkRun, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Table => Ok(to_table(run)),
        ExportFormat::Json => to_json(run),
        ExportFormat::Csv => Ok(to_csv(run)),
        ExportFormat::Html => Ok(to_html(run)),
    }
}

pub fn to_json(run: &BenchmarkRun) -> Result<String> {
    Ok(serde_json::to_string_pretty(run)?)
}

pub fn to_csv(run: &BenchmarkRun) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for m in &run.metrics {
        lines.push(format!(
            "{},{:.2},{:.4},{:.2}%,{:.2}",
            csv_field(&m.pipeline_id),
            m.latency_ms.mean,
            m.retrieval_score.mean,
            m.success_rate * 100.0,
            m.throughput_qps
        ));
    }
    lines.join("\n")
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn to_html(run: &BenchmarkRun) -> String {
    let title = format!("Benchmark {} ({})", html_escape(&run.name), html_escape(&run.id));
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><meta charset=\"utf-8\"><title>{}</title></head><body>", title);
    let _ = writeln!(out, "<h1>{}</h1>", title);
    let _ = writeln!(
        out,
        "<p>Status: {} in {:.2}s</p>",
        run.status.as_str(),
        run.duration_secs
    );
    if let Some(error) = &run.error {
        let _ = writeln!(out, "<p class=\"error\">Error: {}</p>", html_escape(error));
    }

    let _ = writeln!(out, "<table>");
    let header: Vec<String> = CSV_HEADER
        .split(',')
        .map(|h| format!("<th>{}</th>", html_escape(h)))
        .collect();
    let _ = writeln!(out, "<tr>{}</tr>", header.concat());
    for m in &run.metrics {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{:.2}</td><td>{:.4}</td><td>{:.2}%</td><td>{:.2}</td></tr>",
            html_escape(&m.pipeline_id),
            m.latency_ms.mean,
            m.retrieval_score.mean,
            m.success_rate * 100.0,
            m.throughput_qps
        );
    }
    let _ = writeln!(out, "</table>");

    if !run.comparisons.is_empty() {
        let _ = writeln!(out, "<h2>Comparisons</h2>\n<ul>");
        for c in &run.comparisons {
            let _ = writeln!(
                out,
                "<li>{} vs {}: {}</li>",
                html_escape(&c.pipeline_a),
                html_escape(&c.pipeline_b),
                html_escape(&c.summary)
            );
        }
        let _ = writeln!(out, "</ul>");
    }
    let _ = writeln!(out, "</body></html>");
    out
}

pub fn to_table(run: &BenchmarkRun) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Benchmark {} ({}): {} in {:.2}s",
        run.name,
        run.id,
        run.status.as_str(),
        run.duration_secs
    );
    if let Some(error) = &run.error {
        let _ = writeln!(out, "Error: {}", error);
    }

    let _ = writeln!(
        out,
        "\n{:<24} {:>8} {:>10} {:>10} {:>10} {:>8} {:>9} {:>8}",
        "pipeline", "queries", "mean ms", "p95 ms", "score", "success", "qps", "timeout"
    );
    for m in &run.metrics {
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>10.1} {:>10.1} {:>10.4} {:>7.1}% {:>9.2} {:>8}",
            m.pipeline_id,
            m.total_queries,
            m.latency_ms.mean,
            m.latency_ms.p95,
            m.retrieval_score.mean,
            m.success_rate * 100.0,
            m.throughput_qps,
            if m.timed_out { "yes" } else { "" }
        );
    }

    if !run.comparisons.is_empty() {
        let _ = writeln!(out, "\nComparisons:");
        for c in &run.comparisons {
            let _ = writeln!(out, "  {} vs {}: {}", c.pipeline_a, c.pipeline_b, c.summary);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::stats::SampleSet;
    use crate::benchmark::{compare_all, BenchmarkRequest, BenchmarkStatus, QueryTestCase};

    fn run() -> BenchmarkRun {
        let request = BenchmarkRequest::new(
            "nightly",
            vec!["fast".to_string(), "deep, slow".to_string()],
            vec![QueryTestCase {
                id: "c1".to_string(),
                query: "q".to_string(),
                query_type: None,
                expected_answer: None,
                metadata: None,
            }],
        );
        let mut run = BenchmarkRun::pending(&request);
        run.status = BenchmarkStatus::Completed;
        run.metrics = vec![
            SampleSet {
                latencies_ms: vec![100.0, 300.0],
                scores: vec![0.5, 0.7],
                executed: 2,
                ..Default::default()
            }
            .summarize("fast"),
            SampleSet {
                latencies_ms: vec![500.0],
                scores: vec![0.9],
                executed: 2,
                failed: 1,
                ..Default::default()
            }
            .summarize("deep, slow"),
        ];
        run.comparisons = compare_all(&run.metrics);
        run
    }

    #[test]
    fn test_csv_rows() {
        let csv = to_csv(&run());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "fast,200.00,0.6000,100.00%,5.00");
        assert_eq!(lines[2], "\"deep, slow\",500.00,0.9000,50.00%,2.00");
    }

    #[test]
    fn test_json_is_the_full_run() {
        let original = run();
        let json = render(&original, ExportFormat::Json).unwrap();
        let parsed: BenchmarkRun = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, original.id);
        assert_eq!(parsed.status, BenchmarkStatus::Completed);
        assert_eq!(parsed.metrics.len(), 2);
        assert_eq!(parsed.metrics[1].failed_queries, 1);
        assert_eq!(parsed.comparisons.len(), 1);
    }

    #[test]
    fn test_table_lists_pipelines_and_comparisons() {
        let table = to_table(&run());
        assert!(table.contains("nightly"));
        assert!(table.contains("completed"));
        assert!(table.contains("fast"));
        assert!(table.contains("Comparisons:"));
        assert!(table.contains("fast vs deep, slow"));
    }

    #[test]
    fn test_html_rows_and_escaping() {
        let mut run = run();
        run.name = "nightly <b>&</b>".to_string();
        let html = render(&run, ExportFormat::Html).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Benchmark nightly &lt;b&gt;&amp;&lt;/b&gt;"));
        assert!(!html.contains("<b>"));
        assert!(html.contains("<th>Pipeline ID</th><th>Mean Latency (ms)</th>"));
        assert!(html.contains(
            "<tr><td>fast</td><td>200.00</td><td>0.6000</td><td>100.00%</td><td>5.00</td></tr>"
        ));
        assert!(html.contains("<td>deep, slow</td><td>500.00</td>"));
        assert_eq!(html.matches("<tr>").count(), 3);
        assert!(html.contains("<li>fast vs deep, slow: "));
    }
}
