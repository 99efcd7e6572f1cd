//! Parsing of completion-backend output for the analysis, rewrite and relevance prompts.

use crate::error::{RagstudioError, Result};
use crate::graph::state::{Complexity, Intent, QueryAnalysis};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Rewritten queries at or below this many characters are discarded.
pub const MIN_REWRITE_CHARS: usize = 10;

/// At most this many search queries leave the rewrite node.
pub const MAX_SEARCH_QUERIES: usize = 3;

/// Parse the analysis JSON. Tolerates code fences and prose around the object;
/// unknown intent/complexity values fall back to factual/medium.
pub fn parse_analysis(raw: &str, query: &str) -> Result<QueryAnalysis> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let object = match (start, end) {
        (Some(s), Some(e)) if s < e => &raw[s..=e],
        _ => return Err(RagstudioError::Parse("no JSON object in analysis output".to_string())),
    };

    let value: Value = serde_json::from_str(object)?;
    let fallback = QueryAnalysis::unparsed_fallback(query);

    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .and_then(Intent::parse)
        .unwrap_or(fallback.intent);
    let complexity = value
        .get("complexity")
        .and_then(Value::as_str)
        .and_then(Complexity::parse)
        .unwrap_or(fallback.complexity);

    let keywords = string_list(&value, "keywords");
    let suggested_queries = string_list(&value, "suggested_queries");

    Ok(QueryAnalysis {
        intent,
        complexity,
        entities: string_list(&value, "entities"),
        keywords: if keywords.is_empty() { fallback.keywords } else { keywords },
        needs_multi_query: flag(&value, "requires_multiple_steps"),
        needs_clarification: flag(&value, "clarification_needed"),
        suggested_queries: if suggested_queries.is_empty() {
            fallback.suggested_queries
        } else {
            suggested_queries
        },
    })
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Accepts JSON booleans and the strings "true"/"false".
fn flag(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Extract rewritten search queries from line-oriented output.
///
/// Blank lines, `#` headings and lead-in lines ending in `:` are skipped. Returns an
/// empty list when nothing usable was found; the caller decides the fallback.
pub fn parse_rewrites(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.ends_with(':'))
        .filter(|line| line.chars().count() > MIN_REWRITE_CHARS)
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(MAX_SEARCH_QUERIES)
        .collect()
}

fn strip_list_marker(line: &str) -> String {
    line.trim_start_matches(|c: char| {
        c.is_ascii_digit() || matches!(c, '.' | '-' | ')' | '*' | '•' | ' ')
    })
    .trim_matches('"')
    .trim()
    .to_string()
}

fn score_regex() -> &'static Regex {
    static SCORE: OnceLock<Regex> = OnceLock::new();
    SCORE.get_or_init(|| {
        Regex::new(r"(?i)score\s*[:=]\s*\[?\s*(\d+(?:\.\d+)?)").expect("Invalid regex pattern")
    })
}

/// Relevance score (0-10) from the relevance prompt's output, if one can be found.
pub fn parse_relevance_score(raw: &str) -> Option<f32> {
    score_regex()
        .captures(raw)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analysis_plain_json() {
        let raw = r#"{"intent": "comparative", "complexity": "complex",
            "entities": ["Rust", "Go"], "keywords": ["rust", "go", "performance"],
            "requires_multiple_steps": true, "clarification_needed": "false",
            "suggested_queries": ["rust performance", "go performance"]}"#;
        let analysis = parse_analysis(raw, "rust vs go?").unwrap();
        assert_eq!(analysis.intent, Intent::Comparative);
        assert_eq!(analysis.complexity, Complexity::Complex);
        assert!(analysis.needs_multi_query);
        assert!(!analysis.needs_clarification);
        assert_eq!(analysis.entities, vec!["Rust", "Go"]);
        assert_eq!(analysis.suggested_queries.len(), 2);
    }

    #[test]
    fn test_parse_analysis_code_fence_and_unknown_values() {
        let raw = "Here you go:\n```json\n{\"intent\": \"explanatory\", \"complexity\": \"extreme\", \"requires_multiple_steps\": \"TRUE\"}\n```";
        let analysis = parse_analysis(raw, "why is the sky blue").unwrap();
        assert_eq!(analysis.intent, Intent::Factual);
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert!(analysis.needs_multi_query);
        assert_eq!(analysis.keywords, vec!["why is the sky blue"]);
    }

    #[test]
    fn test_parse_analysis_rejects_non_json() {
        assert!(parse_analysis("I think this is a factual question.", "q").is_err());
        assert!(parse_analysis("{ broken json", "q").is_err());
    }

    #[test]
    fn test_parse_rewrites_strips_markers() {
        let raw = "Rewritten queries:\n1. rust ownership rules explained\n- borrow checker lifetime errors\n\n# heading line that is long\n* short\n3) move semantics in rust functions";
        let queries = parse_rewrites(raw);
        assert_eq!(
            queries,
            vec![
                "rust ownership rules explained".to_string(),
                "borrow checker lifetime errors".to_string(),
                "move semantics in rust functions".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_rewrites_caps_at_three() {
        let raw = "1. first rewritten query\n2. second rewritten query\n3. third rewritten query\n4. fourth rewritten query";
        let queries = parse_rewrites(raw);
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[2], "third rewritten query");
    }

    #[test]
    fn test_parse_rewrites_nothing_usable() {
        assert!(parse_rewrites("ok\n\n- short\n# only a heading here").is_empty());
    }

    #[test]
    fn test_parse_relevance_score() {
        assert_eq!(parse_relevance_score("Score: 8\nReason: on topic"), Some(8.0));
        assert_eq!(parse_relevance_score("score = [6.5] because"), Some(6.5));
        assert_eq!(parse_relevance_score("Relevant, I would say."), None);
    }
}
