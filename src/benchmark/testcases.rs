//! Benchmark test cases: JSON loading and template-based generation.

use crate::benchmark::QueryTestCase;
use crate::error::{RagstudioError, Result};
use std::path::Path;

pub const DEFAULT_CATEGORIES: [&str; 4] = ["factual", "analytical", "comparative", "explanatory"];

const TOPICS: [&str; 12] = [
    "machine learning",
    "natural language processing",
    "computer vision",
    "deep learning",
    "reinforcement learning",
    "neural networks",
    "transformers",
    "attention mechanism",
    "gradient descent",
    "backpropagation",
    "convolutional networks",
    "recurrent networks",
];

fn templates_for(category: &str) -> Option<&'static [&'static str]> {
    let templates: &'static [&'static str] = match category {
        "factual" => &[
            "What is {}?",
            "Define {}.",
            "When was {} established?",
            "Who invented {}?",
            "Where is {} used?",
        ],
        "analytical" => &[
            "What are the advantages of {}?",
            "How does {} work?",
            "What factors influence {}?",
            "Analyze the impact of {} on {}.",
            "What are the key components of {}?",
        ],
        "comparative" => &[
            "Compare {} and {}.",
            "What is the difference between {} and {}?",
            "Which is better: {} or {}?",
            "How does {} differ from {}?",
            "Contrast {} with {}.",
        ],
        "explanatory" => &[
            "Explain the concept of {}.",
            "Why is {} important?",
            "How can {} be improved?",
            "What causes {}?",
            "Describe the process of {}.",
        ],
        _ => return None,
    };
    Some(templates)
}

/// Generate `count` cases cycling through `categories` (all four when empty).
///
/// Case `i` uses category `i % categories`, template `i % templates`, and fills
/// each `{}` with distinct topics starting at a rotating offset, so the output
/// is the same on every call.
pub fn generate(count: usize, categories: &[String]) -> Result<Vec<QueryTestCase>> {
    let categories: Vec<String> = if categories.is_empty() {
        DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
    } else {
        categories.to_vec()
    };

    let mut cases = Vec::with_capacity(count);
    for i in 0..count {
        let category = &categories[i % categories.len()];
        let templates = templates_for(category).ok_or_else(|| {
            RagstudioError::InvalidInput(format!("unknown query category '{}'", category))
        })?;
        let template = templates[i % templates.len()];

        let mut query = String::with_capacity(template.len() + 32);
        let mut parts = template.split("{}");
        if let Some(first) = parts.next() {
            query.push_str(first);
        }
        for (slot, rest) in parts.enumerate() {
            query.push_str(TOPICS[(i * 5 + slot * 7) % TOPICS.len()]);
            query.push_str(rest);
        }

        cases.push(QueryTestCase {
            id: format!("test_{:04}", i),
            query,
            query_type: Some(category.clone()),
            expected_answer: None,
            metadata: Some(serde_json::json!({
                "auto_generated": true,
                "template": template,
                "index": i,
            })),
        });
    }

    log::info!("Generated {} test cases", cases.len());
    Ok(cases)
}

/// Clamp a requested case count to the configured `max_queries`.
pub fn capped_count(requested: usize, max_queries: usize) -> usize {
    if requested > max_queries {
        log::warn!(
            "Requested {} test cases, capping at benchmark.max_queries = {}",
            requested,
            max_queries
        );
        max_queries
    } else {
        requested
    }
}

/// Load cases from a JSON array file.
pub fn load(path: &Path) -> Result<Vec<QueryTestCase>> {
    let content = std::fs::read_to_string(path)?;
    let cases: Vec<QueryTestCase> = serde_json::from_str(&content)?;
    if let Some(empty) = cases.iter().find(|c| c.query.trim().is_empty()) {
        return Err(RagstudioError::InvalidInput(format!(
            "test case '{}' has an empty query",
            empty.id
        )));
    }
    Ok(cases)
}
