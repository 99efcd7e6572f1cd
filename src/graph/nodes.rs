//! Node implementations of the query execution graph.
//!
//! Each node takes the state by value and returns it. Backend failures never
//! escape a node: every node picks its own fallback and records it with
//! [`ExecutionState::degrade`].

use crate::backend::{CompletionBackend, CompletionRequest, RetrievalBackend};
use crate::graph::parse::{parse_analysis, parse_relevance_score, parse_rewrites, MAX_SEARCH_QUERIES};
use crate::graph::prompts;
use crate::graph::state::{Complexity, ExecutionState, QueryAnalysis};
use crate::pipeline::{PipelineConfig, QualityParams};
use crate::types::{RetrievedChunk, NO_RELEVANT_INFORMATION};
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Chunks the LLM relevance check scores below this are dropped.
pub const MIN_LLM_RELEVANCE: f32 = 7.0;

/// Separator placed between chunks in the generation context.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Everything a node may touch besides the state.
#[derive(Clone)]
pub struct GraphDeps {
    pub retrieval: Arc<dyn RetrievalBackend>,
    pub completion: Arc<dyn CompletionBackend>,
    pub config: Arc<PipelineConfig>,
}

impl GraphDeps {
    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::prompt(
            prompt,
            self.config.generation.temperature,
            self.config.generation.max_tokens,
        )
    }
}

pub async fn analyze_query(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    let analysis = match deps
        .completion
        .generate(deps.request(prompts::query_analysis(&state.query)))
        .await
    {
        Ok(raw) => match parse_analysis(&raw, &state.query) {
            Ok(analysis) => analysis,
            Err(e) => {
                state.degrade("analyze_query", e);
                QueryAnalysis::unparsed_fallback(&state.query)
            }
        },
        Err(e) => {
            state.degrade("analyze_query", e);
            QueryAnalysis::backend_fallback()
        }
    };

    log::info!(
        "Query {} analyzed: {} complexity, {} intent",
        state.query_id,
        analysis.complexity.as_str(),
        analysis.intent.as_str()
    );

    state.needs_multi_query = analysis.needs_multi_query;
    state.needs_clarification = analysis.needs_clarification;
    state.analysis = analysis;
    state
}

/// Branch node; the decision itself lives in the edge table.
pub async fn route_complexity(state: ExecutionState, _deps: &GraphDeps) -> ExecutionState {
    state
}

pub async fn rewrite_queries(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    let queries = match deps
        .completion
        .generate(deps.request(prompts::query_rewrite(&state.query, &state.analysis)))
        .await
    {
        Ok(raw) => {
            let parsed = parse_rewrites(&raw);
            if parsed.is_empty() {
                state.degrade("rewrite_queries", "no usable rewritten queries");
                vec![state.query.clone()]
            } else {
                parsed
            }
        }
        Err(e) => {
            state.degrade("rewrite_queries", e);
            vec![state.query.clone()]
        }
    };

    log::info!("Query {} rewritten into {} search queries", state.query_id, queries.len());
    state.search_queries = queries;
    state
}

pub async fn retrieve_documents(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    if state.search_queries.is_empty() {
        state.search_queries = vec![state.query.clone()];
    }
    state.search_queries.truncate(MAX_SEARCH_QUERIES);

    let top_k = state.top_k.unwrap_or(deps.config.retrieval.top_k);
    let start = std::time::Instant::now();
    let searches = state.search_queries.iter().map(|search_query| {
        let filters = &state.filters;
        async move {
            let result = deps
                .retrieval
                .search(&deps.config.index_name, search_query, top_k, filters)
                .await;
            (search_query.as_str(), result)
        }
    });
    let responses = join_all(searches).await;

    let mut batches = Vec::with_capacity(responses.len());
    for (search_query, response) in responses {
        match response {
            Ok(response) => batches.push(response.chunks),
            Err(e) => log::error!("Search failed for query '{}': {}", search_query, e),
        }
    }

    state.retrieved = merge_chunks(batches);
    log::debug!(
        "Query {}: {} unique chunks from {} searches in {:?}",
        state.query_id,
        state.retrieved.len(),
        state.search_queries.len(),
        start.elapsed()
    );
    state
}

pub async fn filter_documents(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    let params = &deps.config.retrieval;
    let candidates = filter_by_threshold(&state.retrieved, params.min_relevance_score, params.min_chunk_chars);

    let filtered = if params.use_llm_filtering {
        let mut kept = Vec::with_capacity(candidates.len());
        for chunk in candidates {
            let prompt = prompts::relevance(&state.query, &chunk.title, &chunk.text);
            match deps.completion.generate(deps.request(prompt)).await {
                Ok(raw) => match parse_relevance_score(&raw) {
                    Some(score) if score < MIN_LLM_RELEVANCE => {
                        log::debug!("Dropping chunk {:?} (LLM relevance {})", chunk.key(), score);
                        continue;
                    }
                    _ => kept.push(chunk),
                },
                Err(e) => {
                    log::warn!("LLM relevance check failed, keeping chunk {:?}: {}", chunk.key(), e);
                    kept.push(chunk);
                }
            }
        }
        kept
    } else {
        candidates
    };

    log::info!("Query {}: {} chunks kept after filtering", state.query_id, filtered.len());
    state.filtered = filtered;
    state
}

pub async fn rerank_documents(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    let params = &deps.config.retrieval;
    state.reranked = rerank_diverse(&state.filtered, params.max_context_docs, params.max_chunks_per_document);
    log::info!("Query {}: {} chunks selected as context", state.query_id, state.reranked.len());
    state
}

pub async fn generate_initial_answer(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    state.context = build_context(&state.reranked);

    if state.context.trim().is_empty() {
        state.initial_answer = NO_RELEVANT_INFORMATION.to_string();
        return state;
    }

    let prompt = prompts::answer(&state.query, state.analysis.intent.as_str(), &state.context);
    state.initial_answer = match deps.completion.generate(deps.request(prompt)).await {
        Ok(answer) => answer.trim().to_string(),
        Err(e) => {
            let answer = format!("An error occurred while generating the answer: {}", e);
            state.degrade("generate_initial_answer", e);
            answer
        }
    };
    state
}

pub async fn check_quality(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    state.needs_refinement = needs_refinement(&state, &deps.config.quality);
    state
}

pub async fn refine_answer(mut state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
    let additional_context = format!(
        "Query analysis: {}\nRetrieved documents: {}\nSearch queries used: {:?}",
        state.analysis.summary(),
        state.retrieved.len(),
        state.search_queries
    );
    let prompt = prompts::refinement(&state.query, &state.initial_answer, &additional_context);

    state.refined_answer = match deps.completion.generate(deps.request(prompt)).await {
        Ok(refined) if !refined.trim().is_empty() => refined.trim().to_string(),
        Ok(_) => {
            state.degrade("refine_answer", "empty refinement");
            state.initial_answer.clone()
        }
        Err(e) => {
            state.degrade("refine_answer", e);
            state.initial_answer.clone()
        }
    };
    state
}

pub async fn finalize_answer(mut state: ExecutionState, _deps: &GraphDeps) -> ExecutionState {
    state.final_answer = if state.needs_refinement && !state.refined_answer.is_empty() {
        state.refined_answer.clone()
    } else {
        state.initial_answer.clone()
    };
    state.is_complete = true;
    state
}

/// Merge per-query result lists: keep the first occurrence of each
/// (document id, chunk index) and sort by score, highest first.
pub fn merge_chunks(batches: Vec<Vec<RetrievedChunk>>) -> Vec<RetrievedChunk> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut unique: Vec<RetrievedChunk> = batches
        .into_iter()
        .flatten()
        .filter(|chunk| seen.insert((chunk.document_id.clone(), chunk.chunk_index)))
        .collect();

    // Stable: equal scores keep merge order
    unique.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    unique
}

pub fn filter_by_threshold(chunks: &[RetrievedChunk], min_score: f32, min_chars: usize) -> Vec<RetrievedChunk> {
    chunks
        .iter()
        .filter(|c| c.score >= min_score)
        .filter(|c| c.text.trim().chars().count() >= min_chars)
        .cloned()
        .collect()
}

/// Take chunks in order up to `max_total`, at most `max_per_document` from any one document.
pub fn rerank_diverse(chunks: &[RetrievedChunk], max_total: usize, max_per_document: usize) -> Vec<RetrievedChunk> {
    let mut per_document: HashMap<&str, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(max_total.min(chunks.len()));

    for chunk in chunks {
        if selected.len() >= max_total {
            break;
        }
        let count = per_document.entry(chunk.document_id.as_str()).or_insert(0);
        if *count >= max_per_document {
            continue;
        }
        *count += 1;
        selected.push(chunk.clone());
    }
    selected
}

pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            let title = if c.title.is_empty() { "Unknown" } else { c.title.as_str() };
            format!("[Document: {}]\n{}", title, c.text)
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Quality gate for the refinement branch.
///
/// The fixed no-information answer is never refined: there is no context to refine against.
pub fn needs_refinement(state: &ExecutionState, quality: &QualityParams) -> bool {
    if state.reranked.is_empty() {
        return false;
    }
    let answer = &state.initial_answer;
    if answer.chars().count() < quality.min_answer_chars {
        return true;
    }
    let lowered = answer.to_lowercase();
    if quality
        .failure_markers
        .iter()
        .any(|marker| lowered.contains(&marker.to_lowercase()))
    {
        return true;
    }
    state.analysis.complexity == Complexity::Complex
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::chunk;
    use crate::types::{Query, SearchFilters};

    #[test]
    fn test_merge_dedupes_and_sorts() {
        let batches = vec![
            vec![chunk("a", 0, 0.5, "first a0"), chunk("b", 1, 0.9, "b1")],
            vec![chunk("a", 0, 0.99, "duplicate a0"), chunk("c", 0, 0.7, "c0")],
            vec![chunk("b", 2, 0.9, "b2")],
        ];
        let merged = merge_chunks(batches);

        let keys: Vec<_> = merged.iter().map(|c| (c.document_id.as_str(), c.chunk_index)).collect();
        assert_eq!(keys, vec![("b", 1), ("b", 2), ("c", 0), ("a", 0)]);
        // First occurrence wins, not the higher-scored duplicate
        assert_eq!(merged[3].text, "first a0");

        let unique: HashSet<_> = merged.iter().map(|c| c.key()).collect();
        assert_eq!(unique.len(), merged.len());
        for pair in merged.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_filter_by_threshold() {
        let chunks = vec![
            chunk("a", 0, 0.2, "long enough text for the filter"),
            chunk("b", 0, 0.8, "too short"),
            chunk("c", 0, 0.3, "exactly at the score threshold"),
            chunk("d", 0, 0.9, "   padded text that is long enough   "),
        ];
        let kept = filter_by_threshold(&chunks, 0.3, 20);
        let ids: Vec<_> = kept.iter().map(|c| c.document_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn test_rerank_diversity_cap() {
        let chunks = vec![
            chunk("a", 0, 0.9, "t"),
            chunk("a", 1, 0.8, "t"),
            chunk("a", 2, 0.7, "t"),
            chunk("b", 0, 0.6, "t"),
            chunk("a", 3, 0.5, "t"),
            chunk("c", 0, 0.4, "t"),
            chunk("d", 0, 0.3, "t"),
        ];
        let selected = rerank_diverse(&chunks, 5, 2);
        let keys: Vec<_> = selected.iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec![("a", 0), ("a", 1), ("b", 0), ("c", 0), ("d", 0)]);

        let small = rerank_diverse(&chunks, 2, 2);
        assert_eq!(small.len(), 2);
    }

    #[test]
    fn test_build_context_format() {
        let mut untitled = chunk("b", 0, 0.5, "second body");
        untitled.title.clear();
        let context = build_context(&[chunk("a", 0, 0.9, "first body"), untitled]);
        assert_eq!(
            context,
            "[Document: Title of a]\nfirst body\n\n---\n\n[Document: Unknown]\nsecond body"
        );
        assert_eq!(build_context(&[]), "");
    }

    fn state_with_answer(answer: &str, complexity: Complexity) -> ExecutionState {
        let mut state = ExecutionState::new(&Query::new("q"), &SearchFilters::new());
        state.reranked = vec![chunk("a", 0, 0.9, "context")];
        state.initial_answer = answer.to_string();
        state.analysis.complexity = complexity;
        state
    }

    #[test]
    fn test_needs_refinement_rules() {
        let quality = QualityParams::default();
        let good = "A thorough answer that is comfortably longer than fifty characters.";

        assert!(!needs_refinement(&state_with_answer(good, Complexity::Simple), &quality));
        assert!(needs_refinement(&state_with_answer("Too short.", Complexity::Simple), &quality));
        assert!(needs_refinement(&state_with_answer(good, Complexity::Complex), &quality));

        let failing = "The lookup FAILED because the upstream service returned nothing useful.";
        assert!(needs_refinement(&state_with_answer(failing, Complexity::Medium), &quality));
    }

    #[test]
    fn test_no_context_is_never_refined() {
        let mut state = state_with_answer(NO_RELEVANT_INFORMATION, Complexity::Complex);
        state.reranked.clear();
        assert!(!needs_refinement(&state, &QualityParams::default()));
    }
}
