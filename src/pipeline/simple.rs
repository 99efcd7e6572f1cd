//! Retrieve once, generate once.

use crate::backend::{CompletionBackend, CompletionRequest, RetrievalBackend};
use crate::graph::nodes::build_context;
use crate::graph::prompts;
use crate::pipeline::{PipelineConfig, PipelineVariant, RagPipeline};
use crate::types::{Query, QueryMetadata, QueryResult, QueryStatus, NO_RELEVANT_INFORMATION};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

pub struct SimplePipeline {
    retrieval: Arc<dyn RetrievalBackend>,
    completion: Arc<dyn CompletionBackend>,
    config: Arc<PipelineConfig>,
}

impl SimplePipeline {
    pub fn new(
        retrieval: Arc<dyn RetrievalBackend>,
        completion: Arc<dyn CompletionBackend>,
        config: Arc<PipelineConfig>,
    ) -> Self {
        Self { retrieval, completion, config }
    }
}

#[async_trait]
impl RagPipeline for SimplePipeline {
    async fn process(&self, query: &Query) -> QueryResult {
        let start = Instant::now();
        let variant = PipelineVariant::Simple;
        let top_k = query.top_k.unwrap_or(self.config.retrieval.top_k);
        let filters = query.effective_filters(&self.config.retrieval.filters);

        let chunks = match self
            .retrieval
            .search(&self.config.index_name, &query.text, top_k, &filters)
            .await
        {
            Ok(response) => response.chunks,
            Err(e) => {
                log::error!("Retrieval failed for query {}: {}", query.id, e);
                return QueryResult::failed(query, variant, &e.to_string(), elapsed_ms(start));
            }
        };

        let mut metadata = QueryMetadata::new(QueryStatus::Completed, variant);
        metadata.execution_path = vec!["retrieve_documents".to_string()];
        metadata.search_queries = vec![query.text.clone()];
        metadata.retrieved_count = chunks.len();
        metadata.filtered_count = chunks.len();
        metadata.final_count = chunks.len();

        if chunks.is_empty() {
            metadata.status = QueryStatus::NoResults;
            return QueryResult {
                query_id: query.id.clone(),
                query_text: query.text.clone(),
                answer: NO_RELEVANT_INFORMATION.to_string(),
                chunks,
                latency_ms: elapsed_ms(start),
                metadata,
            };
        }

        let prompt = prompts::simple_qa(&query.text, &build_context(&chunks));
        let request = CompletionRequest::prompt(
            prompt,
            self.config.generation.temperature,
            self.config.generation.max_tokens,
        );
        let answer = match self.completion.generate(request).await {
            Ok(answer) => answer.trim().to_string(),
            Err(e) => {
                log::error!("Generation failed for query {}: {}", query.id, e);
                return QueryResult::failed(query, variant, &e.to_string(), elapsed_ms(start));
            }
        };
        metadata.execution_path.push("generate_answer".to_string());

        QueryResult {
            query_id: query.id.clone(),
            query_text: query.text.clone(),
            answer,
            chunks,
            latency_ms: elapsed_ms(start),
            metadata,
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{chunk, ScriptedCompletion, StaticRetrieval};

    fn build(retrieval: StaticRetrieval, completion: ScriptedCompletion) -> (SimplePipeline, Arc<ScriptedCompletion>) {
        let completion = Arc::new(completion);
        let config = PipelineConfig::new("simple-test", PipelineVariant::Simple, "docs");
        (
            SimplePipeline::new(Arc::new(retrieval), completion.clone(), Arc::new(config)),
            completion,
        )
    }

    #[tokio::test]
    async fn test_answers_from_context() {
        let retrieval = StaticRetrieval::new(vec![
            chunk("a", 0, 0.9, "Tokio is an async runtime."),
            chunk("b", 0, 0.7, "It schedules tasks on worker threads."),
        ]);
        let (pipeline, completion) = build(retrieval, ScriptedCompletion::new(|_| Ok(" Tokio runs tasks. ".to_string())));

        let result = pipeline.process(&Query::new("What is tokio?")).await;
        assert_eq!(result.answer, "Tokio runs tasks.");
        assert_eq!(result.metadata.status, QueryStatus::Completed);
        assert_eq!(result.chunks.len(), 2);

        let prompts = completion.prompts();
        assert!(prompts[0].contains("[Document: Title of a]"));
        assert!(prompts[0].contains("Question: What is tokio?"));
    }

    #[tokio::test]
    async fn test_no_results_skips_generation() {
        let (pipeline, completion) = build(StaticRetrieval::empty(), ScriptedCompletion::failing());

        let result = pipeline.process(&Query::new("unknown topic")).await;
        assert_eq!(result.answer, NO_RELEVANT_INFORMATION);
        assert_eq!(result.metadata.status, QueryStatus::NoResults);
        assert_eq!(completion.call_count(), 0);
    }

    #[tokio::test]
    async fn test_backend_failures_fail_query() {
        let retrieval = StaticRetrieval::new(Vec::new()).failing_on("broken");
        let (pipeline, _) = build(retrieval, ScriptedCompletion::failing());
        let result = pipeline.process(&Query::new("broken")).await;
        assert!(result.is_failed());

        let retrieval = StaticRetrieval::new(vec![chunk("a", 0, 0.9, "some text")]);
        let (pipeline, _) = build(retrieval, ScriptedCompletion::failing());
        let result = pipeline.process(&Query::new("fine")).await;
        assert!(result.is_failed());
        assert!(result.answer.contains("model offline"));
    }

    #[tokio::test]
    async fn test_query_top_k_override() {
        let retrieval = StaticRetrieval::new((0..8).map(|i| chunk("a", i, 0.5, "text")).collect());
        let (pipeline, _) = build(retrieval, ScriptedCompletion::new(|_| Ok("ok".to_string())));
        let result = pipeline.process(&Query::new("q").with_top_k(2)).await;
        assert_eq!(result.chunks.len(), 2);
    }
}
