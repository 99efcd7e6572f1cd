//! Explicit node/edge table and the loop that walks it.

use crate::error::{RagstudioError, Result};
use crate::graph::nodes::{self, GraphDeps};
use crate::graph::state::{Complexity, ExecutionState};
use crate::pipeline::PipelineVariant;
use crate::types::{Query, QueryMetadata, QueryResult, QueryStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    AnalyzeQuery,
    RouteComplexity,
    RewriteQueries,
    RetrieveDocuments,
    FilterDocuments,
    RerankDocuments,
    GenerateInitialAnswer,
    CheckQuality,
    RefineAnswer,
    FinalizeAnswer,
}

impl Node {
    pub const ALL: [Node; 10] = [
        Node::AnalyzeQuery,
        Node::RouteComplexity,
        Node::RewriteQueries,
        Node::RetrieveDocuments,
        Node::FilterDocuments,
        Node::RerankDocuments,
        Node::GenerateInitialAnswer,
        Node::CheckQuality,
        Node::RefineAnswer,
        Node::FinalizeAnswer,
    ];

    /// Name recorded in the execution path.
    pub fn name(&self) -> &'static str {
        match self {
            Node::AnalyzeQuery => "analyze_query",
            Node::RouteComplexity => "route_complexity",
            Node::RewriteQueries => "rewrite_queries",
            Node::RetrieveDocuments => "retrieve_documents",
            Node::FilterDocuments => "filter_documents",
            Node::RerankDocuments => "rerank_documents",
            Node::GenerateInitialAnswer => "generate_initial_answer",
            Node::CheckQuality => "check_quality",
            Node::RefineAnswer => "refine_answer",
            Node::FinalizeAnswer => "finalize_answer",
        }
    }

    async fn run(self, state: ExecutionState, deps: &GraphDeps) -> ExecutionState {
        match self {
            Node::AnalyzeQuery => nodes::analyze_query(state, deps).await,
            Node::RouteComplexity => nodes::route_complexity(state, deps).await,
            Node::RewriteQueries => nodes::rewrite_queries(state, deps).await,
            Node::RetrieveDocuments => nodes::retrieve_documents(state, deps).await,
            Node::FilterDocuments => nodes::filter_documents(state, deps).await,
            Node::RerankDocuments => nodes::rerank_documents(state, deps).await,
            Node::GenerateInitialAnswer => nodes::generate_initial_answer(state, deps).await,
            Node::CheckQuality => nodes::check_quality(state, deps).await,
            Node::RefineAnswer => nodes::refine_answer(state, deps).await,
            Node::FinalizeAnswer => nodes::finalize_answer(state, deps).await,
        }
    }
}

/// Outgoing edge of a node.
#[derive(Clone, Copy)]
pub enum Edge {
    To(Node),
    /// Conditional edge, decided from the state after the node ran. The decision
    /// must be one of `targets`.
    Branch {
        decide: fn(&ExecutionState) -> Node,
        targets: &'static [Node],
    },
    End,
}

pub fn route_by_complexity(state: &ExecutionState) -> Node {
    if state.analysis.complexity == Complexity::Complex || state.needs_multi_query {
        Node::RewriteQueries
    } else {
        Node::RetrieveDocuments
    }
}

pub fn route_by_quality(state: &ExecutionState) -> Node {
    if state.needs_refinement {
        Node::RefineAnswer
    } else {
        Node::FinalizeAnswer
    }
}

/// The fixed topology.
pub fn default_edges(node: Node) -> Edge {
    match node {
        Node::AnalyzeQuery => Edge::To(Node::RouteComplexity),
        Node::RouteComplexity => Edge::Branch {
            decide: route_by_complexity,
            targets: &[Node::RewriteQueries, Node::RetrieveDocuments],
        },
        Node::RewriteQueries => Edge::To(Node::RetrieveDocuments),
        Node::RetrieveDocuments => Edge::To(Node::FilterDocuments),
        Node::FilterDocuments => Edge::To(Node::RerankDocuments),
        Node::RerankDocuments => Edge::To(Node::GenerateInitialAnswer),
        Node::GenerateInitialAnswer => Edge::To(Node::CheckQuality),
        Node::CheckQuality => Edge::Branch {
            decide: route_by_quality,
            targets: &[Node::RefineAnswer, Node::FinalizeAnswer],
        },
        Node::RefineAnswer => Edge::To(Node::FinalizeAnswer),
        Node::FinalizeAnswer => Edge::End,
    }
}

/// Adaptive retrieve-and-generate graph for one pipeline.
///
/// Nodes run strictly in sequence. Node-level backend failures degrade to
/// defaults; only a broken topology fails the query.
pub struct QueryExecutionGraph {
    deps: GraphDeps,
    edges: fn(Node) -> Edge,
}

impl QueryExecutionGraph {
    pub fn new(deps: GraphDeps) -> Self {
        Self { deps, edges: default_edges }
    }

    #[cfg(test)]
    pub(crate) fn with_edges(deps: GraphDeps, edges: fn(Node) -> Edge) -> Self {
        Self { deps, edges }
    }

    /// Run the graph to completion. Never returns an error: a graph failure
    /// becomes a failed [`QueryResult`].
    pub async fn run(&self, query: &Query) -> QueryResult {
        let state = ExecutionState::new(query, &self.deps.config.retrieval.filters);
        let started_at = state.started_at;

        match self.walk(state).await {
            Ok(state) => into_result(state),
            Err(e) => {
                log::error!("Graph execution failed for query {}: {}", query.id, e);
                let latency_ms = started_at.elapsed().as_millis() as u64;
                QueryResult::failed(query, PipelineVariant::Graph, &e.to_string(), latency_ms)
            }
        }
    }

    async fn walk(&self, mut state: ExecutionState) -> Result<ExecutionState> {
        let max_steps = Node::ALL.len();
        let mut current = Node::AnalyzeQuery;
        let mut steps = 0;

        loop {
            steps += 1;
            if steps > max_steps {
                return Err(RagstudioError::Graph(format!(
                    "exceeded {} steps, path: {}",
                    max_steps,
                    state.execution_path.join(" -> ")
                )));
            }

            state.execution_path.push(current.name().to_string());
            state = current.run(state, &self.deps).await;

            current = match (self.edges)(current) {
                Edge::To(next) => next,
                Edge::Branch { decide, targets } => {
                    let next = decide(&state);
                    if !targets.contains(&next) {
                        return Err(RagstudioError::Graph(format!(
                            "invalid edge {} -> {}",
                            current.name(),
                            next.name()
                        )));
                    }
                    next
                }
                Edge::End => break,
            };
        }

        if !state.is_complete {
            return Err(RagstudioError::Graph(format!(
                "graph ended without finalizing, path: {}",
                state.execution_path.join(" -> ")
            )));
        }
        Ok(state)
    }
}

fn into_result(state: ExecutionState) -> QueryResult {
    let status = if state.reranked.is_empty() {
        QueryStatus::NoResults
    } else {
        QueryStatus::Completed
    };
    let latency_ms = state.elapsed_ms();

    let mut metadata = QueryMetadata::new(status, PipelineVariant::Graph);
    metadata.retrieved_count = state.retrieved.len();
    metadata.filtered_count = state.filtered.len();
    metadata.final_count = state.reranked.len();
    metadata.refinement_applied = state.needs_refinement && !state.refined_answer.is_empty();
    metadata.execution_path = state.execution_path;
    metadata.analysis = Some(state.analysis);
    metadata.search_queries = state.search_queries;
    metadata.degraded_nodes = state.degraded_nodes;

    QueryResult {
        query_id: state.query_id,
        query_text: state.query,
        answer: state.final_answer,
        chunks: state.reranked,
        latency_ms,
        metadata,
    }
}
