use crate::graph::QueryExecutionGraph;
use crate::pipeline::RagPipeline;
use crate::types::{Query, QueryResult};
use async_trait::async_trait;

/// [`RagPipeline`] backed by the adaptive query execution graph.
pub struct GraphPipeline {
    graph: QueryExecutionGraph,
}

impl GraphPipeline {
    pub fn new(graph: QueryExecutionGraph) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl RagPipeline for GraphPipeline {
    async fn process(&self, query: &Query) -> QueryResult {
        self.graph.run(query).await
    }
}
