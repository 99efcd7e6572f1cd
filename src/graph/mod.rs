//! Adaptive query execution graph.
//!
//! Analyzes the query, routes by complexity, optionally rewrites it into several
//! search queries, retrieves, filters, reranks, answers and, when the quality gate
//! asks for it, refines the answer. See [`executor::default_edges`] for the topology.

pub mod executor;
pub mod nodes;
pub mod parse;
pub mod prompts;
pub mod state;

pub use executor::{Edge, Node, QueryExecutionGraph};
pub use nodes::GraphDeps;
pub use state::{Complexity, ExecutionState, Intent, QueryAnalysis};
