pub mod backend;
pub mod benchmark;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod report;
pub mod types;

pub use config::Config;
pub use context::AppContext;
pub use error::{RagstudioError, Result};
