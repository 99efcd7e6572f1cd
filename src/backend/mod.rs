//! Narrow interfaces to the two external services the pipelines depend on.
//!
//! The core never talks to a vector index or an LLM directly: it goes through
//! [`RetrievalBackend`] and [`CompletionBackend`]. Shipped implementations are the
//! OpenSearch retriever and the OpenAI-compatible chat completion client.

pub mod openai;
pub mod opensearch;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::Result;
use crate::types::{RetrievedChunk, SearchFilters};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiCompletion;
pub use opensearch::OpenSearchRetriever;

/// Chunks returned for one search call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub chunks: Vec<RetrievedChunk>,
    pub took_ms: u64,
}

/// Scored-chunk search over a named index.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn search(
        &self,
        index: &str,
        query_text: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<SearchResponse>;

    /// Release held resources. Later searches may fail.
    async fn close(&self) {}
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Single user-message prompt.
    pub fn prompt(prompt: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
            temperature,
            max_tokens,
        }
    }

    /// Concatenated message contents, handy for logging and test matching.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text generation service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, request: CompletionRequest) -> Result<String>;
}
