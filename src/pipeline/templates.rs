//! Built-in starting points for new pipelines.

use crate::error::{RagstudioError, Result};
use crate::pipeline::{PipelineConfig, PipelineVariant};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub variant: PipelineVariant,
    pub is_default: bool,
    top_k: usize,
    temperature: f32,
    max_tokens: u32,
    use_llm_filtering: bool,
    max_context_docs: Option<usize>,
}

impl PipelineTemplate {
    /// Config for a new pipeline built from this template.
    pub fn instantiate(&self, id: &str, name: &str, index_name: &str) -> PipelineConfig {
        let mut config = PipelineConfig::new(id, self.variant, index_name);
        config.name = name.to_string();
        config.retrieval.top_k = self.top_k;
        config.retrieval.use_llm_filtering = self.use_llm_filtering;
        if let Some(max_context_docs) = self.max_context_docs {
            config.retrieval.max_context_docs = max_context_docs;
        }
        config.generation.temperature = self.temperature;
        config.generation.max_tokens = self.max_tokens;
        config
    }
}

pub fn templates() -> Vec<PipelineTemplate> {
    vec![
        PipelineTemplate {
            key: "basic_qa",
            name: "Basic Q&A",
            description: "Plain retrieve-and-answer pipeline for simple questions",
            category: "qa",
            variant: PipelineVariant::Simple,
            is_default: true,
            top_k: 5,
            temperature: 0.7,
            max_tokens: 2000,
            use_llm_filtering: false,
            max_context_docs: None,
        },
        PipelineTemplate {
            key: "complex_analysis",
            name: "Complex analysis",
            description: "Adaptive graph pipeline for questions that need multi-step reasoning",
            category: "analysis",
            variant: PipelineVariant::Graph,
            is_default: false,
            top_k: 10,
            temperature: 0.5,
            max_tokens: 3000,
            use_llm_filtering: true,
            max_context_docs: Some(7),
        },
        PipelineTemplate {
            key: "document_summary",
            name: "Document summary",
            description: "Low-temperature pipeline tuned for summarizing documents",
            category: "summarization",
            variant: PipelineVariant::Simple,
            is_default: false,
            top_k: 3,
            temperature: 0.3,
            max_tokens: 1500,
            use_llm_filtering: false,
            max_context_docs: None,
        },
    ]
}

pub fn template(key: &str) -> Result<PipelineTemplate> {
    templates()
        .into_iter()
        .find(|t| t.key == key)
        .ok_or_else(|| RagstudioError::InvalidInput(format!("unknown pipeline template '{}'", key)))
}
