use crate::backend::{RetrievalBackend, SearchResponse};
use crate::embeddings::OpenAIEmbedder;
use crate::error::{RagstudioError, Result};
use crate::types::{RetrievedChunk, SearchFilters};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Basic-auth credentials for the cluster
#[derive(Debug, Clone)]
pub struct OpenSearchAuth {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    took: u64,
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_score", default)]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Deserialize)]
struct HitSource {
    document_id: String,
    #[serde(default)]
    title: String,
    chunk_text: String,
    #[serde(default)]
    chunk_index: u32,
    #[serde(default)]
    metadata: serde_json::Map<String, Value>,
}

/// Vector search against an OpenSearch index
///
/// The query is embedded with the OpenAI embeddings API and scored against the
/// index's `embedding` field with a `script_score` cosine query (score range 0-2,
/// `cosineSimilarity + 1.0`). Filters become `term` clauses.
pub struct OpenSearchRetriever {
    client: Client,
    base_url: Url,
    auth: Option<OpenSearchAuth>,
    embedder: Arc<OpenAIEmbedder>,
    closed: AtomicBool,
}

impl OpenSearchRetriever {
    pub fn new(
        base_url: &str,
        auth: Option<OpenSearchAuth>,
        embedder: Arc<OpenAIEmbedder>,
        timeout: Duration,
    ) -> Result<Self> {
        // Url::join replaces the last path segment unless the base ends in '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| RagstudioError::Config(format!("Invalid OpenSearch url '{}': {}", base_url, e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagstudioError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth,
            embedder,
            closed: AtomicBool::new(false),
        })
    }

    fn search_url(&self, index: &str) -> Result<Url> {
        self.base_url
            .join(&format!("{}/_search", index))
            .map_err(|e| RagstudioError::InvalidInput(format!("Invalid index name '{}': {}", index, e)))
    }
}

/// Build the `script_score` request body.
pub(crate) fn build_search_body(query_vector: &[f32], top_k: usize, filters: &SearchFilters) -> Value {
    let must: Vec<Value> = filters
        .iter()
        .map(|(field, value)| json!({ "term": { field: value } }))
        .collect();

    json!({
        "size": top_k,
        "query": {
            "script_score": {
                "query": { "bool": { "must": must } },
                "script": {
                    "source": "cosineSimilarity(params.query_vector, 'embedding') + 1.0",
                    "params": { "query_vector": query_vector }
                }
            }
        }
    })
}

fn parse_search_body(body: SearchBody) -> SearchResponse {
    let chunks = body
        .hits
        .hits
        .into_iter()
        .map(|hit| RetrievedChunk {
            document_id: hit.source.document_id,
            title: hit.source.title,
            text: hit.source.chunk_text,
            chunk_index: hit.source.chunk_index,
            score: hit.score.unwrap_or(0.0),
            metadata: hit.source.metadata,
        })
        .collect();

    SearchResponse {
        chunks,
        took_ms: body.took,
    }
}

#[async_trait]
impl RetrievalBackend for OpenSearchRetriever {
    async fn search(
        &self,
        index: &str,
        query_text: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<SearchResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RagstudioError::Retrieval("OpenSearch client is closed".to_string()));
        }

        let embed_start = std::time::Instant::now();
        let query_vector = self.embedder.embed_with_cache(query_text, 3).await?;
        log::debug!("OpenSearch: query embedding took {:?}", embed_start.elapsed());

        let body = build_search_body(&query_vector, top_k, filters);
        let mut request = self.client.post(self.search_url(index)?).json(&body);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagstudioError::Retrieval(format!("OpenSearch network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RagstudioError::Retrieval(format!(
                "OpenSearch error {} on index '{}': {}",
                status, index, text
            )));
        }

        let parsed: SearchBody = response
            .json()
            .await
            .map_err(|e| RagstudioError::Retrieval(format!("Failed to parse search response: {}", e)))?;

        let result = parse_search_body(parsed);
        log::debug!(
            "OpenSearch: {} hits from '{}' in {}ms",
            result.chunks.len(),
            index,
            result.took_ms
        );
        Ok(result)
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::info!("OpenSearch client for {} closed", self.base_url);
        }
    }
}
