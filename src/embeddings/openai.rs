use crate::cache::EmbeddingCache;
use crate::error::{RagstudioError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default OpenAI API root
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Request structure for the embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

/// Response structure from the embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Query embedder backed by the OpenAI embeddings API
///
/// Used by the OpenSearch retriever to turn query text into the vector it scores
/// chunks against. Repeated queries (benchmarks replay the same test set against
/// several pipelines) are served from an optional LRU cache.
pub struct OpenAIEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    cache: Option<Arc<EmbeddingCache>>,
}

impl OpenAIEmbedder {
    /// Create a new embedder
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `base_url` - API root, e.g. [`DEFAULT_OPENAI_BASE_URL`]
    /// * `cache` - Optional embedding cache for query embeddings
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagstudioError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            cache,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Make a single API request for one text
    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagstudioError::Retrieval(format!("Embedding network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(RagstudioError::Retrieval(format!(
                "Embedding API error {}: {}",
                status, body
            )));
        }

        let result: EmbeddingResponse = response.json().await.map_err(|e| {
            RagstudioError::Retrieval(format!("Failed to parse embedding response: {}", e))
        })?;

        result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagstudioError::Retrieval("Empty response from embeddings API".to_string()))
    }

    /// Embed a single text with caching and retry logic
    ///
    /// Checks cache first, then calls API if cache miss.
    pub async fn embed_with_cache(&self, text: &str, max_retries: usize) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Embedding cache hit for query: {}", text);
                return Ok(cached);
            }
        }

        let embedding = self.embed_with_retry(text, max_retries).await?;

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    /// Embed a single text with retry logic (no caching)
    pub async fn embed_with_retry(&self, text: &str, max_retries: usize) -> Result<Vec<f32>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.embed_once(text).await {
                Ok(embedding) => {
                    log::debug!(
                        "Embedding API call took {:?} (attempt {})",
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embedding);
                }
                Err(e) if attempt < max_retries && is_retryable(&e.to_string()) => {
                    log::warn!("Embedding retry {}/{} after error: {}", attempt + 1, max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Rate limits and server errors are worth retrying; everything else is not.
pub(crate) fn is_retryable(message: &str) -> bool {
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| message.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedder_new_trims_base_url() {
        let embedder = OpenAIEmbedder::new(
            "test-key".to_string(),
            "text-embedding-3-small".to_string(),
            "http://localhost:8080/v1/".to_string(),
            None,
        )
        .unwrap();

        assert_eq!(embedder.model(), "text-embedding-3-small");
        assert_eq!(embedder.base_url, "http://localhost:8080/v1");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = Arc::new(EmbeddingCache::new(4));
        cache.put("cached query".to_string(), vec![0.1, 0.2]);

        // Unroutable base URL: any network call would fail
        let embedder = OpenAIEmbedder::new(
            "test-key".to_string(),
            "m".to_string(),
            "http://127.0.0.1:9".to_string(),
            Some(cache),
        )
        .unwrap();

        let embedding = embedder.embed_with_cache("cached query", 0).await.unwrap();
        assert_eq!(embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable("Embedding API error 429 Too Many Requests: slow down"));
        assert!(is_retryable("Completion API error 503 Service Unavailable"));
        assert!(!is_retryable("Embedding API error 401 Unauthorized"));
    }
}
