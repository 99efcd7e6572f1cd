use crate::backend::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::embeddings::openai::is_retryable;
use crate::error::{RagstudioError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for the chat completions API
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client
///
/// Retries rate-limit and server errors with exponential backoff; the request
/// timeout bounds every individual call.
pub struct OpenAiCompletion {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_retries: usize,
}

impl OpenAiCompletion {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagstudioError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagstudioError::Completion(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RagstudioError::Completion(format!(
                "Completion API error {}: {}",
                status, text
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RagstudioError::Completion(format!("Failed to parse response: {}", e)))?;

        extract_content(parsed)
    }
}

fn extract_content(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| RagstudioError::Completion("Empty response from completion API".to_string()))
}

#[async_trait]
impl CompletionBackend for OpenAiCompletion {
    async fn generate(&self, request: CompletionRequest) -> Result<String> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.complete_once(&request).await {
                Ok(text) => {
                    log::debug!(
                        "Completion call took {:?} (attempt {}, model {})",
                        start.elapsed(),
                        attempt + 1,
                        self.model
                    );
                    return Ok(text);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e.to_string()) => {
                    log::warn!("Completion retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
