//! In-process scripted backends for unit tests.

use crate::backend::{CompletionBackend, CompletionRequest, RetrievalBackend, SearchResponse};
use crate::error::{RagstudioError, Result};
use crate::types::{RetrievedChunk, SearchFilters};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn chunk(doc: &str, index: u32, score: f32, text: &str) -> RetrievedChunk {
    RetrievedChunk {
        document_id: doc.to_string(),
        title: format!("Title of {}", doc),
        text: text.to_string(),
        chunk_index: index,
        score,
        metadata: Default::default(),
    }
}

/// Returns canned chunks per query text; unknown queries get `default`.
pub(crate) struct StaticRetrieval {
    by_query: HashMap<String, Result<Vec<RetrievedChunk>>>,
    default: Vec<RetrievedChunk>,
    fail_all: bool,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    filters_seen: Mutex<Vec<SearchFilters>>,
    closed: AtomicBool,
}

impl StaticRetrieval {
    pub(crate) fn new(default: Vec<RetrievedChunk>) -> Self {
        Self {
            by_query: HashMap::new(),
            default,
            fail_all: false,
            delay: None,
            calls: Mutex::new(Vec::new()),
            filters_seen: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Every search fails.
    pub(crate) fn unavailable() -> Self {
        Self { fail_all: true, ..Self::empty() }
    }

    /// Every search sleeps this long first.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing_on(mut self, query: &str) -> Self {
        self.by_query.insert(
            query.to_string(),
            Err(RagstudioError::Retrieval(format!("index unavailable for '{}'", query))),
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Filters passed to each search, in call order.
    pub(crate) fn filters_seen(&self) -> Vec<SearchFilters> {
        self.filters_seen.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalBackend for StaticRetrieval {
    async fn search(
        &self,
        _index: &str,
        query_text: &str,
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<SearchResponse> {
        self.calls.lock().unwrap().push(query_text.to_string());
        self.filters_seen.lock().unwrap().push(filters.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all {
            return Err(RagstudioError::Retrieval("connection refused".to_string()));
        }
        match self.by_query.get(query_text) {
            Some(Ok(chunks)) => Ok(SearchResponse {
                chunks: chunks.iter().take(top_k).cloned().collect(),
                took_ms: 1,
            }),
            Some(Err(e)) => Err(RagstudioError::Retrieval(e.to_string())),
            None => Ok(SearchResponse {
                chunks: self.default.iter().take(top_k).cloned().collect(),
                took_ms: 1,
            }),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Completion backend driven by a closure over the prompt text.
pub(crate) struct ScriptedCompletion {
    responder: Responder,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub(crate) fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails.
    pub(crate) fn failing() -> Self {
        Self::new(|_| Err(RagstudioError::Completion("model offline".to_string())))
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    async fn generate(&self, request: CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = request.text();
        self.prompts.lock().unwrap().push(text.clone());
        (self.responder)(&text)
    }
}
