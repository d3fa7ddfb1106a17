//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::channel::Publisher;
use crate::error::Error;
use crate::message::{Message, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
use crate::search::{SearchAdapter, SearchResult};
use crate::stage::StageMessage;
use crate::storage::ReportStore;

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<CompletionResponse, Error>>>,
    /// Captured requests (for assertion).
    pub captured_requests: Mutex<Vec<CompletionRequest>>,
    pub name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
        }
    }

    /// Queue a response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        let response = CompletionResponse {
            message: Message::assistant(content),
            usage: Usage::new(0, 0),
            model: "mock-model".to_string(),
            finish_reason: FinishReason::Stop,
        };
        self.responses.lock().unwrap().insert(0, Ok(response));
    }

    /// Queue an error for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured request.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.captured_requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.captured_requests.lock().unwrap().push(request);
        match self.responses.lock().unwrap().pop() {
            Some(response) => response,
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A search adapter that serves canned pages.
pub struct MockSearch {
    results: Mutex<Vec<Result<Vec<SearchResult>, Error>>>,
    /// Captured `(query, limit)` pairs.
    pub captured_queries: Mutex<Vec<(String, usize)>>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
            captured_queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue the pages returned by the next search (FIFO).
    pub fn queue_pages(&self, pages: Vec<SearchResult>) {
        self.results.lock().unwrap().insert(0, Ok(pages));
    }

    /// Queue a failure of the next search (FIFO).
    pub fn queue_error(&self, error: Error) {
        self.results.lock().unwrap().insert(0, Err(error));
    }

    pub fn query_count(&self) -> usize {
        self.captured_queries.lock().unwrap().len()
    }
}

impl Default for MockSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchAdapter for MockSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, Error> {
        self.captured_queries
            .lock()
            .unwrap()
            .push((query.to_string(), limit));
        self.results
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(Error::Unknown("No mock search result queued".to_string())))
    }
}

/// Build a page with a single paragraph of `text`.
pub fn page(url: &str, title: &str, text: &str) -> SearchResult {
    SearchResult {
        url: url.to_string(),
        title: title.to_string(),
        html: format!("<html><body><article><p>{}</p></article></body></html>", text),
    }
}

/// Report store that keeps everything in memory.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<HashMap<String, String>>,
    writes: Mutex<usize>,
    fail_writes: Mutex<bool>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.reports.lock().unwrap().get(key).cloned()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    /// Make every following write fail.
    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn write(&self, key: &str, body: &str) -> Result<String, Error> {
        if *self.fail_writes.lock().unwrap() {
            return Err(Error::storage("store is read-only"));
        }
        *self.writes.lock().unwrap() += 1;
        self.reports
            .lock()
            .unwrap()
            .insert(key.to_string(), body.to_string());
        Ok(format!("memory://{}", key))
    }
}

/// Publisher that records what it was asked to publish.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<StageMessage>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<StageMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: StageMessage) -> Result<(), Error> {
        self.published.lock().unwrap().push(message);
        Ok(())
    }
}
