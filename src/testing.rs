//! In-memory collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::time::Instant;

use crate::client::chroma_client::{
    CollectionHandle, Distance, QueryMatch, QueryResult, StoreError,
};
use crate::client::embedder_client::EmbedError;
use crate::client::llm_client::LlmError;
use crate::client::{Embedder, Generator, VectorStore};
use crate::index::record::{Metadata, RecordBatch};

/// Deterministic embeddings; queued errors are returned first.
#[derive(Default)]
pub struct FakeEmbedder {
    failures: Mutex<VecDeque<EmbedError>>,
    calls: Mutex<Vec<Instant>>,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with<I: IntoIterator<Item = EmbedError>>(self, errors: I) -> Self {
        self.failures.lock().unwrap().extend(errors);
        self
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        vec![text.len() as f32, 1.0]
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn rate_limited() -> EmbedError {
    EmbedError::Status {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: "rate limit exceeded".into(),
    }
}

pub fn unauthorized() -> EmbedError {
    EmbedError::Status {
        status: StatusCode::UNAUTHORIZED,
        body: "bad key".into(),
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.lock().unwrap().push(Instant::now());
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

/// Records every batch added; serves a fixed query result.
#[derive(Default)]
pub struct MemoryStore {
    added: Mutex<Vec<RecordBatch>>,
    add_failures: Mutex<usize>,
    query_failures: Mutex<usize>,
    queries: Mutex<usize>,
    results: Mutex<QueryResult>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` add calls fail with a 500.
    pub fn failing_adds(self, n: usize) -> Self {
        *self.add_failures.lock().unwrap() = n;
        self
    }

    /// The next `n` query calls fail with a 500.
    pub fn failing_queries(self, n: usize) -> Self {
        *self.query_failures.lock().unwrap() = n;
        self
    }

    pub fn answering(self, docs: &[(&str, Option<&str>)]) -> Self {
        let matches = docs
            .iter()
            .enumerate()
            .map(|(i, (doc, path))| QueryMatch {
                id: format!("doc-{i}"),
                document: doc.to_string(),
                metadata: path.map(|p| {
                    let mut m = Metadata::new();
                    m.insert("path".into(), p.into());
                    m
                }),
                distance: Some(i as f32),
            })
            .collect();
        *self.results.lock().unwrap() = QueryResult { matches };
        self
    }

    pub fn added(&self) -> Vec<RecordBatch> {
        self.added.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }

    pub fn handle() -> CollectionHandle {
        CollectionHandle {
            id: "mem-1".into(),
            name: "knowledge-base".into(),
        }
    }
}

fn server_error() -> StoreError {
    StoreError::Status {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "boom".into(),
    }
}

fn take_failure(counter: &Mutex<usize>) -> bool {
    let mut left = counter.lock().unwrap();
    if *left > 0 {
        *left -= 1;
        true
    } else {
        false
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn heartbeat(&self) -> Result<u64, StoreError> {
        Ok(1)
    }

    async fn get_or_create_collection(
        &self,
        name: &str,
        _distance: Distance,
    ) -> Result<CollectionHandle, StoreError> {
        Ok(CollectionHandle {
            id: "mem-1".into(),
            name: name.into(),
        })
    }

    async fn add(&self, _: &CollectionHandle, batch: &RecordBatch) -> Result<(), StoreError> {
        if take_failure(&self.add_failures) {
            return Err(server_error());
        }
        self.added.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn query(
        &self,
        _: &CollectionHandle,
        _embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError> {
        *self.queries.lock().unwrap() += 1;
        if take_failure(&self.query_failures) {
            return Err(server_error());
        }
        let mut result = self.results.lock().unwrap().clone();
        result.matches.truncate(top_k);
        Ok(result)
    }
}

/// Echo-style generator that remembers its prompts.
#[derive(Default)]
pub struct FakeGenerator {
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(LlmError::EmptyResponse);
        }
        Ok(format!("answer #{}", self.prompts.lock().unwrap().len()))
    }
}
