//! HTTP collaborators and the seams the pipeline talks to.
//!
//! The ingestion pipeline and the query loop only see these traits, so the
//! concrete services (OpenAI-compatible embeddings, Chroma, an
//! OpenAI-compatible chat endpoint) can be swapped or faked.

pub mod chroma_client;
pub mod embedder_client;
pub mod llm_client;

use async_trait::async_trait;

use crate::index::record::RecordBatch;
use chroma_client::{CollectionHandle, Distance, QueryResult, StoreError};
use embedder_client::EmbedError;
use llm_client::LlmError;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_texts(&[text.to_string()])
            .await?
            .pop()
            .ok_or(EmbedError::EmptyResponse)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Server heartbeat, in nanoseconds.
    async fn heartbeat(&self) -> Result<u64, StoreError>;

    async fn get_or_create_collection(
        &self,
        name: &str,
        distance: Distance,
    ) -> Result<CollectionHandle, StoreError>;

    async fn add(&self, collection: &CollectionHandle, batch: &RecordBatch)
    -> Result<(), StoreError>;

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Single-turn completion; nothing is remembered between calls.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}
