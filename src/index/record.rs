//! record.rs
//!
//! Record construction for the vector store.
//! - A `RecordRequest` names one document (id, text, metadata).
//! - `RecordSet::build_and_validate` embeds every pending request and checks
//!   the result, producing `IngestedRecord`s.
//! - `RecordBatch` is the column layout the store's `add` expects; it is only
//!   ever built from whole records so the columns stay aligned.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::client::Embedder;
use crate::client::embedder_client::EmbedError;

pub type Metadata = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("record has an empty id")]
    EmptyId,

    #[error("record '{0}' has an empty document")]
    EmptyDocument(String),

    #[error("record '{0}' received an empty embedding")]
    EmptyEmbedding(String),
}

impl RecordError {
    pub fn is_transient(&self) -> bool {
        match self {
            RecordError::Embed(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordRequest {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

impl RecordRequest {
    /// One file as one record: id is the base name, the full path goes
    /// into metadata along with a content hash and the indexing time.
    pub fn for_file(path: &Path, content: String) -> Self {
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let mut metadata = Metadata::new();
        metadata.insert("path".into(), Value::from(path.to_string_lossy()));
        metadata.insert("content_hash".into(), Value::from(content_hash(&content)));
        metadata.insert(
            "indexed_at".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        Self {
            id,
            document: content,
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestedRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Pending records waiting for embeddings.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pending: Vec<RecordRequest>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, request: RecordRequest) -> Self {
        self.pending.push(request);
        self
    }

    /// Embed all pending documents in one call and validate the outcome.
    /// Can be called again after a failure; the set is left untouched.
    pub async fn build_and_validate<E>(&self, embedder: &E) -> Result<Vec<IngestedRecord>, RecordError>
    where
        E: Embedder + ?Sized,
    {
        for req in &self.pending {
            if req.id.trim().is_empty() {
                return Err(RecordError::EmptyId);
            }
            if req.document.is_empty() {
                return Err(RecordError::EmptyDocument(req.id.clone()));
            }
        }

        let texts: Vec<String> = self.pending.iter().map(|r| r.document.clone()).collect();
        let embeddings = embedder.embed_texts(&texts).await?;
        if embeddings.len() != self.pending.len() {
            return Err(EmbedError::CountMismatch {
                sent: self.pending.len(),
                got: embeddings.len(),
            }
            .into());
        }

        self.pending
            .iter()
            .zip(embeddings)
            .map(|(req, embedding)| {
                if embedding.is_empty() {
                    return Err(RecordError::EmptyEmbedding(req.id.clone()));
                }
                Ok(IngestedRecord {
                    id: req.id.clone(),
                    document: req.document.clone(),
                    metadata: req.metadata.clone(),
                    embedding,
                })
            })
            .collect()
    }
}

/// Column-oriented view of records for the store's `add` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub embeddings: Vec<Vec<f32>>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<IngestedRecord>> for RecordBatch {
    fn from(records: Vec<IngestedRecord>) -> Self {
        let mut batch = RecordBatch {
            ids: Vec::with_capacity(records.len()),
            documents: Vec::with_capacity(records.len()),
            metadatas: Vec::with_capacity(records.len()),
            embeddings: Vec::with_capacity(records.len()),
        };
        for r in records {
            batch.ids.push(r.id);
            batch.documents.push(r.document);
            batch.metadatas.push(r.metadata);
            batch.embeddings.push(r.embedding);
        }
        batch
    }
}

/// SHA-256 hex of a document's text.
pub fn content_hash(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hex::encode(hasher.finalize())
}
