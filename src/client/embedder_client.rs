//! embedder_client.rs
//!
//! Client for an OpenAI-compatible embeddings endpoint (LM Studio, Ollama's
//! OpenAI shim, hosted providers). Provides single and batch embedding.
//!
//! Assumptions:
//! - One embedding per document (no chunking).
//! - Calls are made one at a time; the caller owns retry policy.
//!
//! Example:
//! ```ignore
//! let client = EmbedderClient::new("http://localhost:1234/v1", "text-embedding-3-small", None)?;
//! let vec = client.embed_text("hello world").await?;
//! println!("dim = {}", vec.len());
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::Embedder;
use crate::config::EmbeddingSettings;

/// Default base URL for LM Studio (OpenAI-compatible) embeddings API.
pub const DEFAULT_EMBED_BASE_URL: &str = "http://localhost:1234/v1";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// High-level client for embedding text via an OpenAI-compatible server.
pub struct EmbedderClient {
    http: reqwest::Client,
    /// Base URL to the API (e.g., http://localhost:1234/v1).
    base_url: String,
    /// Embedding model name (e.g., "text-embedding-3-small").
    model: String,
    /// Bearer token, if the server wants one.
    api_key: Option<String>,
    /// Optional expected vector dimension; if set, responses are validated.
    expected_dim: Option<usize>,
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("empty embedding response")]
    EmptyResponse,

    #[error("embedding count mismatch: sent {sent}, got {got}")]
    CountMismatch { sent: usize, got: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },
}

impl EmbedError {
    /// Rate limiting, an unavailable service, or a dropped connection.
    /// Worth waiting and asking again; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::SERVICE_UNAVAILABLE
            }
            EmbedError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl EmbedderClient {
    /// Create a new client.
    ///
    /// - `expected_dim`: if Some(d), returned vectors must have length `d`.
    pub fn new<U, M>(base_url: U, model: M, expected_dim: Option<usize>) -> Result<Self, EmbedError>
    where
        U: Into<String>,
        M: Into<String>,
    {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            expected_dim,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbedError> {
        let client = Self::new(&settings.base_url, &settings.model, settings.dimension)?
            .with_timeout_secs(settings.timeout_secs)?;
        Ok(match settings.api_key.as_deref() {
            Some(key) if !key.is_empty() => client.with_api_key(key),
            _ => client,
        })
    }

    /// Override the timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Result<Self, EmbedError> {
        self.http = reqwest::Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()?;
        Ok(self)
    }

    pub fn with_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the embeddings URL (POST).
    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    /// Low-level call that performs the HTTP request and returns raw data entries.
    async fn embed_texts_raw(&self, texts: &[String]) -> Result<Vec<EmbeddingDatum>, EmbedError> {
        let req = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.http.post(self.embeddings_url()).json(&req);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EmbedError::Status { status, body });
        }

        let parsed: EmbeddingsResponse = resp.json().await?;
        if parsed.data.is_empty() {
            return Err(EmbedError::EmptyResponse);
        }
        Ok(parsed.data)
    }
}

#[async_trait]
impl Embedder for EmbedderClient {
    /// Embed multiple texts in a single request.
    ///
    /// Returns embeddings in the same order as the inputs.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let data = self.embed_texts_raw(texts).await?;
        order_embeddings(data, texts.len(), self.expected_dim)
    }
}

/// Sort by index to preserve input order (some servers already do this) and
/// validate count and dimension.
fn order_embeddings(
    data: Vec<EmbeddingDatum>,
    sent: usize,
    expected_dim: Option<usize>,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if data.len() != sent {
        return Err(EmbedError::CountMismatch {
            sent,
            got: data.len(),
        });
    }

    let mut pairs: Vec<(usize, Vec<f32>)> = data
        .into_iter()
        .enumerate()
        .map(|(pos, d)| (d.index.unwrap_or(pos), d.embedding))
        .collect();
    pairs.sort_by_key(|(i, _)| *i);

    let mut result = Vec::with_capacity(sent);
    for (_, emb) in pairs {
        if let Some(expected) = expected_dim {
            if emb.len() != expected {
                return Err(EmbedError::DimMismatch {
                    expected,
                    got: emb.len(),
                });
            }
        }
        result.push(emb);
    }
    Ok(result)
}

/// Request payload compatible with OpenAI-style embeddings API.
#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response payload (subset) for embeddings.
#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatusCode::TOO_MANY_REQUESTS, true)]
    #[case(StatusCode::SERVICE_UNAVAILABLE, true)]
    #[case(StatusCode::BAD_REQUEST, false)]
    #[case(StatusCode::UNAUTHORIZED, false)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn status_transience(#[case] status: StatusCode, #[case] transient: bool) {
        let err = EmbedError::Status {
            status,
            body: String::new(),
        };
        assert_eq!(err.is_transient(), transient);
    }

    #[test]
    fn response_is_reordered_by_index() {
        let body = r#"{"data":[
            {"index":1,"embedding":[2.0,2.0]},
            {"index":0,"embedding":[1.0,1.0]}
        ]}"#;
        let parsed: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        let out = order_embeddings(parsed.data, 2, Some(2)).unwrap();
        assert_eq!(out, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn wrong_dimension_is_rejected() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0,2.0,3.0]}]}"#;
        let parsed: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        let err = order_embeddings(parsed.data, 1, Some(384)).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimMismatch {
                expected: 384,
                got: 3
            }
        ));
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let body = r#"{"data":[{"embedding":[1.0]}]}"#;
        let parsed: EmbeddingsResponse = serde_json::from_str(body).unwrap();
        let err = order_embeddings(parsed.data, 2, None).unwrap_err();
        assert!(matches!(err, EmbedError::CountMismatch { sent: 2, got: 1 }));
    }
}
