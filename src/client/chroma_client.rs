//! chroma_client.rs
//!
//! Minimal client for the Chroma REST API (v1):
//! - heartbeat(): connectivity check
//! - get_or_create_collection(): create if missing, else return the existing one
//! - add(): insert aligned ids / documents / metadatas / embeddings
//! - query(): nearest neighbours for one embedding
//!
//! Embeddings are always computed client-side and sent explicitly; the server
//! never embeds on our behalf.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::VectorStore;
use crate::config::DatabaseConfig;
use crate::index::record::{Metadata, RecordBatch};

pub const DEFAULT_TENANT: &str = "default_tenant";
pub const DEFAULT_DATABASE: &str = "default_database";

/// Distance function of a collection's HNSW index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    #[default]
    L2,
    Cosine,
    Ip,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::L2 => "l2",
            Distance::Cosine => "cosine",
            Distance::Ip => "ip",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("collection '{name}' uses distance '{found}', expected '{expected}'")]
    IncompatibleCollection {
        name: String,
        found: String,
        expected: &'static str,
    },
}

/// Server-side identity of a collection, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub id: String,
    pub name: String,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub id: String,
    pub document: String,
    pub metadata: Option<Metadata>,
    pub distance: Option<f32>,
}

impl QueryMatch {
    /// The `path` metadata entry, when present and a string.
    pub fn source_path(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("path")?.as_str()
    }
}

/// Hits for a single query, closest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub matches: Vec<QueryMatch>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Clone)]
pub struct ChromaClient {
    http: reqwest::Client,
    base_url: String,
    tenant: String,
    database: String,
    credentials: Option<(String, String)>,
}

impl ChromaClient {
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
        })
    }

    /// Base URL from host/port, `dbname` as the Chroma database, and basic
    /// auth when a user is configured.
    pub fn from_config(db: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut client = Self::new(db.base_url())?;
        if !db.dbname.is_empty() {
            client.database = db.dbname.clone();
        }
        if !db.user.is_empty() {
            client.credentials = Some((db.user.clone(), db.password.clone()));
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.api_url(path));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }
        Ok(resp)
    }
}

#[async_trait]
impl VectorStore for ChromaClient {
    async fn heartbeat(&self) -> Result<u64, StoreError> {
        let resp = self.send(self.request(Method::GET, "heartbeat")).await?;
        let body: HeartbeatResponse = resp.json().await?;
        Ok(body.nanosecond_heartbeat)
    }

    /// Create the collection if missing; an existing one must use the same
    /// distance function.
    async fn get_or_create_collection(
        &self,
        name: &str,
        distance: Distance,
    ) -> Result<CollectionHandle, StoreError> {
        let mut metadata = Map::new();
        metadata.insert("hnsw:space".into(), Value::from(distance.as_str()));
        let body = CreateCollectionRequest {
            name,
            metadata,
            get_or_create: true,
        };

        let builder = self
            .request(Method::POST, "collections")
            .query(&[("tenant", &self.tenant), ("database", &self.database)])
            .json(&body);
        let resp = self.send(builder).await?;
        let info: CollectionResponse = resp.json().await?;
        info.into_handle(distance)
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        batch: &RecordBatch,
    ) -> Result<(), StoreError> {
        let body = AddRequest {
            ids: &batch.ids,
            embeddings: &batch.embeddings,
            metadatas: &batch.metadatas,
            documents: &batch.documents,
        };
        let path = format!("collections/{}/add", collection.id);
        self.send(self.request(Method::POST, &path).json(&body))
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult, StoreError> {
        let body = QueryRequest {
            query_embeddings: [embedding],
            n_results: top_k,
            include: ["documents", "metadatas", "distances"],
        };
        let path = format!("collections/{}/query", collection.id);
        let resp = self
            .send(self.request(Method::POST, &path).json(&body))
            .await?;
        let parsed: QueryResponse = resp.json().await?;
        Ok(parsed.into_result())
    }
}

/// ---
/// Minimal request/response models (subset of the Chroma v1 API)
/// ---

#[derive(Debug, Deserialize)]
struct HeartbeatResponse {
    #[serde(rename = "nanosecond heartbeat")]
    nanosecond_heartbeat: u64,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest<'a> {
    name: &'a str,
    metadata: Map<String, Value>,
    get_or_create: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
    name: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl CollectionResponse {
    fn into_handle(self, expected: Distance) -> Result<CollectionHandle, StoreError> {
        // Chroma defaults to l2 when the space was never set.
        let found = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("hnsw:space"))
            .and_then(Value::as_str)
            .unwrap_or(Distance::L2.as_str());
        if found != expected.as_str() {
            return Err(StoreError::IncompatibleCollection {
                name: self.name,
                found: found.to_string(),
                expected: expected.as_str(),
            });
        }
        Ok(CollectionHandle {
            id: self.id,
            name: self.name,
        })
    }
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    ids: &'a [String],
    embeddings: &'a [Vec<f32>],
    metadatas: &'a [Metadata],
    documents: &'a [String],
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query_embeddings: [&'a [f32]; 1],
    n_results: usize,
    include: [&'static str; 3],
}

/// Every field is one row per query embedding; we always send one.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl QueryResponse {
    fn into_result(self) -> QueryResult {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let documents = first_row(self.documents);
        let mut metadatas = first_row(self.metadatas).into_iter();
        let mut distances = first_row(self.distances).into_iter();

        let matches = ids
            .into_iter()
            .zip(documents)
            .filter_map(|(id, document)| {
                let metadata = metadatas.next().flatten();
                let distance = distances.next().flatten();
                document.map(|document| QueryMatch {
                    id,
                    document,
                    metadata,
                    distance,
                })
            })
            .collect();

        QueryResult { matches }
    }
}

fn first_row<T>(rows: Option<Vec<Vec<Option<T>>>>) -> Vec<Option<T>> {
    rows.and_then(|r| r.into_iter().next()).unwrap_or_default()
}
