//! config.rs
//!
//! YAML configuration, read once at startup from a config directory:
//! - `db.yml`        vector store connection (required)
//! - `langchain.yml` chat model endpoint and credentials (required)
//! - `assistant.yml` knowledge base and embedding settings (optional)
//!
//! API keys may be left empty in the files and supplied through the
//! environment instead (`LLM_API_KEY`, `EMBEDDING_API_KEY`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::client::chroma_client::Distance;
use crate::client::embedder_client::{DEFAULT_EMBED_BASE_URL, DEFAULT_TIMEOUT_SECS};

pub const DB_FILE: &str = "db.yml";
pub const LANGCHAIN_FILE: &str = "langchain.yml";
pub const ASSISTANT_FILE: &str = "assistant.yml";

pub const LLM_API_KEY_ENV: &str = "LLM_API_KEY";
pub const EMBEDDING_API_KEY_ENV: &str = "EMBEDDING_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub dbname: String,
}

impl DatabaseConfig {
    /// `http://host:port`, unless the host already carries a scheme.
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LangChainConfig {
    #[serde(rename = "apiKey", alias = "apikey", alias = "api_key", default)]
    pub api_key: String,
    #[serde(rename = "baseURL", alias = "baseurl", alias = "base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(rename = "maxTokens", alias = "max_tokens", default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnowledgeBaseSettings {
    pub path: PathBuf,
    pub max_files: usize,
    pub pacing_secs: u64,
    pub collection: String,
    pub distance: Distance,
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("knowledge-base"),
            max_files: 5,
            pacing_secs: 5,
            collection: "knowledge-base".to_string(),
            distance: Distance::L2,
        }
    }
}

impl KnowledgeBaseSettings {
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimension: Option<usize>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EMBED_BASE_URL.to_string(),
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            api_key: None,
            dimension: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub knowledge_base: KnowledgeBaseSettings,
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub langchain: LangChainConfig,
    pub assistant: AssistantConfig,
}

impl AppConfig {
    /// Load every file from `dir`. `assistant.yml` falls back to defaults
    /// when absent; the other two are required.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let database = read_yaml(&dir.join(DB_FILE))?;
        let langchain = read_yaml(&dir.join(LANGCHAIN_FILE))?;

        let assistant_path = dir.join(ASSISTANT_FILE);
        let assistant = if assistant_path.exists() {
            read_yaml(&assistant_path)?
        } else {
            AssistantConfig::default()
        };

        Ok(Self {
            database,
            langchain,
            assistant,
        })
    }

    /// Non-empty values found by `lookup` replace the configured API keys.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(LLM_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.langchain.api_key = key;
        }
        if let Some(key) = lookup(EMBEDDING_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.assistant.embedding.api_key = Some(key);
        }
        self
    }
}

pub fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_llm_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}
