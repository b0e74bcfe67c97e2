use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::client::chroma_client::{ChromaClient, CollectionHandle};
use crate::client::embedder_client::EmbedderClient;
use crate::client::llm_client::LlmClient;
use crate::client::{Embedder, Generator, VectorStore};
use crate::config::AppConfig;
use crate::indexing::{IngestOptions, Ingestor, RunCounters};
use crate::inference::QueryLoop;
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "kb-assistant",
    version,
    about = "Answer questions from a directory of text and markdown notes"
)]
pub struct Cli {
    /// Directory holding db.yml, langchain.yml and (optionally) assistant.yml
    #[arg(long, env = "KB_CONFIG_DIR", default_value = "config", global = true)]
    config_dir: PathBuf,

    /// Knowledge base root, overrides assistant.yml
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Stop ingesting after this many files, overrides assistant.yml
    #[arg(long, global = true)]
    max_files: Option<usize>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Ingest the knowledge base, then answer questions (default)
    Run,
    /// Ingest only
    Ingest,
    /// Answer questions against what is already in the collection
    Query,
    /// Check that the vector store is reachable
    Ping,
    /// Embed a piece of text and print the vector's dimension
    Embed { text: String },
    /// Send one prompt straight to the LLM
    Ask { prompt: String },
}

/// Clients shared by the ingestion and query stages, built once.
struct Session {
    config: AppConfig,
    embedder: EmbedderClient,
    store: ChromaClient,
    collection: CollectionHandle,
}

impl Session {
    async fn connect(config: AppConfig) -> Result<Self> {
        let embedder = embedder(&config)?;
        let store = store(&config)?;

        let kb = &config.assistant.knowledge_base;
        let collection = store
            .get_or_create_collection(&kb.collection, kb.distance)
            .await
            .with_context(|| format!("failed to get/create collection '{}'", kb.collection))?;
        info!(
            "Using collection '{}' ({}) at {}",
            collection.name,
            collection.id,
            store.base_url()
        );

        Ok(Self {
            config,
            embedder,
            store,
            collection,
        })
    }

    async fn ingest(&self) -> Result<RunCounters> {
        let options = IngestOptions::from_settings(&self.config.assistant.knowledge_base);
        info!(
            "Ingesting up to {} files from {}",
            options.max_files,
            options.root.display()
        );

        let progress = spinner()?;
        let _route = logging::route_through(&progress);
        Ingestor::new(&self.embedder, &self.store, &self.collection, options)
            .with_progress(progress)
            .run()
            .await
            .context("error processing files")
    }

    async fn query_loop(&self) -> Result<()> {
        let llm = generator(&self.config)?;
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        QueryLoop::new(&self.embedder, &self.store, &self.collection, &llm)
            .run(stdin.lock(), &mut stdout)
            .await
            .context("terminal I/O failed")
    }
}

pub async fn terminal(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(&cli.config_dir)
        .with_context(|| format!("error loading config from {}", cli.config_dir.display()))?
        .with_env_overrides(|name| env::var(name).ok());

    if let Some(root) = cli.root {
        config.assistant.knowledge_base.path = root;
    }
    if let Some(max) = cli.max_files {
        config.assistant.knowledge_base.max_files = max;
    }

    match cli.mode.unwrap_or(Mode::Run) {
        Mode::Run => {
            let session = Session::connect(config).await?;
            session.ingest().await?;
            session.query_loop().await?;
        }
        Mode::Ingest => {
            let session = Session::connect(config).await?;
            let counters = session.ingest().await?;
            println!(
                "Processed: {}\nSkipped: {}\nFailed: {}",
                counters.processed, counters.skipped, counters.failed
            );
        }
        Mode::Query => {
            Session::connect(config).await?.query_loop().await?;
        }
        Mode::Ping => {
            let store = store(&config)?;
            let beat = store
                .heartbeat()
                .await
                .with_context(|| format!("vector store at {} is unreachable", store.base_url()))?;
            println!("Connected to {} (heartbeat {beat})", store.base_url());
        }
        Mode::Embed { text } => {
            let embedder = embedder(&config)?;
            let vector = embedder
                .embed_text(&text)
                .await
                .context("error generating embedding")?;
            let preview: Vec<f32> = vector.iter().take(5).copied().collect();
            println!(
                "Model {} returned {} dimensions: {preview:?}...",
                embedder.model(),
                vector.len()
            );
        }
        Mode::Ask { prompt } => {
            let llm = generator(&config)?;
            let response = llm
                .generate(&prompt)
                .await
                .context("error generating response")?;
            println!("{response}");
        }
    }

    Ok(())
}

fn embedder(config: &AppConfig) -> Result<EmbedderClient> {
    EmbedderClient::from_settings(&config.assistant.embedding)
        .context("failed to create embedding client")
}

fn store(config: &AppConfig) -> Result<ChromaClient> {
    ChromaClient::from_config(&config.database).context("failed to create vector store client")
}

fn generator(config: &AppConfig) -> Result<LlmClient> {
    LlmClient::from_config(&config.langchain).context("failed to initialize LLM client")
}

fn spinner() -> Result<ProgressBar> {
    if !io::stderr().is_terminal() {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix} {spinner} {wide_msg}")?);
    pb.set_prefix("[ingest]");
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
