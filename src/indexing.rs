// src/indexing.rs
//! Knowledge-base ingestion:
//! - walk the root directory (every entry, name order)
//! - select .txt / .md files
//! - read → build record (embed + validate, rate-limit aware retry)
//! - add → collection (retried)
//! - pace between files
//!
//! Files are handled strictly one after another and the run stops once
//! `max_files` have been processed. Per-file failures are counted, never
//! propagated.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::client::chroma_client::CollectionHandle;
use crate::client::{Embedder, VectorStore};
use crate::config::KnowledgeBaseSettings;
use crate::index::record::{RecordBatch, RecordError, RecordRequest, RecordSet};
use crate::ingest::file_selector::should_process;
use crate::ingest::scanner::{self, ScanError};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub root: PathBuf,
    pub max_files: usize,
    /// Pause after every successfully ingested file.
    pub pacing: Duration,
    pub record_policy: RetryPolicy,
    pub add_policy: RetryPolicy,
}

impl IngestOptions {
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            root: root.into(),
            max_files,
            pacing: Duration::from_secs(5),
            record_policy: RetryPolicy::record_build(),
            add_policy: RetryPolicy::collection_call(),
        }
    }

    pub fn from_settings(kb: &KnowledgeBaseSettings) -> Self {
        Self {
            pacing: kb.pacing(),
            ..Self::new(&kb.path, kb.max_files)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunCounters {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Processed => self.processed += 1,
            FileOutcome::Skipped => self.skipped += 1,
            FileOutcome::Failed => self.failed += 1,
        }
    }

    /// Non-directory entries accounted for.
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOutcome {
    Processed,
    Skipped,
    Failed,
}

pub struct Ingestor<'a, E: ?Sized, S: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    collection: &'a CollectionHandle,
    options: IngestOptions,
    progress: ProgressBar,
}

impl<'a, E, S> Ingestor<'a, E, S>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(
        embedder: &'a E,
        store: &'a S,
        collection: &'a CollectionHandle,
        options: IngestOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Walk the root and ingest until the tree is exhausted or `max_files`
    /// files have been processed. Only a missing root is an error.
    pub async fn run(&self) -> Result<RunCounters, ScanError> {
        let max = self.options.max_files;
        let mut counters = RunCounters::default();

        for candidate in scanner::walk(&self.options.root)? {
            if counters.processed >= max {
                info!("[ingest] reached the limit of {max} files");
                break;
            }

            if !should_process(&candidate) {
                if !candidate.is_dir {
                    counters.skipped += 1;
                }
                continue;
            }

            info!(
                "[ingest] processing file {}/{}: {}",
                counters.processed + 1,
                max,
                candidate.path.display()
            );
            self.progress.set_message(format!(
                "{}/{} {}",
                counters.processed + 1,
                max,
                candidate.path.display()
            ));

            let outcome = self.ingest_file(&candidate.path).await;
            counters.record(outcome);

            if outcome == FileOutcome::Processed && counters.processed < max {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        self.progress.finish_and_clear();
        info!(
            "[ingest] complete after {} files: processed {}, skipped {}, failed {}",
            counters.total(),
            counters.processed,
            counters.skipped,
            counters.failed
        );
        Ok(counters)
    }

    async fn ingest_file(&self, path: &Path) -> FileOutcome {
        // Notes in legacy encodings are kept; invalid bytes become U+FFFD.
        let content = match fs::read(path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!("[ingest] error reading file {}: {e}", path.display());
                return FileOutcome::Failed;
            }
        };
        if content.is_empty() {
            info!("[ingest] skipping empty file: {}", path.display());
            return FileOutcome::Skipped;
        }

        let set = RecordSet::new().with_record(RecordRequest::for_file(path, content));
        let label = format!("building records for {}", path.display());
        let records = match self
            .options
            .record_policy
            .run_if(
                &label,
                || set.build_and_validate(self.embedder),
                |e: &RecordError| e.is_transient(),
            )
            .await
        {
            Ok(records) if !records.is_empty() => records,
            Ok(_) => {
                warn!("[ingest] no records built for {}", path.display());
                return FileOutcome::Failed;
            }
            Err(e) => {
                warn!("[ingest] error building records for {}: {e}", path.display());
                return FileOutcome::Failed;
            }
        };

        let batch = RecordBatch::from(records);
        let label = format!("adding {} to collection", path.display());
        let (store, collection, batch_ref) = (self.store, self.collection, &batch);
        if let Err(e) = self
            .options
            .add_policy
            .run(&label, || store.add(collection, batch_ref))
            .await
        {
            warn!(
                "[ingest] error adding document {} to collection '{}': {e}",
                path.display(),
                collection.name
            );
            return FileOutcome::Failed;
        }

        info!(
            "[ingest] successfully processed file: {} ({} record)",
            path.display(),
            batch.len()
        );
        FileOutcome::Processed
    }
}
