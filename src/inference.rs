//! inference.rs
//!
//! Interactive question answering over the ingested collection.
//!
//! For every question:
//!   1. embed it and fetch the top-k neighbours from the collection (retried)
//!   2. format them as numbered context with their source file names
//!   3. wrap context + question in the grounded prompt
//!   4. ask the LLM once and print the answer
//!
//! A failing question is logged and the loop waits for the next one.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tracing::{debug, error};

use crate::client::chroma_client::{CollectionHandle, QueryResult, StoreError};
use crate::client::embedder_client::EmbedError;
use crate::client::llm_client::LlmError;
use crate::client::{Embedder, Generator, VectorStore};
use crate::retry::{RetryError, RetryPolicy};
use crate::transform::prompt::{build_context, structured_prompt};

pub const DEFAULT_TOP_K: usize = 3;
pub const EXIT_COMMAND: &str = "quit";
pub const NO_DOCUMENTS: &str = "No relevant documents found for your question.";

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding the question: {0}")]
    Embed(#[from] EmbedError),

    #[error("querying the collection: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("error querying collection: {0}")]
    Retrieval(#[from] RetryError<RetrievalError>),

    #[error("error generating response: {0}")]
    Generation(#[from] LlmError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    NoDocuments,
    Response(String),
}

pub struct QueryLoop<'a, E: ?Sized, S: ?Sized, G: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    collection: &'a CollectionHandle,
    generator: &'a G,
    policy: RetryPolicy,
    top_k: usize,
}

impl<'a, E, S, G> QueryLoop<'a, E, S, G>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
    G: Generator + ?Sized,
{
    pub fn new(
        embedder: &'a E,
        store: &'a S,
        collection: &'a CollectionHandle,
        generator: &'a G,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            generator,
            policy: RetryPolicy::collection_call(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Read questions from `input` until EOF or `quit`, writing answers to
    /// `out`. Only I/O on `out` (or a failed read) ends the loop early.
    pub async fn run<R: BufRead, W: Write>(&self, input: R, out: &mut W) -> io::Result<()> {
        writeln!(out, "\nEnter your question (or '{EXIT_COMMAND}' to exit):")?;
        let mut lines = input.lines();

        loop {
            write!(out, "> ")?;
            out.flush()?;

            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    error!("Error reading input: {e}");
                    break;
                }
                None => break,
            };

            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case(EXIT_COMMAND) {
                break;
            }

            match self.answer(question).await {
                Ok(Answer::NoDocuments) => writeln!(out, "\n{NO_DOCUMENTS}")?,
                Ok(Answer::Response(text)) => write!(out, "\nResponse: {text}\n\n")?,
                Err(e) => error!("{e}"),
            }
        }
        Ok(())
    }

    /// Retrieve, build the grounded prompt, and generate. No LLM call is made
    /// when nothing was retrieved.
    pub async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let result = self.retrieve(question).await?;
        if result.is_empty() {
            return Ok(Answer::NoDocuments);
        }

        for m in &result.matches {
            debug!("retrieved '{}' (distance {:?})", m.id, m.distance);
        }
        let context = build_context(&result.matches);
        let prompt = structured_prompt(&context, question);
        let response = self.generator.generate(&prompt).await?;
        Ok(Answer::Response(response))
    }

    async fn retrieve(&self, question: &str) -> Result<QueryResult, RetryError<RetrievalError>> {
        let (embedder, store, collection, top_k) =
            (self.embedder, self.store, self.collection, self.top_k);
        self.policy
            .run("querying collection", move || async move {
                let embedding = embedder.embed_text(question).await?;
                let result = store.query(collection, &embedding, top_k).await?;
                Ok::<_, RetrievalError>(result)
            })
            .await
    }
}
