// src/main.rs
//! Knowledge-base assistant:
//! - load YAML config (db.yml, langchain.yml, assistant.yml)
//! - ensure the Chroma collection exists
//! - walk the knowledge base → select .txt/.md → embed → add (paced, retried)
//! - interactive loop: question → embed → top-3 neighbours → grounded prompt → LLM
//!
//! Run: `cargo run -- --config-dir config [run|ingest|query|ping|embed|ask]`
//! (With no subcommand, ingests then starts the question loop.)

mod client;
mod config;
mod index;
mod indexing;
mod inference;
mod ingest;
mod logging;
mod retry;
mod terminal;
mod transform;

#[cfg(test)]
mod testing;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use crate::terminal::{Cli, terminal};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match terminal(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
