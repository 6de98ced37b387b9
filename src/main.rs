// SPDX-License-Identifier: MIT OR Apache-2.0

//! policy-rag - Policy document retrieval with citations
//!
//! Builds a flat vector index over chunked policy documents and answers
//! questions with numbered, citable passages.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with POLICY_RAG_LOG env var (e.g., POLICY_RAG_LOG=debug policy-rag index)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("POLICY_RAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let out = cli.out.as_deref();
    let config = policy_rag::config::Config::load();

    match cli.command {
        Commands::Index {
            docs,
            chunk_size,
            overlap,
            quiet,
        } => {
            commands::index::run(&config, docs, out, chunk_size, overlap, quiet, format)?;
        }
        Commands::Search { query, k } => {
            commands::search::run(&config, out, &query, k, format)?;
        }
        Commands::Context { query, k } => {
            commands::context::run(&config, out, &query, k, format)?;
        }
        Commands::Repl { k } => {
            commands::repl::run(&config, out, k, format)?;
        }
        Commands::Watch { docs, debounce } => {
            commands::watch::run(&config, docs, out, debounce)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "policy-rag", &mut std::io::stdout());
        }
    }

    Ok(())
}
