// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// policy-rag - Policy document retrieval with citations
///
/// Chunks a directory of policy documents, embeds the chunks into a vector
/// index and answers questions with ranked, citable passages.
#[derive(Parser, Debug)]
#[command(name = "policy-rag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Directory holding the index, metadata and manifest (default: dat/out)
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the index from a docs directory
    Index {
        /// Docs directory (default: docs)
        #[arg(short, long)]
        docs: Option<PathBuf>,

        /// Characters per chunk (default: 900)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks (default: 180)
        #[arg(long)]
        overlap: Option<usize>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the chunks closest to a question
    Search {
        /// Question or keywords
        query: String,

        /// Number of hits (default: 5)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Print the numbered citation block handed to answer generation
    Context {
        /// Question or keywords
        query: String,

        /// Number of hits (default: 5)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Answer questions read line by line from stdin
    Repl {
        /// Number of hits (default: 5)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Rebuild the index whenever documents change
    Watch {
        /// Docs directory (default: docs)
        #[arg(short, long)]
        docs: Option<PathBuf>,

        /// Debounce interval in seconds (default: 2)
        #[arg(long, default_value = "2")]
        debounce: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
