// SPDX-License-Identifier: MIT OR Apache-2.0

//! Citation block for a question

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::Path;

use policy_rag::config::Config;
use policy_rag::Grounding;

use crate::cli::OutputFormat;
use crate::commands::open_retriever;

/// Run the context command
pub fn run(
    config: &Config,
    out: Option<&Path>,
    query: &str,
    k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let k = config.merge_k(k);
    let grounding = match open_retriever(config, out) {
        Ok(retriever) => retriever.ground(query, k),
        Err(e) => unavailable(&e),
    };
    print_grounding(&grounding, format)
}

/// Grounding reported when no retriever could be opened.
pub fn unavailable(err: &anyhow::Error) -> Grounding {
    tracing::warn!("no grounding available: {:#}", err);
    Grounding::Unavailable {
        reason: format!("{:#}", err),
    }
}

/// Prints one grounding. JSON always succeeds and carries the status; text
/// fails when retrieval failed.
pub fn print_grounding(grounding: &Grounding, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(grounding)?);
        }
        OutputFormat::Text => match grounding {
            Grounding::Available { context, sources, .. } => {
                println!("{}", context);
                println!("\n{} {}", "Sources:".dimmed(), sources.join(", "));
            }
            Grounding::NoMatches => {
                println!("{} No matching policy passages", "✗".red());
            }
            Grounding::Unavailable { reason } => {
                bail!("retrieval unavailable: {}", reason);
            }
        },
    }
    Ok(())
}
