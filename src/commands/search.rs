// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranked chunk search

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use policy_rag::config::Config;
use policy_rag::output::{render_hit, use_colors, SearchReport};

use crate::cli::OutputFormat;
use crate::commands::open_retriever;

/// Run the search command
pub fn run(
    config: &Config,
    out: Option<&Path>,
    query: &str,
    k: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let k = config.merge_k(k);
    let retriever = open_retriever(config, out)?;
    let hits = retriever.search(query, k)?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&SearchReport::new(query, k, &hits))?
            );
        }
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("{} No matching passages for: {}", "✗".red(), query.yellow());
                return Ok(());
            }
            let use_color = use_colors();
            println!("\n{} Results for: {}\n", "🔍".cyan(), query.yellow());
            for (i, hit) in hits.iter().enumerate() {
                println!("{}\n", render_hit(i + 1, hit, use_color));
            }
            println!(
                "{} Found {} passages",
                "✓".green(),
                hits.len().to_string().cyan()
            );
        }
    }

    Ok(())
}
