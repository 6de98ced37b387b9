// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the index from the docs directory

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use policy_rag::config::Config;
use policy_rag::embedding::create_provider;
use policy_rag::indexer::IndexBuilder;

use crate::cli::OutputFormat;

/// Run the index command
pub fn run(
    config: &Config,
    docs: Option<PathBuf>,
    out: Option<&Path>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    quiet: bool,
    format: OutputFormat,
) -> Result<()> {
    let chunk = config.chunking.chunk_config(chunk_size, overlap)?;
    let builder = IndexBuilder::from_config(config, docs, out.map(Path::to_path_buf), chunk)
        .with_progress(!quiet && format == OutputFormat::Text);

    let mut provider = create_provider(config.embeddings())?;
    let start = Instant::now();
    let report = builder.build(provider.as_mut())?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Indexed {} documents from {} in {:.1}s",
                "✓".green(),
                report.documents.to_string().cyan(),
                builder.docs_dir().display(),
                start.elapsed().as_secs_f64()
            );
            println!(
                "  Vectors: {} (dim={})",
                report.vectors.to_string().cyan(),
                report.dimension
            );
            println!("  Metadata rows: {}", report.chunks.to_string().cyan());
            println!("  Output: {}", report.out_dir.display());
        }
    }

    Ok(())
}
