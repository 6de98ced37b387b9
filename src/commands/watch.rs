// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rebuild the index on document changes

use anyhow::Result;
use std::path::{Path, PathBuf};

use policy_rag::config::Config;
use policy_rag::embedding::create_provider;
use policy_rag::indexer::{IndexBuilder, Watcher};

/// Run the watch command
pub fn run(config: &Config, docs: Option<PathBuf>, out: Option<&Path>, debounce: u64) -> Result<()> {
    let chunk = config.chunking.chunk_config(None, None)?;
    let builder = IndexBuilder::from_config(config, docs, out.map(Path::to_path_buf), chunk);
    let mut provider = create_provider(config.embeddings())?;
    Watcher::with_debounce(builder, debounce).watch(provider.as_mut())
}
