// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations

pub mod context;
pub mod index;
pub mod repl;
pub mod search;
pub mod watch;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};

use policy_rag::config::Config;
use policy_rag::embedding::{create_provider, SnapshotHandle, SnapshotPaths};
use policy_rag::Retriever;

/// Output directory from `--out`, else the config
pub fn out_dir(config: &Config, out: Option<&Path>) -> PathBuf {
    out.map(Path::to_path_buf)
        .unwrap_or_else(|| config.index().out_dir())
}

/// Loads the persisted snapshot and the configured query embedder
pub fn open_retriever(config: &Config, out: Option<&Path>) -> Result<Retriever> {
    let dir = out_dir(config, out);
    let snapshot = SnapshotHandle::open(SnapshotPaths::in_dir(&dir)).with_context(|| {
        format!(
            "cannot load index from {} (run `policy-rag index` first)",
            dir.display()
        )
    })?;
    let provider = create_provider(config.embeddings())?;
    Ok(Retriever::new(snapshot, provider))
}
