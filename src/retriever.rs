// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query-time retrieval and the citation contract handed to answer generation.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::embedding::index::Neighbor;
use crate::embedding::metadata::ChunkRecord;
use crate::embedding::provider::{embed_query, EmbeddingProvider};
use crate::embedding::snapshot::{SnapshotHandle, SnapshotPaths};
use crate::errors::{RagError, Result};

/// A ranked chunk returned by [`Retriever::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// Inner product of query and chunk vectors; higher is closer
    pub score: f32,
    pub doc_id: String,
    pub doc_title: String,
    pub chunk_id: usize,
    pub text: String,
}

impl Hit {
    fn from_record(score: f32, record: &ChunkRecord) -> Self {
        Self {
            score,
            doc_id: record.doc_id.clone(),
            doc_title: record.doc_title.clone(),
            chunk_id: record.chunk_id,
            text: record.text.clone(),
        }
    }

    /// Citation label, e.g. `returns.md#chunk0 (Return Policy)`.
    pub fn cite(&self) -> String {
        format!("{}#chunk{} ({})", self.doc_id, self.chunk_id, self.doc_title)
    }
}

/// Numbered citation block for a list of hits.
///
/// Entry `i` is `[i] <citation>` followed by the chunk text on the next line.
/// Entries are separated by a blank line and the result carries no trailing
/// whitespace. No hits yields an empty string.
pub fn format_citations(hits: &[Hit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}\n{}", i + 1, hit.cite(), hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim_end()
        .to_string()
}

/// Sorted, de-duplicated document ids backing `hits`.
pub fn source_docs(hits: &[Hit]) -> Vec<String> {
    hits.iter()
        .map(|hit| hit.doc_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Maps index positions to their metadata records, in ranking order.
///
/// Padded "no match" slots are skipped; a position with no record means
/// index and metadata were built out of sync.
pub fn assemble_hits(neighbors: &[Neighbor], records: &[ChunkRecord]) -> Result<Vec<Hit>> {
    let mut hits = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        let Some(position) = neighbor.position else {
            continue;
        };
        let record = records.get(position).ok_or_else(|| {
            RagError::IndexMismatch(format!(
                "index position {} has no metadata record ({} records)",
                position,
                records.len()
            ))
        })?;
        hits.push(Hit::from_record(neighbor.score, record));
    }
    Ok(hits)
}

/// What the answer generator receives for one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Grounding {
    /// Retrieval succeeded with at least one hit
    Available {
        context: String,
        citations: Vec<String>,
        sources: Vec<String>,
    },
    /// Retrieval succeeded but nothing matched
    NoMatches,
    /// Retrieval itself failed
    Unavailable { reason: String },
}

impl Grounding {
    pub fn from_hits(hits: &[Hit]) -> Self {
        if hits.is_empty() {
            return Self::NoMatches;
        }
        Self::Available {
            context: format_citations(hits),
            citations: hits.iter().map(Hit::cite).collect(),
            sources: source_docs(hits),
        }
    }

    /// Keeps a failed search distinguishable from an empty one.
    pub fn from_search(result: Result<Vec<Hit>>) -> Self {
        match result {
            Ok(hits) => Self::from_hits(&hits),
            Err(err) => Self::Unavailable {
                reason: err.to_string(),
            },
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }

    /// Citation block, empty unless grounding is available.
    pub fn context(&self) -> &str {
        match self {
            Self::Available { context, .. } => context,
            _ => "",
        }
    }
}

/// Long-lived retrieval service: the published snapshot plus the embedder
/// used for queries. Built once and shared by reference.
pub struct Retriever {
    snapshot: SnapshotHandle,
    embedder: Mutex<Box<dyn EmbeddingProvider>>,
}

impl Retriever {
    pub fn new(snapshot: SnapshotHandle, embedder: Box<dyn EmbeddingProvider>) -> Self {
        if let Some(manifest) = snapshot.current().manifest() {
            if manifest.model != embedder.model_id() {
                warn!(
                    "snapshot was built with {} but queries use {}; scores may be meaningless",
                    manifest.model,
                    embedder.model_id()
                );
            }
        }
        Self {
            snapshot,
            embedder: Mutex::new(embedder),
        }
    }

    /// Loads the snapshot stored at `paths`.
    pub fn open(paths: SnapshotPaths, embedder: Box<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self::new(SnapshotHandle::open(paths)?, embedder))
    }

    pub fn snapshot(&self) -> &SnapshotHandle {
        &self.snapshot
    }

    /// Top `k` chunks for `query`, best first. May return fewer than `k`.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>> {
        let snapshot = self.snapshot.current();
        if k == 0 || snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let vector = {
            let mut embedder = self
                .embedder
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            embed_query(embedder.as_mut(), query)?
        };

        let neighbors = snapshot.index().search(&vector, k)?;
        let hits = assemble_hits(&neighbors, snapshot.records())?;
        debug!("query matched {} of {} requested hits", hits.len(), k);
        Ok(hits)
    }

    /// Search result folded into a [`Grounding`].
    pub fn ground(&self, query: &str, k: usize) -> Grounding {
        Grounding::from_search(self.search(query, k))
    }

    /// Picks up a rebuilt snapshot if the manifest on disk changed.
    pub fn reload_if_changed(&self) -> Result<bool> {
        self.snapshot.reload_if_changed()
    }
}
