// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot builder: scan, chunk, embed, persist

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::embedding::chunker::{extract_title, ChunkConfig, DocumentChunker};
use crate::embedding::index::FlatIndex;
use crate::embedding::metadata::ChunkRecord;
use crate::embedding::provider::{embed_normalized, EmbeddingProvider};
use crate::embedding::snapshot::{BuildInfo, Manifest, RetrievalSnapshot, SnapshotPaths};
use crate::errors::Result;
use crate::indexer::scanner::{Document, DocumentScanner};

/// Outcome of one build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
    pub dimension: usize,
    pub out_dir: PathBuf,
    pub manifest: Manifest,
}

/// Builds and persists the retrieval snapshot for a docs directory
pub struct IndexBuilder {
    scanner: DocumentScanner,
    chunker: DocumentChunker,
    out_dir: PathBuf,
    show_progress: bool,
}

impl IndexBuilder {
    pub fn new(docs_dir: impl AsRef<Path>, out_dir: impl AsRef<Path>, chunk: ChunkConfig) -> Self {
        Self {
            scanner: DocumentScanner::new(docs_dir),
            chunker: DocumentChunker::new(chunk),
            out_dir: out_dir.as_ref().to_path_buf(),
            show_progress: false,
        }
    }

    /// Builder from the loaded config; `chunk` carries any CLI overrides
    pub fn from_config(
        config: &Config,
        docs_dir: Option<PathBuf>,
        out_dir: Option<PathBuf>,
        chunk: ChunkConfig,
    ) -> Self {
        let docs_dir = docs_dir.unwrap_or_else(|| config.index().docs_dir());
        let out_dir = out_dir.unwrap_or_else(|| config.index().out_dir());
        Self {
            scanner: DocumentScanner::from_config(docs_dir, config.index()),
            chunker: DocumentChunker::new(chunk),
            out_dir,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn docs_dir(&self) -> &Path {
        self.scanner.root()
    }

    pub fn scanner(&self) -> &DocumentScanner {
        &self.scanner
    }

    pub fn paths(&self) -> SnapshotPaths {
        SnapshotPaths::in_dir(&self.out_dir)
    }

    /// Splits documents into metadata records, in document then chunk order
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<ChunkRecord> {
        let mut records = Vec::new();
        for document in documents {
            let title = extract_title(&document.text, &document.stem());
            let chunks = self.chunker.chunk_document(&document.text);
            debug!("{}: {} chunks", document.doc_id, chunks.len());
            records.extend(chunks.into_iter().enumerate().map(|(chunk_id, chunk)| {
                ChunkRecord {
                    doc_id: document.doc_id.clone(),
                    doc_title: title.clone(),
                    chunk_id,
                    text: chunk.text,
                }
            }));
        }
        records
    }

    /// Embeds `records` in provider-sized batches into a new snapshot
    pub fn embed_records(
        &self,
        provider: &mut dyn EmbeddingProvider,
        records: Vec<ChunkRecord>,
    ) -> Result<RetrievalSnapshot> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new(records.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.cyan/blue}] {pos}/{len} chunks | Embedding {msg}")
                    .expect("valid progress bar template")
                    .progress_chars("##."),
            );
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(provider.model_id().to_string());

        let mut index = FlatIndex::new(0);
        let batch_size = provider.batch_size().max(1);
        for batch in records.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
            let vectors = embed_normalized(provider, &texts)?;
            index.add(&vectors)?;
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        RetrievalSnapshot::new(index, records)
    }

    /// Full rebuild: scan, chunk, embed and persist under the output dir
    pub fn build(&self, provider: &mut dyn EmbeddingProvider) -> Result<BuildReport> {
        let documents = self.scanner.scan()?;
        let records = self.chunk_documents(&documents);
        let chunks = records.len();
        info!(
            "chunked {} documents into {} chunks",
            documents.len(),
            chunks
        );

        let mut snapshot = self.embed_records(provider, records)?;
        let config = self.chunker.config();
        let manifest = snapshot.persist(
            &self.paths(),
            &BuildInfo {
                model: provider.model_id().to_string(),
                chunk_size: config.chunk_size,
                overlap: config.overlap,
                documents: documents.len(),
            },
        )?;

        Ok(BuildReport {
            documents: documents.len(),
            chunks,
            vectors: snapshot.len(),
            dimension: snapshot.dimension(),
            out_dir: self.out_dir.clone(),
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::{embed_query, HashingProvider};
    use crate::embedding::snapshot::SnapshotHandle;
    use crate::embedding::MetadataStore;
    use crate::errors::RagError;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        fs::write(
            docs.join("returns.md"),
            "# Return Policy\nItems may be returned within 30 days.",
        )
        .unwrap();
        fs::write(docs.join("shipping.md"), "Orders ship within two business days.").unwrap();
        fs::write(docs.join("empty.md"), "  \n\n ").unwrap();
        let out = dir.path().join("dat").join("out");
        (dir, docs, out)
    }

    #[test]
    fn test_build_persists_parallel_files() {
        let (_dir, docs, out) = workspace();
        let builder = IndexBuilder::new(&docs, &out, ChunkConfig::default());
        let mut provider = HashingProvider::new(32).unwrap();
        let report = builder.build(&mut provider).unwrap();

        assert_eq!(report.documents, 3);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.vectors, 2);
        assert_eq!(report.dimension, 32);
        assert_eq!(report.manifest.model, "hashing-32");

        let paths = SnapshotPaths::in_dir(&out);
        let records = MetadataStore::new(&paths.metadata).load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].doc_id, "returns.md");
        assert_eq!(records[0].doc_title, "Return Policy");
        assert_eq!(records[1].doc_title, "shipping");

        let handle = SnapshotHandle::open(paths).unwrap();
        assert_eq!(handle.current().len(), 2);
    }

    #[test]
    fn test_vector_at_each_position_embeds_its_record() {
        let (_dir, docs, out) = workspace();
        fs::write(
            docs.join("warranty.md"),
            "# Warranty\n".to_string() + &"Claims are reviewed within ten days. ".repeat(8),
        )
        .unwrap();
        let builder = IndexBuilder::new(&docs, &out, ChunkConfig::new(120, 30).unwrap());
        let documents = builder.scanner().scan().unwrap();
        let records = builder.chunk_documents(&documents);
        assert!(records.len() > 3);

        let snapshot = builder
            .embed_records(&mut HashingProvider::new(64).unwrap(), records)
            .unwrap();
        let mut provider = HashingProvider::new(64).unwrap();
        for (position, record) in snapshot.records().iter().enumerate() {
            let expected = embed_query(&mut provider, &record.text).unwrap();
            assert_eq!(
                snapshot.index().vector(position),
                Some(expected.as_slice()),
                "vector {} does not embed {}#chunk{}",
                position,
                record.doc_id,
                record.chunk_id
            );
        }
    }

    #[test]
    fn test_chunk_ids_restart_per_document() {
        let (_dir, docs, out) = workspace();
        fs::write(docs.join("long.md"), "word ".repeat(60)).unwrap();
        let builder = IndexBuilder::new(&docs, &out, ChunkConfig::new(100, 20).unwrap());
        let documents = builder.scanner().scan().unwrap();
        let records = builder.chunk_documents(&documents);

        let long: Vec<usize> = records
            .iter()
            .filter(|r| r.doc_id == "long.md")
            .map(|r| r.chunk_id)
            .collect();
        assert_eq!(long, (0..long.len()).collect::<Vec<_>>());
        assert!(long.len() > 1);
        assert_eq!(
            records.iter().find(|r| r.doc_id == "returns.md").unwrap().chunk_id,
            0
        );
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let (_dir, docs, out) = workspace();
        let builder = IndexBuilder::new(&docs, &out, ChunkConfig::default());
        let documents = builder.scanner().scan().unwrap();
        assert_eq!(
            builder.chunk_documents(&documents),
            builder.chunk_documents(&documents)
        );
    }

    #[test]
    fn test_empty_docs_dir_builds_empty_snapshot() {
        let dir = TempDir::new().unwrap();
        let docs = dir.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let out = dir.path().join("out");

        let mut provider = HashingProvider::new(8).unwrap();
        let report = IndexBuilder::new(&docs, &out, ChunkConfig::default())
            .build(&mut provider)
            .unwrap();
        assert_eq!(report.vectors, 0);

        let handle = SnapshotHandle::open(SnapshotPaths::in_dir(&out)).unwrap();
        assert!(handle.current().is_empty());
    }

    #[test]
    fn test_missing_docs_dir_fails() {
        let dir = TempDir::new().unwrap();
        let mut provider = HashingProvider::new(8).unwrap();
        let err = IndexBuilder::new(dir.path().join("nope"), dir.path(), ChunkConfig::default())
            .build(&mut provider)
            .unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
    }
}
