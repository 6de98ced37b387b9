// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval snapshot: the vector index and its metadata as one value.
//!
//! A snapshot is only constructed when index and metadata agree in length, so
//! position `i` always has a record. It is persisted as three files in one
//! directory and published to readers through [`SnapshotHandle`], which swaps
//! whole snapshots and never exposes a half-loaded pair.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::embedding::index::FlatIndex;
use crate::embedding::metadata::{ChunkRecord, MetadataStore};
use crate::errors::{RagError, Result};
use crate::utils::write_atomic;

/// Vector index file name.
pub const INDEX_FILE: &str = "rag.index";
/// Metadata file name.
pub const METADATA_FILE: &str = "rag_meta.jsonl";
/// Manifest file name.
pub const MANIFEST_FILE: &str = "rag_manifest.json";

/// Locations of the three snapshot files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub manifest: PathBuf,
}

impl SnapshotPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            index: dir.join(INDEX_FILE),
            metadata: dir.join(METADATA_FILE),
            manifest: dir.join(MANIFEST_FILE),
        }
    }
}

/// Build parameters recorded next to a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub model: String,
    pub chunk_size: usize,
    pub overlap: usize,
    pub documents: usize,
}

/// Summary written last when a snapshot is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Embedding model the vectors came from
    pub model: String,
    pub dimension: usize,
    pub vectors: usize,
    pub documents: usize,
    pub chunk_size: usize,
    pub overlap: usize,
    /// Unix epoch milliseconds
    pub created_at: u64,
    /// Changes on every build; readers compare it to decide whether to reload
    pub build_id: String,
    /// blake3 of the serialized index written with this manifest
    pub index_digest: String,
    /// blake3 of the metadata lines written with this manifest
    pub metadata_digest: String,
}

impl Manifest {
    /// Reads a manifest; a missing or unparsable file is a corrupt snapshot.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| RagError::corrupt_index(path, format!("cannot read manifest: {}", err)))?;
        serde_json::from_str(&raw)
            .map_err(|err| RagError::corrupt_index(path, format!("invalid manifest: {}", err)))
    }
}

/// Index plus parallel metadata, validated together.
#[derive(Debug, Clone)]
pub struct RetrievalSnapshot {
    index: FlatIndex,
    records: Vec<ChunkRecord>,
    manifest: Option<Manifest>,
}

impl RetrievalSnapshot {
    /// Pairs an index with its records; they must have the same length.
    pub fn new(index: FlatIndex, records: Vec<ChunkRecord>) -> Result<Self> {
        if index.len() != records.len() {
            return Err(RagError::IndexMismatch(format!(
                "index holds {} vectors but metadata holds {} records",
                index.len(),
                records.len()
            )));
        }
        Ok(Self {
            index,
            records,
            manifest: None,
        })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Record for the vector at `position`.
    pub fn record(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(position)
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Manifest this snapshot was loaded with or last persisted as.
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Writes index, metadata and finally the manifest.
    pub fn persist(&mut self, paths: &SnapshotPaths, build: &BuildInfo) -> Result<Manifest> {
        let index_bytes = self.index.to_bytes();
        let metadata_bytes = MetadataStore::encode(&self.records)?;
        write_atomic(&paths.index, &index_bytes)?;
        write_atomic(&paths.metadata, &metadata_bytes)?;

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&created_at.to_le_bytes());
        hasher.update(build.model.as_bytes());
        for record in &self.records {
            hasher.update(record.doc_id.as_bytes());
            hasher.update(&record.chunk_id.to_le_bytes());
            hasher.update(record.text.as_bytes());
        }

        let manifest = Manifest {
            model: build.model.clone(),
            dimension: self.index.dimension(),
            vectors: self.index.len(),
            documents: build.documents,
            chunk_size: build.chunk_size,
            overlap: build.overlap,
            created_at,
            build_id: hasher.finalize().to_hex().as_str()[..16].to_string(),
            index_digest: blake3::hash(&index_bytes).to_hex().to_string(),
            metadata_digest: blake3::hash(&metadata_bytes).to_hex().to_string(),
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(std::io::Error::other)?;
        write_atomic(&paths.manifest, &json)?;

        info!(
            "persisted snapshot {} ({} vectors, dim={})",
            manifest.build_id, manifest.vectors, manifest.dimension
        );
        self.manifest = Some(manifest.clone());
        Ok(manifest)
    }

    /// Loads all three files and checks them against each other. Files from
    /// different builds are rejected even when their lengths agree.
    pub fn load(paths: &SnapshotPaths) -> Result<Self> {
        let manifest = Manifest::load(&paths.manifest)?;
        let index = FlatIndex::load(&paths.index)?;
        let records = MetadataStore::new(&paths.metadata).load_all()?;

        if manifest.vectors != index.len()
            || (!index.is_empty() && manifest.dimension != index.dimension())
        {
            return Err(RagError::corrupt_index(
                &paths.index,
                format!(
                    "manifest expects {} vectors of dimension {}, found {} of dimension {}",
                    manifest.vectors,
                    manifest.dimension,
                    index.len(),
                    index.dimension()
                ),
            ));
        }

        let mut snapshot = Self::new(index, records)?;
        if snapshot.index.content_digest() != manifest.index_digest {
            return Err(RagError::IndexMismatch(format!(
                "{} does not belong to build {}",
                paths.index.display(),
                manifest.build_id
            )));
        }
        let metadata_digest = blake3::hash(&MetadataStore::encode(&snapshot.records)?);
        if metadata_digest.to_hex().as_str() != manifest.metadata_digest {
            return Err(RagError::IndexMismatch(format!(
                "{} does not belong to build {}",
                paths.metadata.display(),
                manifest.build_id
            )));
        }

        debug!(
            "loaded snapshot {} ({} chunks)",
            manifest.build_id,
            snapshot.len()
        );
        snapshot.manifest = Some(manifest);
        Ok(snapshot)
    }
}

/// Shared, swappable reference to the published snapshot.
///
/// Readers take an `Arc` and keep using it for the whole query, so a reload
/// in between never affects a query already in flight.
#[derive(Debug)]
pub struct SnapshotHandle {
    paths: SnapshotPaths,
    current: RwLock<Arc<RetrievalSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: RetrievalSnapshot, paths: SnapshotPaths) -> Self {
        Self {
            paths,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Loads the snapshot stored at `paths`.
    pub fn open(paths: SnapshotPaths) -> Result<Self> {
        let snapshot = RetrievalSnapshot::load(&paths)?;
        Ok(Self::new(snapshot, paths))
    }

    pub fn paths(&self) -> &SnapshotPaths {
        &self.paths
    }

    /// The snapshot currently published.
    pub fn current(&self) -> Arc<RetrievalSnapshot> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Publishes `snapshot`, returning the one it replaced.
    pub fn replace(&self, snapshot: RetrievalSnapshot) -> Arc<RetrievalSnapshot> {
        let next = Arc::new(snapshot);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Loads the files again and publishes the result. On error the current
    /// snapshot stays published.
    pub fn reload(&self) -> Result<Arc<RetrievalSnapshot>> {
        let snapshot = RetrievalSnapshot::load(&self.paths)?;
        self.replace(snapshot);
        info!("reloaded snapshot from {}", self.paths.manifest.display());
        Ok(self.current())
    }

    /// Reloads only when the manifest on disk names a different build.
    pub fn reload_if_changed(&self) -> Result<bool> {
        let on_disk = Manifest::load(&self.paths.manifest)?;
        let current = self.current();
        let unchanged = current
            .manifest()
            .is_some_and(|m| m.build_id == on_disk.build_id);
        if unchanged {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(doc_id: &str, chunk_id: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc_id.to_string(),
            doc_title: doc_id.trim_end_matches(".md").to_string(),
            chunk_id,
            text: text.to_string(),
        }
    }

    fn build_info() -> BuildInfo {
        BuildInfo {
            model: "hashing-2".to_string(),
            chunk_size: 900,
            overlap: 180,
            documents: 1,
        }
    }

    fn snapshot(records: Vec<ChunkRecord>) -> RetrievalSnapshot {
        let mut index = FlatIndex::new(0);
        let vectors: Vec<Vec<f32>> = (0..records.len())
            .map(|i| if i % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
            .collect();
        index.add(&vectors).unwrap();
        RetrievalSnapshot::new(index, records).unwrap()
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let err = RetrievalSnapshot::new(index, Vec::new()).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch(_)));
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        let mut original = snapshot(vec![record("a.md", 0, "alpha"), record("a.md", 1, "beta")]);
        let manifest = original.persist(&paths, &build_info()).unwrap();
        assert_eq!(manifest.vectors, 2);
        assert_eq!(manifest.dimension, 2);

        let loaded = RetrievalSnapshot::load(&paths).unwrap();
        assert_eq!(loaded.records(), original.records());
        assert_eq!(loaded.index(), original.index());
        assert_eq!(loaded.manifest(), Some(&manifest));
    }

    #[test]
    fn test_load_detects_metadata_drift() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "alpha"), record("a.md", 1, "beta")])
            .persist(&paths, &build_info())
            .unwrap();

        // Metadata rewritten by a different build.
        MetadataStore::new(&paths.metadata)
            .write_all(&[record("a.md", 0, "alpha")])
            .unwrap();

        let err = RetrievalSnapshot::load(&paths).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch(_)));
    }

    #[test]
    fn test_load_detects_manifest_disagreement() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "alpha")])
            .persist(&paths, &build_info())
            .unwrap();
        snapshot(vec![record("a.md", 0, "alpha"), record("b.md", 0, "beta")])
            .index()
            .persist(&paths.index)
            .unwrap();

        let err = RetrievalSnapshot::load(&paths).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex { .. }));
    }

    #[test]
    fn test_load_rejects_index_from_another_build() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(&dir.path().join("live"));
        let mut old_index = FlatIndex::new(2);
        old_index.add(&[vec![1.0, 0.0]]).unwrap();
        RetrievalSnapshot::new(old_index, vec![record("a.md", 0, "old text")])
            .unwrap()
            .persist(&paths, &build_info())
            .unwrap();

        // Same count and dimension, different vectors: only the index got replaced.
        let next = SnapshotPaths::in_dir(&dir.path().join("next"));
        let mut new_index = FlatIndex::new(2);
        new_index.add(&[vec![0.0, 1.0]]).unwrap();
        RetrievalSnapshot::new(new_index, vec![record("a.md", 0, "new text")])
            .unwrap()
            .persist(&next, &build_info())
            .unwrap();
        std::fs::copy(&next.index, &paths.index).unwrap();

        let err = RetrievalSnapshot::load(&paths).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch(_)));
        assert!(err.requires_rebuild());
    }

    #[test]
    fn test_load_rejects_metadata_from_another_build() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "old text")])
            .persist(&paths, &build_info())
            .unwrap();
        MetadataStore::new(&paths.metadata)
            .write_all(&[record("a.md", 0, "new text")])
            .unwrap();

        let err = RetrievalSnapshot::load(&paths).unwrap_err();
        assert!(matches!(err, RagError::IndexMismatch(_)));
    }

    #[test]
    fn test_torn_files_keep_current_snapshot() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "alpha")])
            .persist(&paths, &build_info())
            .unwrap();
        let handle = SnapshotHandle::open(paths.clone()).unwrap();

        // A new manifest lands while the metadata still comes from the old build.
        let old_metadata = std::fs::read(&paths.metadata).unwrap();
        snapshot(vec![record("a.md", 0, "gamma")])
            .persist(&paths, &build_info())
            .unwrap();
        std::fs::write(&paths.metadata, old_metadata).unwrap();

        assert!(handle.reload_if_changed().is_err());
        assert_eq!(handle.current().records()[0].text, "alpha");
    }

    #[test]
    fn test_missing_manifest_is_corrupt() {
        let dir = tempdir().unwrap();
        let err = RetrievalSnapshot::load(&SnapshotPaths::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex { .. }));
    }

    #[test]
    fn test_handle_swaps_whole_snapshot() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "alpha")])
            .persist(&paths, &build_info())
            .unwrap();

        let handle = SnapshotHandle::open(paths.clone()).unwrap();
        let before = handle.current();
        assert_eq!(before.len(), 1);
        assert!(!handle.reload_if_changed().unwrap());

        snapshot(vec![record("a.md", 0, "alpha"), record("b.md", 0, "beta")])
            .persist(&paths, &build_info())
            .unwrap();
        assert!(handle.reload_if_changed().unwrap());

        // The old Arc is still intact for readers that held it.
        assert_eq!(before.len(), 1);
        assert_eq!(handle.current().len(), 2);
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let dir = tempdir().unwrap();
        let paths = SnapshotPaths::in_dir(dir.path());
        snapshot(vec![record("a.md", 0, "alpha")])
            .persist(&paths, &build_info())
            .unwrap();
        let handle = SnapshotHandle::open(paths.clone()).unwrap();

        std::fs::write(&paths.index, b"garbage").unwrap();
        assert!(handle.reload().is_err());
        assert_eq!(handle.current().len(), 1);
    }
}
