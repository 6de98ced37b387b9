// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-lines metadata store, one chunk record per line.
//!
//! Line `i` describes the vector at position `i` of the paired index. The
//! store itself does not know about the index; parity is checked by
//! [`crate::embedding::RetrievalSnapshot`].

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::errors::{RagError, Result};
use crate::utils::write_atomic;

/// Metadata for one indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Owning document (file name relative to the docs directory)
    pub doc_id: String,
    /// Document title from its first heading, or the file stem
    pub doc_title: String,
    /// 0-based sequence number within the document
    pub chunk_id: usize,
    /// Cleaned, trimmed chunk text
    pub text: String,
}

/// Line-delimited record file.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends records to the end of the file, creating it if needed.
    pub fn append_all(&self, records: &[ChunkRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            let line = serde_json::to_string(record).map_err(std::io::Error::other)?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Encodes `records` exactly as [`MetadataStore::write_all`] stores them.
    pub fn encode(records: &[ChunkRecord]) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record).map_err(std::io::Error::other)?;
            buffer.push(b'\n');
        }
        Ok(buffer)
    }

    /// Replaces the file with exactly `records`, atomically.
    pub fn write_all(&self, records: &[ChunkRecord]) -> Result<()> {
        write_atomic(&self.path, &Self::encode(records)?)?;
        Ok(())
    }

    /// Reads every record in file order.
    pub fn load_all(&self) -> Result<Vec<ChunkRecord>> {
        let file = File::open(&self.path).map_err(|err| self.corrupt(0, format!("cannot open: {}", err)))?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|err| self.corrupt(line_no, err.to_string()))?;
            let record: ChunkRecord =
                serde_json::from_str(&line).map_err(|err| self.corrupt(line_no, err.to_string()))?;
            records.push(record);
        }

        tracing::debug!("loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    fn corrupt(&self, line: usize, reason: String) -> RagError {
        RagError::CorruptMetadata {
            path: self.path.clone(),
            line,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(doc_id: &str, chunk_id: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            doc_id: doc_id.to_string(),
            doc_title: "Return Policy".to_string(),
            chunk_id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_write_then_load_preserves_order() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("rag_meta.jsonl"));
        let records = vec![
            record("returns.md", 0, "Items may be returned within 30 days."),
            record("returns.md", 1, "Final sale items are excluded."),
            record("shipping.md", 0, "Orders ship in 2 days.\nTracking is emailed."),
        ];
        store.write_all(&records).unwrap();

        assert_eq!(store.load_all().unwrap(), records);
    }

    #[test]
    fn test_one_record_per_line() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("rag_meta.jsonl"));
        store
            .write_all(&[record("a.md", 0, "line one\nline two"), record("a.md", 1, "x")])
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.lines().all(|l| l.contains("\"doc_id\"") && l.contains("\"chunk_id\"")));
    }

    #[test]
    fn test_append_all_extends_file() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("out").join("rag_meta.jsonl"));
        store.append_all(&[record("a.md", 0, "first")]).unwrap();
        store.append_all(&[record("a.md", 1, "second")]).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].text, "second");
    }

    #[test]
    fn test_unicode_text_kept() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("rag_meta.jsonl"));
        let records = vec![record("fr.md", 0, "Retours acceptés sous 30 jours, merci")];
        store.write_all(&records).unwrap();
        assert_eq!(store.load_all().unwrap(), records);
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rag_meta.jsonl");
        std::fs::write(
            &path,
            "{\"doc_id\":\"a.md\",\"doc_title\":\"A\",\"chunk_id\":0,\"text\":\"ok\"}\n{\"doc_id\":\"a.md\",\"chunk_id\":1}\n",
        )
        .unwrap();

        let err = MetadataStore::new(&path).load_all().unwrap_err();
        match err {
            RagError::CorruptMetadata { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_blank_line_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rag_meta.jsonl");
        std::fs::write(&path, "\n").unwrap();
        assert!(matches!(
            MetadataStore::new(&path).load_all(),
            Err(RagError::CorruptMetadata { line: 1, .. })
        ));
    }

    #[test]
    fn test_missing_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("absent.jsonl"));
        assert!(matches!(
            store.load_all(),
            Err(RagError::CorruptMetadata { line: 0, .. })
        ));
    }

    #[test]
    fn test_empty_file_has_no_records() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("rag_meta.jsonl"));
        store.write_all(&[]).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
