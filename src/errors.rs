// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the retrieval core.
//!
//! Persisted-state errors are fatal for the load that produced them: the
//! snapshot must be rebuilt from the source documents, nothing is repaired
//! in place.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// The vector index file is missing, truncated or internally inconsistent.
    #[error("corrupt vector index {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// A metadata line could not be parsed into a chunk record.
    #[error("corrupt metadata {} at line {line}: {reason}", path.display())]
    CorruptMetadata {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The index and metadata disagree; they were built or copied out of sync.
    #[error("index/metadata mismatch: {0}")]
    IndexMismatch(String),

    /// The embedding backend failed. The retriever never retries.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn corrupt_index(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the persisted snapshot rather than the query.
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            Self::CorruptIndex { .. } | Self::CorruptMetadata { .. } | Self::IndexMismatch(_)
        )
    }
}
