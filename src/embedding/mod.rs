// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - chunking, vector embeddings and the persisted snapshot
//!
//! Documents are split into overlapping chunks, embedded into unit vectors and
//! stored in a flat inner-product index whose positions line up with a
//! JSON-lines metadata file.

pub mod chunker;
pub mod index;
pub mod metadata;
pub mod provider;
pub mod snapshot;

pub use chunker::{chunk_text, clean_text, extract_title, ChunkConfig, DocumentChunker, TextChunk};
pub use index::{FlatIndex, Neighbor};
pub use metadata::{ChunkRecord, MetadataStore};
pub use provider::{
    create_provider, embed_normalized, embed_query, CommandProvider, EmbeddingProvider,
    EmbeddingProviderConfig, FastEmbedder, HashingProvider, DEFAULT_EMBEDDING_DIM,
};
pub use snapshot::{BuildInfo, Manifest, RetrievalSnapshot, SnapshotHandle, SnapshotPaths};
