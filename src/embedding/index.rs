// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flat vector index with exact inner-product search.
//!
//! Vectors are stored contiguously in insertion order; a vector's position is
//! its identifier for the lifetime of the index. Search is brute force, so
//! results carry no approximation error.
//!
//! On-disk layout (little endian):
//! ```text
//! magic    8 bytes  "PRAGIDX1"
//! dim      u32
//! count    u64
//! vectors  count * dim * f32
//! digest   32 bytes blake3 of everything above
//! ```

use memmap2::Mmap;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::errors::{RagError, Result};
use crate::utils::write_atomic;

const MAGIC: &[u8; 8] = b"PRAGIDX1";
const HEADER_LEN: usize = 8 + 4 + 8;
const DIGEST_LEN: usize = 32;

/// One search result. `position` is `None` for a padded "no match" slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Inner product with the query (cosine similarity for unit vectors)
    pub score: f32,
    /// Insertion position of the matched vector
    pub position: Option<usize>,
}

/// Ordered collection of fixed-dimension vectors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    /// 0 until the first vector fixes it
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Creates an empty index. A dimension of 0 is fixed by the first `add`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the vector stored at `position`.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Appends vectors in order. Nothing is added unless every vector has the
    /// index dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        let dimension = if self.dimension == 0 {
            first.len()
        } else {
            self.dimension
        };
        if dimension == 0 {
            return Err(RagError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        self.dimension = dimension;
        self.data.reserve(vectors.len() * dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Returns up to `k` neighbors by descending inner product, ties going to
    /// the earlier position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .data
            .par_chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, vector)| (dot(query, vector), position))
            .collect();

        let by_rank = |a: &(f32, usize), b: &(f32, usize)| -> Ordering {
            b.0.total_cmp(&a.0).then(a.1.cmp(&b.1))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_rank);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_rank);

        Ok(scored
            .into_iter()
            .map(|(score, position)| Neighbor {
                score,
                position: Some(position),
            })
            .collect())
    }

    /// Serializes the index (see module docs for the layout).
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.len() as u64;
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4 + DIGEST_LEN);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let digest = blake3::hash(&bytes);
        bytes.extend_from_slice(digest.as_bytes());
        bytes
    }

    /// Hex blake3 digest of the serialized index, used to pair it with its
    /// metadata in the manifest.
    pub fn content_digest(&self) -> String {
        blake3::hash(&self.to_bytes()).to_hex().to_string()
    }

    /// Parses bytes produced by [`FlatIndex::to_bytes`]. `path` only labels errors.
    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN + DIGEST_LEN {
            return Err(RagError::corrupt_index(
                path,
                format!("truncated: {} bytes", bytes.len()),
            ));
        }
        if &bytes[..8] != MAGIC {
            return Err(RagError::corrupt_index(path, "bad magic"));
        }

        let (body, digest) = bytes.split_at(bytes.len() - DIGEST_LEN);
        if blake3::hash(body).as_bytes() != digest {
            return Err(RagError::corrupt_index(path, "checksum mismatch"));
        }

        let mut dim_bytes = [0u8; 4];
        dim_bytes.copy_from_slice(&body[8..12]);
        let dimension = u32::from_le_bytes(dim_bytes) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&body[12..20]);
        let count = u64::from_le_bytes(count_bytes);

        if dimension == 0 && count > 0 {
            return Err(RagError::corrupt_index(
                path,
                format!("{} vectors with dimension 0", count),
            ));
        }

        let expected = usize::try_from(count)
            .ok()
            .and_then(|c| c.checked_mul(dimension))
            .and_then(|n| n.checked_mul(4));
        let payload = &body[HEADER_LEN..];
        if expected != Some(payload.len()) {
            return Err(RagError::corrupt_index(
                path,
                format!(
                    "{} vectors of dimension {} do not fit {} payload bytes",
                    count,
                    dimension,
                    payload.len()
                ),
            ));
        }

        let data = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { dimension, data })
    }

    /// Writes the index to `path` atomically.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes())?;
        debug!(
            "persisted {} vectors (dim={}) to {}",
            self.len(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    /// Loads an index from `path`; any unreadable or inconsistent file is
    /// reported as [`RagError::CorruptIndex`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| RagError::corrupt_index(path, format!("cannot open: {}", err)))?;
        let len = file
            .metadata()
            .map_err(|err| RagError::corrupt_index(path, format!("cannot stat: {}", err)))?
            .len();
        if len < (HEADER_LEN + DIGEST_LEN) as u64 {
            return Err(RagError::corrupt_index(path, format!("truncated: {} bytes", len)));
        }

        // SAFETY: the map is read-only and dropped before returning; the
        // index file is only ever replaced by rename, never modified in place.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|err| RagError::corrupt_index(path, format!("cannot map: {}", err)))?;
        let index = Self::from_bytes(&map, path)?;
        debug!(
            "loaded {} vectors (dim={}) from {}",
            index.len(),
            index.dimension,
            path.display()
        );
        Ok(index)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
