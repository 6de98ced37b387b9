// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text chunker for embedding generation.
//!
//! Policy documents are cleaned and split into fixed-size, overlapping
//! character windows. Windows never exceed the configured size, so every
//! chunk fits the embedding model's input limit, and the overlap keeps
//! sentences that straddle a boundary retrievable from either side.
//!
//! All positions and sizes are counted in characters, not bytes.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{RagError, Result};

/// Default number of characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 900;

/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 180;

static EXCESS_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));
static EXCESS_BLANKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]{2,}").expect("valid blank regex"));

/// Configuration for the text chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Target number of characters per chunk.
    pub chunk_size: usize,
    /// Number of characters shared by consecutive chunks.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// Creates a new ChunkConfig, rejecting windows that could not advance by
    /// at least one character per step.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Upper bound on the number of windows [`chunk_text`] visits for a text
    /// of `len` characters.
    pub fn max_steps(&self, len: usize) -> usize {
        let step = self.chunk_size.saturating_sub(self.overlap).max(1);
        len.div_ceil(step)
    }
}

/// A chunk of text with its window position in the cleaned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Start of the untrimmed window (character offset, inclusive).
    pub start: usize,
    /// End of the untrimmed window (character offset, exclusive).
    pub end: usize,
    /// Trimmed window contents.
    pub text: String,
}

/// Normalizes raw document text before chunking.
///
/// Carriage returns become newlines, runs of three or more newlines collapse
/// to a paragraph break, runs of spaces/tabs collapse to one space, and the
/// result is trimmed.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace('\r', "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    let text = EXCESS_BLANKS.replace_all(&text, " ");
    text.trim().to_string()
}

/// Returns the first markdown heading of `raw`, or `fallback`.
pub fn extract_title(raw: &str, fallback: &str) -> String {
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            let title = line.trim_start_matches('#').trim();
            if title.is_empty() {
                return fallback.to_string();
            }
            return title.to_string();
        }
    }
    fallback.to_string()
}

/// Splits `text` into overlapping windows of `chunk_size` characters.
///
/// Algorithm:
/// ```text
/// i = 0
/// while i < len:
///   j = min(len, i + chunk_size)
///   emit trim(text[i..j]) if non-empty
///   if j == len: stop
///   i = max(j - overlap, i + 1)
/// ```
///
/// The `i + 1` floor keeps the cursor moving even when `overlap >= chunk_size`.
/// The returned iterator is lazy and can be cloned to restart from the
/// current position.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Chunks<'_> {
    let mut offsets: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
    offsets.push(text.len());
    Chunks {
        text,
        offsets,
        chunk_size,
        overlap,
        cursor: 0,
        finished: false,
    }
}

/// Lazy iterator over the chunks of one document. See [`chunk_text`].
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length.
    offsets: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
    cursor: usize,
    finished: bool,
}

impl Chunks<'_> {
    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }
}

impl Iterator for Chunks<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        let len = self.char_len();
        while !self.finished && self.cursor < len {
            let start = self.cursor;
            let end = (start + self.chunk_size).min(len);

            if end >= len {
                self.finished = true;
            } else {
                self.cursor = end.saturating_sub(self.overlap).max(start + 1);
            }

            let window = &self.text[self.offsets[start]..self.offsets[end]];
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                return Some(TextChunk {
                    start,
                    end,
                    text: trimmed.to_string(),
                });
            }
        }
        None
    }
}

/// Cleans and splits whole documents with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct DocumentChunker {
    config: ChunkConfig,
}

impl DocumentChunker {
    /// Creates a new chunker with the given configuration.
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Cleans `raw` and returns its chunks in order.
    pub fn chunk_document(&self, raw: &str) -> Vec<TextChunk> {
        let cleaned = clean_text(raw);
        chunk_text(&cleaned, self.config.chunk_size, self.config.overlap).collect()
    }
}
