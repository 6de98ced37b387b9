// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for policy-rag
//!
//! Loads configuration from .policyragrc.toml in the working directory or
//! ~/.config/policy-rag/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::chunker::{ChunkConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::embedding::DEFAULT_EMBEDDING_DIM;
use crate::errors::Result;

/// Name of the per-directory configuration file.
pub const CONFIG_FILE: &str = ".policyragrc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    /// External command speaking JSON over stdin/stdout
    Command,
    /// Model-free feature hashing
    Hashing,
}

/// Chunking configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Characters per chunk
    pub chunk_size: Option<usize>,
    /// Characters shared by consecutive chunks
    pub overlap: Option<usize>,
}

impl ChunkingConfig {
    /// Get chunk size (defaults to 900)
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    /// Get overlap (defaults to 180)
    pub fn overlap(&self) -> usize {
        self.overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP)
    }

    /// Validated chunker settings, with optional overrides applied
    pub fn chunk_config(&self, size: Option<usize>, overlap: Option<usize>) -> Result<ChunkConfig> {
        ChunkConfig::new(
            size.unwrap_or_else(|| self.chunk_size()),
            overlap.unwrap_or_else(|| self.overlap()),
        )
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hashing)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per embedding request
    pub batch_size: Option<usize>,
    /// Characters kept per text before embedding (builtin provider)
    pub max_chars: Option<usize>,
    /// Vector dimension (hashing provider)
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "all-minilm-l6-v2")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("all-minilm-l6-v2")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 64)
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(64)
    }

    /// Get max chars (defaults to 2000)
    pub fn max_chars(&self) -> usize {
        self.max_chars.unwrap_or(2000)
    }

    /// Get hashing dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(DEFAULT_EMBEDDING_DIM)
    }
}

/// Indexing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory holding the policy documents
    pub docs_dir: Option<PathBuf>,
    /// Directory receiving the index, metadata and manifest
    pub out_dir: Option<PathBuf>,
    /// File extensions treated as documents
    pub extensions: Vec<String>,
    /// Descend into subdirectories of docs_dir
    pub recursive: Option<bool>,
}

impl IndexConfig {
    /// Get docs dir (defaults to "docs")
    pub fn docs_dir(&self) -> PathBuf {
        self.docs_dir.clone().unwrap_or_else(|| PathBuf::from("docs"))
    }

    /// Get output dir (defaults to "dat/out")
    pub fn out_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("dat").join("out"))
    }

    /// Get document extensions (defaults to ["md"])
    pub fn extensions(&self) -> Vec<String> {
        if self.extensions.is_empty() {
            vec!["md".to_string()]
        } else {
            self.extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect()
        }
    }

    /// Get recursive (defaults to false)
    pub fn recursive(&self) -> bool {
        self.recursive.unwrap_or(false)
    }
}

/// Search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of hits to return
    pub k: Option<usize>,
}

impl SearchConfig {
    /// Get k (defaults to 5)
    pub fn k(&self) -> usize {
        self.k.unwrap_or(5)
    }
}

/// Configuration loaded from .policyragrc.toml or ~/.config/policy-rag/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Embedding configuration
    pub embeddings: EmbeddingConfig,

    /// Index configuration
    pub index: IndexConfig,

    /// Search configuration
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration relative to the current directory
    ///
    /// Precedence (highest to lowest):
    /// 1. .policyragrc.toml in current directory
    /// 2. ~/.config/policy-rag/config.toml
    pub fn load() -> Self {
        Self::load_in(Path::new("."))
    }

    /// Same as [`Config::load`] with `dir` standing in for the current directory
    pub fn load_in(dir: &Path) -> Self {
        if let Some(config) = Self::load_from_path(&dir.join(CONFIG_FILE)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("policy-rag").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Parse a config file; unreadable or invalid files yield None
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the index configuration
    pub fn index(&self) -> &IndexConfig {
        &self.index
    }

    /// Merge CLI k with config (CLI wins)
    pub fn merge_k(&self, cli_value: Option<usize>) -> usize {
        cli_value.unwrap_or_else(|| self.search.k())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size(), 900);
        assert_eq!(config.chunking.overlap(), 180);
        assert_eq!(config.index().docs_dir(), PathBuf::from("docs"));
        assert_eq!(config.index().out_dir(), PathBuf::from("dat/out"));
        assert_eq!(config.index().extensions(), vec!["md".to_string()]);
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.merge_k(None), 5);
        assert_eq!(config.merge_k(Some(6)), 6);
    }

    #[test]
    fn parses_sections() {
        let config: Config = toml::from_str(
            r#"
[chunking]
chunk_size = 120
overlap = 20

[embeddings]
provider = "hashing"
dimension = 64

[index]
docs_dir = "policies"
extensions = [".MD", "txt"]
recursive = true

[search]
k = 6
"#,
        )
        .unwrap();

        assert_eq!(config.chunking.chunk_size(), 120);
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Hashing);
        assert_eq!(config.embeddings().dimension(), 64);
        assert_eq!(config.index().docs_dir(), PathBuf::from("policies"));
        assert_eq!(
            config.index().extensions(),
            vec!["md".to_string(), "txt".to_string()]
        );
        assert!(config.index().recursive());
        assert_eq!(config.merge_k(None), 6);
    }

    #[test]
    fn chunk_config_overrides_and_validation() {
        let config = Config::default();
        let chunk = config.chunking.chunk_config(Some(1000), None).unwrap();
        assert_eq!(chunk.chunk_size, 1000);
        assert_eq!(chunk.overlap, 180);

        // Default overlap no longer fits a smaller window.
        assert!(config.chunking.chunk_config(Some(100), None).is_err());
        assert!(config.chunking.chunk_config(Some(100), Some(100)).is_err());
    }

    #[test]
    fn load_in_reads_local_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[embeddings]\nprovider = \"command\"\ncommand = \"./embed.sh\"\n",
        )
        .unwrap();

        let config = Config::load_in(dir.path());
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Command);
        assert_eq!(config.embeddings().command(), "./embed.sh");
    }

    #[test]
    fn invalid_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[chunking\nchunk_size = ").unwrap();
        assert!(Config::load_from_path(&path).is_none());
    }
}
