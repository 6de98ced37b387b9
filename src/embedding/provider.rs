// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! The indexer and the retriever both go through [`embed_normalized`], so
//! chunk vectors and query vectors always receive the same L2 normalization
//! and inner product equals cosine similarity.

use anyhow::{bail, Context};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::{EmbeddingConfig, EmbeddingProviderType};
use crate::errors::{RagError, Result};

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_BATCH_SIZE: usize = 64;
const MAX_BATCH_SIZE: usize = 1024;
const DEFAULT_MAX_CHARS: usize = 2000;

/// Dimension of sentence-transformers/all-MiniLM-L6-v2 vectors.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Configuration for the builtin fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
}

impl EmbeddingProviderConfig {
    /// Builds the provider config from the `[embeddings]` section, letting
    /// `FASTEMBED_*` environment variables override it.
    pub fn resolve(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = env::var("FASTEMBED_MODEL").unwrap_or_else(|_| config.model().to_string());
        let model = parse_model(&model_name)?;

        let mut batch_size = parse_usize_env("FASTEMBED_BATCH_SIZE", config.batch_size())?;
        if batch_size == 0 {
            batch_size = DEFAULT_BATCH_SIZE;
        }
        if batch_size > MAX_BATCH_SIZE {
            tracing::warn!(
                "batch size {} exceeds max {}; clamping",
                batch_size,
                MAX_BATCH_SIZE
            );
            batch_size = MAX_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FASTEMBED_MAX_CHARS", config.max_chars())?;
        if max_chars == 0 {
            max_chars = DEFAULT_MAX_CHARS;
        }

        Ok(Self {
            model,
            batch_size,
            max_chars,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Creates the provider selected by the `[embeddings]` configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => {
            let provider_config = EmbeddingProviderConfig::resolve(config)
                .map_err(|err| RagError::InvalidConfig(format!("{:#}", err)))?;
            let embedder = FastEmbedder::new(provider_config)
                .map_err(|err| RagError::EmbeddingUnavailable(format!("{:#}", err)))?;
            Box::new(embedder)
        }
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_batch_size(config.batch_size().max(1)),
        ),
        EmbeddingProviderType::Hashing => Box::new(HashingProvider::new(config.dimension())?),
    };
    debug!("embedding provider ready: {}", provider.model_id());
    Ok(provider)
}

/// Embeds `texts` and L2-normalizes every vector.
///
/// Checks that one vector comes back per input and that all vectors share a
/// dimension. Provider failures surface as [`RagError::EmbeddingUnavailable`].
pub fn embed_normalized(
    provider: &mut dyn EmbeddingProvider,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let mut vectors = provider
        .embed_texts(texts)
        .map_err(|err| RagError::EmbeddingUnavailable(format!("{:#}", err)))?;

    if vectors.len() != texts.len() {
        return Err(RagError::EmbeddingUnavailable(format!(
            "provider {} returned {} vectors for {} texts",
            provider.model_id(),
            vectors.len(),
            texts.len()
        )));
    }

    let dimension = vectors[0].len();
    if dimension == 0 {
        return Err(RagError::EmbeddingUnavailable(format!(
            "provider {} returned an empty vector",
            provider.model_id()
        )));
    }

    for (i, vector) in vectors.iter_mut().enumerate() {
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if !l2_normalize(vector) {
            return Err(RagError::EmbeddingUnavailable(format!(
                "provider {} returned a zero vector for text {}",
                provider.model_id(),
                i
            )));
        }
    }

    Ok(vectors)
}

/// Embeds a single query with the same normalization as [`embed_normalized`].
pub fn embed_query(provider: &mut dyn EmbeddingProvider, query: &str) -> Result<Vec<f32>> {
    embed_normalized(provider, &[query.to_string()])?
        .pop()
        .ok_or_else(|| RagError::EmbeddingUnavailable("No embedding returned".to_string()))
}

/// FastEmbed provider, sentence-transformers/all-MiniLM-L6-v2 by default.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> anyhow::Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and prints
/// either a JSON array of vectors or an object holding one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn run_command(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": texts,
        });

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .context("Failed to write embeddings payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to read embeddings command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_vectors(stdout.trim())
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

/// Model-free provider that hashes word tokens into a fixed number of buckets.
///
/// Deterministic and offline; texts sharing a word get a positive score.
/// Meant for tests and demos, not for relevance.
pub struct HashingProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashingProvider {
    /// Creates a new hashing provider with the specified dimension.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "hashing dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            model: format!("hashing-{}", dimension),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimension];
        let mut words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .peekable();
        if words.peek().is_some() {
            for token in words {
                vector[self.slot(&token.to_lowercase())] += 1.0;
            }
        } else {
            // Text without words still gets a vector from its symbols.
            let mut buf = [0u8; 4];
            for symbol in text.chars().filter(|c| !c.is_whitespace()) {
                vector[self.slot(symbol.encode_utf8(&mut buf))] += 1.0;
            }
        }
        vector
    }

    fn slot(&self, token: &str) -> usize {
        let digest = blake3::hash(token.as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest.as_bytes()[..8]);
        (u64::from_le_bytes(bucket) % self.dimension as u64) as usize
    }
}

impl EmbeddingProvider for HashingProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn parse_vectors(raw: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    let parsed: Value = serde_json::from_str(raw)
        .with_context(|| "Failed to parse embeddings command output as JSON")?;

    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embeddings command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embeddings command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embeddings output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<anyhow::Result<Vec<f32>>>()
        })
        .collect()
}

fn truncate_texts(texts: &[String], max_chars: usize) -> Vec<Cow<'_, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

/// Scales `vector` to unit length. Returns `false`, leaving it untouched,
/// when it has no finite non-zero length to scale.
pub fn l2_normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}

fn parse_model(name: &str) -> anyhow::Result<EmbeddingModel> {
    let value = name.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small" | "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => {
            Ok(EmbeddingModel::BGESmallENV15)
        }
        other => bail!(
            "Unsupported embedding model '{}'. Supported values: {}, bge-small-en-v1.5",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_usize_env(name: &str, default: usize) -> anyhow::Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}
