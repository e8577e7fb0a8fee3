//! Configuration for the retrieval engine.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Default on-disk location for the registry and the vector index snapshot.
pub const DEFAULT_STORAGE_PATH: &str = "luminary_storage";

/// Default language model used by the generation capability.
pub const DEFAULT_LLM_MODEL: &str = "gemma-3-12b-it";

/// Configuration parameters for the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Root directory for durable state.
    pub storage_path: PathBuf,
    /// Maximum chunk size in characters for paragraph-aware chunking.
    pub chunk_size: usize,
    /// Overlap budget in characters; converted to a word count when chunking.
    pub chunk_overlap: usize,
    /// Default number of chunks returned by `search`.
    pub search_top_k: usize,
    /// Default number of documents returned by grouped search.
    pub grouped_top_k: usize,
    /// Number of document-scoped chunks used as question-answering context.
    pub answer_top_k: usize,
    /// Characters of each document sent to the model when comparing.
    pub compare_prefix_chars: usize,
    /// Dimensionality of the offline hashing embedder.
    pub embedding_dimensions: usize,
    /// Name of the language model used for generation.
    pub llm_model: String,
    /// Sampling temperature for standard generation calls.
    pub temperature: f32,
    /// Output token limit for standard generation calls.
    pub max_output_tokens: u32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            chunk_size: 500,
            chunk_overlap: 100,
            search_top_k: 5,
            grouped_top_k: 10,
            answer_top_k: 3,
            compare_prefix_chars: 2000,
            embedding_dimensions: 384,
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from the process environment.
    ///
    /// Unset variables keep their defaults. Recognised variables:
    /// `LUMINARY_STORAGE_PATH`, `LUMINARY_CHUNK_SIZE`, `LUMINARY_CHUNK_OVERLAP`,
    /// `LUMINARY_SEARCH_TOP_K`, `LUMINARY_GROUPED_TOP_K`, `LUMINARY_ANSWER_TOP_K`,
    /// `LUMINARY_COMPARE_PREFIX`, `LUMINARY_EMBEDDING_DIMENSIONS`, `LLM_MODEL`,
    /// `TEMPERATURE` and `MAX_TOKENS`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if a variable is set but cannot be parsed,
    /// or if the resulting configuration fails validation.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(path) = env_value::<PathBuf>("LUMINARY_STORAGE_PATH")? {
            builder = builder.storage_path(path);
        }
        if let Some(size) = env_value("LUMINARY_CHUNK_SIZE")? {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = env_value("LUMINARY_CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(overlap);
        }
        if let Some(k) = env_value("LUMINARY_SEARCH_TOP_K")? {
            builder = builder.search_top_k(k);
        }
        if let Some(k) = env_value("LUMINARY_GROUPED_TOP_K")? {
            builder = builder.grouped_top_k(k);
        }
        if let Some(k) = env_value("LUMINARY_ANSWER_TOP_K")? {
            builder = builder.answer_top_k(k);
        }
        if let Some(prefix) = env_value("LUMINARY_COMPARE_PREFIX")? {
            builder = builder.compare_prefix_chars(prefix);
        }
        if let Some(dims) = env_value("LUMINARY_EMBEDDING_DIMENSIONS")? {
            builder = builder.embedding_dimensions(dims);
        }
        if let Some(model) = env_value::<String>("LLM_MODEL")? {
            builder = builder.llm_model(model);
        }
        if let Some(temperature) = env_value("TEMPERATURE")? {
            builder = builder.temperature(temperature);
        }
        if let Some(tokens) = env_value("MAX_TOKENS")? {
            builder = builder.max_output_tokens(tokens);
        }
        builder.build()
    }

    /// Directory holding raw document bodies and the registry index.
    pub fn registry_path(&self) -> PathBuf {
        self.storage_path.join("registry")
    }

    /// File holding the persisted vector index snapshot.
    pub fn index_path(&self) -> PathBuf {
        self.storage_path.join("vectors.json")
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::Config(format!("{key}={raw:?} is not valid: {e}"))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(RagError::Config(format!("{key} could not be read: {e}"))),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the root directory for durable state.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap budget in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the default number of chunks returned by `search`.
    pub fn search_top_k(mut self, k: usize) -> Self {
        self.config.search_top_k = k;
        self
    }

    /// Set the default number of documents returned by grouped search.
    pub fn grouped_top_k(mut self, k: usize) -> Self {
        self.config.grouped_top_k = k;
        self
    }

    /// Set the number of chunks used as question-answering context.
    pub fn answer_top_k(mut self, k: usize) -> Self {
        self.config.answer_top_k = k;
        self
    }

    /// Set the per-document prefix length used when comparing documents.
    pub fn compare_prefix_chars(mut self, chars: usize) -> Self {
        self.config.compare_prefix_chars = chars;
        self
    }

    /// Set the dimensionality of the offline hashing embedder.
    pub fn embedding_dimensions(mut self, dims: usize) -> Self {
        self.config.embedding_dimensions = dims;
        self
    }

    /// Set the language model name.
    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    /// Set the sampling temperature for standard generation calls.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the output token limit for standard generation calls.
    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.config.max_output_tokens = tokens;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - any of the top-k values is zero
    /// - `compare_prefix_chars == 0` or `embedding_dimensions == 0`
    /// - `temperature` is outside `0.0..=2.0`
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be greater than zero".to_string()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        for (name, value) in [
            ("search_top_k", c.search_top_k),
            ("grouped_top_k", c.grouped_top_k),
            ("answer_top_k", c.answer_top_k),
        ] {
            if value == 0 {
                return Err(RagError::Config(format!("{name} must be greater than zero")));
            }
        }
        if c.compare_prefix_chars == 0 {
            return Err(RagError::Config(
                "compare_prefix_chars must be greater than zero".to_string(),
            ));
        }
        if c.embedding_dimensions == 0 {
            return Err(RagError::Config(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&c.temperature) {
            return Err(RagError::Config(format!(
                "temperature ({}) must be within 0.0..=2.0",
                c.temperature
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RagConfig::builder().build().unwrap();
        assert_eq!(config, RagConfig::default());
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.answer_top_k, 3);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::Config(msg) if msg.contains("chunk_overlap")));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let err = RagConfig::builder().grouped_top_k(0).build().unwrap_err();
        assert!(matches!(err, RagError::Config(msg) if msg.contains("grouped_top_k")));
    }

    #[test]
    fn storage_layout_is_rooted_at_storage_path() {
        let config = RagConfig::builder().storage_path("/tmp/lum").build().unwrap();
        assert_eq!(config.registry_path(), PathBuf::from("/tmp/lum/registry"));
        assert_eq!(config.index_path(), PathBuf::from("/tmp/lum/vectors.json"));
    }
}
