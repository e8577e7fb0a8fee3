//! Text generation capability.
//!
//! The language model is an external capability: the engine only builds
//! prompts and hands them to a [`TextGenerator`]. Retrieval flows never fail
//! because generation failed; they report the failure as part of their
//! outcome.

use serde::{Deserialize, Serialize};

use crate::config::RagConfig;
use crate::error::{RagError, Result};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of tokens to produce.
    pub max_output_tokens: u32,
    /// Nucleus sampling cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

impl GenerationParams {
    /// Parameters for long-form answers, taken from the engine configuration.
    pub fn standard(config: &RagConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            top_p: Some(0.8),
            top_k: Some(40),
        }
    }

    /// Cheaper parameters for summaries and structured extraction.
    pub fn fast() -> Self {
        Self { temperature: 0.5, max_output_tokens: 1024, top_p: Some(0.8), top_k: Some(40) }
    }

    /// Focused parameters for question answering over retrieved excerpts.
    pub fn qa() -> Self {
        Self { temperature: 0.4, max_output_tokens: 1024, top_p: None, top_k: None }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::standard(&RagConfig::default())
    }
}

/// Turns a prompt into text.
///
/// Implementations are blocking and must be shareable across threads.
/// Failures are returned as [`RagError::Generation`](crate::RagError::Generation).
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Name of the underlying model.
    fn model_name(&self) -> &str;
}

/// A generator that always fails.
///
/// Installed when no language model is configured, so retrieval still works
/// and every generation step reports a `GenerationFailed` outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String> {
        Err(RagError::Generation {
            provider: "disabled".to_string(),
            message: "no language model is configured".to_string(),
        })
    }

    fn model_name(&self) -> &str {
        "none"
    }
}
