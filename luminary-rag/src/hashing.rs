//! Offline embedding provider based on feature hashing.
//!
//! [`HashingEmbeddingProvider`] needs no model weights and no network, which
//! makes it the default for local use and for tests. Each lowercase
//! alphanumeric token is hashed into one of `dimensions` buckets; the bucket
//! counts are L2-normalised. All components are non-negative, so cosine
//! similarity between two of its vectors lies in `[0, 1]`.

use crate::embedding::EmbeddingProvider;
use crate::error::Result;

/// Model name reported by [`HashingEmbeddingProvider`].
pub const HASHING_MODEL_NAME: &str = "feature-hashing-v1";

/// A deterministic bag-of-words embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider producing `dimensions`-long vectors.
    ///
    /// A zero dimension is bumped to one so every vector has a component.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a, stable across platforms and releases.
        let hash = token
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |acc, b| (acc ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3));
        (hash % self.dimensions as u64) as usize
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            vector[self.bucket(&token)] += 1.0;
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

/// Lowercase alphanumeric tokens of `text`.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}
