//! Embedding provider trait and the explicit model lifecycle wrapper.

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{RagError, Result};

/// A provider that turns text into fixed-dimension vectors.
///
/// Calls are blocking. A batch either succeeds as a whole or fails with
/// [`RagError::Embedding`]; partial results are never returned. Output must be
/// deterministic for a fixed model version.
///
/// # Example
///
/// ```rust
/// use luminary_rag::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// let provider = HashingEmbeddingProvider::new(64);
/// let vectors = provider.embed_batch(&["notice period", "termination"]).unwrap();
/// assert_eq!(vectors.len(), 2);
/// assert_eq!(vectors[0].len(), provider.dimensions());
/// ```
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Generate an embedding for a single input.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: self.model_name().to_string(),
            message: "provider returned no embedding".to_string(),
        })
    }

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;

    /// Name of the underlying model, used in errors and logs.
    fn model_name(&self) -> &str;
}

/// Check that a provider honoured the batch contract: one vector per input,
/// each of the advertised dimension.
pub(crate) fn validate_batch(
    provider: &dyn EmbeddingProvider,
    inputs: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != inputs {
        return Err(RagError::Embedding {
            provider: provider.model_name().to_string(),
            message: format!("expected {inputs} embeddings, got {}", vectors.len()),
        });
    }
    let expected = provider.dimensions();
    if let Some(bad) = vectors.iter().position(|v| v.len() != expected) {
        return Err(RagError::Embedding {
            provider: provider.model_name().to_string(),
            message: format!(
                "embedding {bad} has dimension {}, expected {expected}",
                vectors[bad].len()
            ),
        });
    }
    if let Some(bad) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
        return Err(RagError::Embedding {
            provider: provider.model_name().to_string(),
            message: format!("embedding {bad} has a non-finite component"),
        });
    }
    Ok(())
}

type Loader = dyn Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync;

/// Owns the lifecycle of an expensive embedding model.
///
/// The model is loaded at most once (explicitly via [`load`](Self::load) or
/// lazily on first use), reused for every call, and can be released with
/// [`unload`](Self::unload). Construct one at startup and share it by `Arc`.
pub struct ManagedEmbedder {
    name: String,
    dimensions: usize,
    loader: Box<Loader>,
    model: RwLock<Option<Arc<dyn EmbeddingProvider>>>,
}

impl fmt::Debug for ManagedEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedEmbedder")
            .field("name", &self.name)
            .field("dimensions", &self.dimensions)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ManagedEmbedder {
    /// Create an unloaded embedder.
    ///
    /// `dimensions` must match what the loaded model produces; it is reported
    /// without loading the model.
    pub fn new<F>(name: impl Into<String>, dimensions: usize, loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
    {
        Self { name: name.into(), dimensions, loader: Box::new(loader), model: RwLock::new(None) }
    }

    /// Load the model if it is not loaded yet and return it.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error, or [`RagError::Embedding`] if the loaded
    /// model reports a different dimensionality than declared.
    pub fn load(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        if let Some(model) = self.model.read().map_err(|e| self.poisoned(e))?.as_ref() {
            return Ok(Arc::clone(model));
        }

        let mut slot = self.model.write().map_err(|e| self.poisoned(e))?;
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        info!(model = %self.name, "loading embedding model");
        let model = (self.loader)()?;
        if model.dimensions() != self.dimensions {
            return Err(RagError::Embedding {
                provider: self.name.clone(),
                message: format!(
                    "loaded model has dimension {}, declared {}",
                    model.dimensions(),
                    self.dimensions
                ),
            });
        }
        *slot = Some(Arc::clone(&model));
        info!(model = %self.name, dimensions = self.dimensions, "embedding model loaded");
        Ok(model)
    }

    /// Drop the loaded model. The next call loads it again.
    pub fn unload(&self) {
        if let Ok(mut slot) = self.model.write() {
            if slot.take().is_some() {
                debug!(model = %self.name, "embedding model unloaded");
            }
        }
    }

    /// Whether the model is currently loaded.
    pub fn is_loaded(&self) -> bool {
        self.model.read().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn poisoned<T>(&self, e: std::sync::PoisonError<T>) -> RagError {
        RagError::Embedding { provider: self.name.clone(), message: format!("model lock poisoned: {e}") }
    }
}

impl EmbeddingProvider for ManagedEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.load()?.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::hashing::HashingEmbeddingProvider;

    fn counting_embedder(loads: Arc<AtomicUsize>, dims: usize) -> ManagedEmbedder {
        ManagedEmbedder::new("hashing", 32, move || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(HashingEmbeddingProvider::new(dims)) as Arc<dyn EmbeddingProvider>)
        })
    }

    #[test]
    fn loads_once_and_reuses() {
        let loads = Arc::new(AtomicUsize::new(0));
        let embedder = counting_embedder(Arc::clone(&loads), 32);
        assert!(!embedder.is_loaded());

        embedder.embed("first").unwrap();
        embedder.embed_batch(&["second", "third"]).unwrap();
        assert!(embedder.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unload_forces_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let embedder = counting_embedder(Arc::clone(&loads), 32);
        embedder.load().unwrap();
        embedder.unload();
        assert!(!embedder.is_loaded());
        embedder.embed("again").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dimension_mismatch_fails_load() {
        let embedder = counting_embedder(Arc::new(AtomicUsize::new(0)), 16);
        let err = embedder.load().err().expect("load should fail");
        assert!(matches!(err, RagError::Embedding { message, .. } if message.contains("dimension")));
        assert!(!embedder.is_loaded());
    }

    #[test]
    fn validate_batch_rejects_short_batches() {
        let provider = HashingEmbeddingProvider::new(8);
        let err = validate_batch(&provider, 2, &[vec![0.0; 8]]).unwrap_err();
        assert!(matches!(err, RagError::Embedding { .. }));
        assert!(validate_batch(&provider, 1, &[vec![0.0; 8]]).is_ok());
        assert!(validate_batch(&provider, 1, &[vec![0.0; 7]]).is_err());
    }

    #[test]
    fn validate_batch_rejects_non_finite_components() {
        let provider = HashingEmbeddingProvider::new(2);
        let err = validate_batch(&provider, 1, &[vec![f32::NAN, 0.0]]).unwrap_err();
        assert!(matches!(err, RagError::Embedding { message, .. } if message.contains("non-finite")));
        assert!(validate_batch(&provider, 1, &[vec![0.0, f32::INFINITY]]).is_err());
    }
}
