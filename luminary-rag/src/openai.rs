//! Embeddings over the OpenAI REST API, or any server that speaks the same
//! `/embeddings` protocol.
//!
//! Requires the `openai` feature.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
/// Native width of `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Blocking [`EmbeddingProvider`] for OpenAI-compatible embedding endpoints.
///
/// Wrap it in a [`ManagedEmbedder`](crate::ManagedEmbedder) so the HTTP
/// client is only built when the first document is embedded.
///
/// ```rust,ignore
/// use luminary_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(384);
/// let vector = provider.embed("termination for convenience")?;
/// assert_eq!(vector.len(), 384);
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` so the server shortens the vectors itself.
    truncate_to: Option<usize>,
}

impl std::fmt::Debug for OpenAIEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIEmbeddingProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OpenAIEmbeddingProvider {
    /// Build a provider for the public OpenAI endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Embedding`] if `api_key` is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(embedding_error("API key must not be empty"));
        }
        Ok(Self {
            client: reqwest::blocking::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            truncate_to: None,
        })
    }

    /// Build a provider from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL`
    /// when it is set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| embedding_error("OPENAI_API_KEY is not set"))?;
        let provider = Self::new(api_key)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => provider.with_base_url(url),
            _ => provider,
        })
    }

    /// Use another embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Ask the server for `dims`-component vectors.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.truncate_to = Some(dims);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

fn embedding_error(message: impl Into<String>) -> RagError {
    RagError::Embedding { provider: PROVIDER.to_string(), message: message.into() }
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingsReply {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiFailure {
    error: ApiFailureDetail,
}

#[derive(Deserialize)]
struct ApiFailureDetail {
    message: String,
}

impl EmbeddingsReply {
    /// Vectors in the order the inputs were sent.
    ///
    /// The API may answer out of order, so items are placed by `index`.
    fn into_vectors(self, expected: usize) -> Result<Vec<Vec<f32>>> {
        let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
        for item in self.data {
            let slot = slots
                .get_mut(item.index)
                .ok_or_else(|| embedding_error(format!("reply index {} out of range", item.index)))?;
            *slot = Some(item.embedding);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or_else(|| embedding_error(format!("reply is missing input {i}"))))
            .collect()
    }
}

/// Turn a non-success reply body into a readable message.
fn failure_message(body: String) -> String {
    serde_json::from_str::<ApiFailure>(&body).map(|f| f.error.message).unwrap_or(body)
}

impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, model = %self.model, batch_size = texts.len(), "embedding batch");

        let body = EmbeddingsBody { model: &self.model, input: texts, dimensions: self.truncate_to };
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "embedding request failed");
                embedding_error(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = failure_message(response.text().unwrap_or_default());
            error!(provider = PROVIDER, %status, "embedding API rejected the request");
            return Err(embedding_error(format!("API returned {status}: {message}")));
        }

        let reply: EmbeddingsReply = response
            .json()
            .map_err(|e| embedding_error(format!("unreadable reply: {e}")))?;
        reply.into_vectors(texts.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(OpenAIEmbeddingProvider::new("  "), Err(RagError::Embedding { .. })));
    }

    #[test]
    fn truncation_is_requested_and_reported() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_dimensions(256);
        assert_eq!(provider.dimensions(), 256);

        let inputs = ["a", "b"];
        let body = EmbeddingsBody { model: &provider.model, input: &inputs, dimensions: provider.truncate_to };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["dimensions"], 256);
        assert_eq!(json["input"][1], "b");
    }

    #[test]
    fn base_url_is_normalised() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_base_url("http://localhost:8080/v1/");
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/embeddings");
    }

    #[test]
    fn reply_is_placed_by_index() {
        let raw = r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#;
        let reply: EmbeddingsReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.into_vectors(2).unwrap(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn short_reply_is_an_error() {
        let raw = r#"{"data":[{"index":0,"embedding":[1.0]}]}"#;
        let reply: EmbeddingsReply = serde_json::from_str(raw).unwrap();
        assert!(reply.into_vectors(2).is_err());
    }

    #[test]
    fn failure_message_prefers_the_api_message() {
        assert_eq!(failure_message(r#"{"error":{"message":"bad key"}}"#.to_string()), "bad key");
        assert_eq!(failure_message("gateway timeout".to_string()), "gateway timeout");
    }
}
