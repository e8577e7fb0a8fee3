//! Gemini text generator using the `generateContent` REST endpoint.
//!
//! This module is only available when the `gemini` feature is enabled.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::DEFAULT_LLM_MODEL;
use crate::error::{RagError, Result};
use crate::generation::{GenerationParams, TextGenerator};

const PROVIDER: &str = "Gemini";

/// The default Generative Language API base URL.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A [`TextGenerator`] backed by the Gemini API.
///
/// # Configuration
///
/// - `model` – defaults to [`DEFAULT_LLM_MODEL`].
/// - `api_key` – from the constructor or the `GOOGLE_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use luminary_rag::gemini::GeminiGenerator;
/// use luminary_rag::{GenerationParams, TextGenerator};
///
/// let generator = GeminiGenerator::from_env()?.with_model("gemini-2.0-flash");
/// let text = generator.generate("Summarise clause 4.", &GenerationParams::fast())?;
/// ```
pub struct GeminiGenerator {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiGenerator {
    /// Create a generator with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(generation_error("API key must not be empty"));
        }

        Ok(Self {
            client: reqwest::blocking::Client::new(),
            api_key,
            model: DEFAULT_LLM_MODEL.into(),
            base_url: GEMINI_BASE_URL.into(),
        })
    }

    /// Create a generator using the `GOOGLE_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| generation_error("GOOGLE_API_KEY environment variable not set"))?;
        Self::new(api_key)
    }

    /// Set the model name (e.g. `gemini-2.0-flash`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API root, such as a local proxy.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

fn generation_error(message: impl Into<String>) -> RagError {
    RagError::Generation { provider: PROVIDER.into(), message: message.into() }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            max_output_tokens: params.max_output_tokens,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

// ── TextGenerator implementation ───────────────────────────────────

impl TextGenerator for GeminiGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            max_output_tokens = params.max_output_tokens,
            "generating content"
        );

        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts: vec![RequestPart { text: prompt }] }],
            generation_config: params.into(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                generation_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(generation_error(format!("API returned {status}: {detail}")));
        }

        let parsed: GenerateResponse = response.json().map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            generation_error(format!("failed to parse response: {e}"))
        })?;

        parsed.into_text().ok_or_else(|| generation_error("response contained no text"))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
