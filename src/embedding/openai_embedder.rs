//! OpenAI-compatible HTTP embedder.
//!
//! Talks to any server exposing the OpenAI `POST /embeddings` contract: the
//! OpenAI API itself, Mistral, and self-hosted gateways such as Ollama or
//! LocalAI. Requires the `embeddings-openai` feature.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::embedding::embedder::Embedder;
use crate::error::{QuiverError, Result};
use crate::vector::similarity::normalize;

/// Base URL of the OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used by [`OpenAiEmbedder::from_env`].
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";

/// Environment variable read by [`OpenAiEmbedder::from_env`].
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Embedder backed by an OpenAI-compatible embeddings endpoint.
///
/// Returned vectors are normalized to unit length, so cosine scores are not
/// affected by providers that return unnormalized embeddings.
///
/// # Examples
///
/// ```no_run
/// use quiver::embedding::openai_embedder::OpenAiEmbedder;
///
/// // Mistral exposes the same contract under its own base URL.
/// let embedder = OpenAiEmbedder::new("api-key", "mistral-embed")
///     .with_base_url("https://api.mistral.ai/v1");
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    normalize: bool,
}

impl OpenAiEmbedder {
    /// Create an embedder for the OpenAI API.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            normalize: true,
        }
    }

    /// Create an embedder using `OPENAI_API_KEY` and `text-embedding-3-small`.
    ///
    /// A missing variable is not an error here; the first `embed` call fails
    /// with an embedding provider error instead.
    pub fn from_env() -> Self {
        let api_key = std::env::var(OPENAI_API_KEY_ENV).unwrap_or_default();
        Self::new(api_key, DEFAULT_OPENAI_MODEL)
    }

    /// Point the embedder at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Keep provider vectors as returned instead of normalizing them.
    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() && self.base_url == OPENAI_BASE_URL {
            return Err(QuiverError::embedding_provider(format!(
                "no API key for {}; set {OPENAI_API_KEY_ENV}",
                self.base_url
            )));
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let http_response = builder.send().await.map_err(|e| {
            QuiverError::embedding_provider(format!("embedding request failed: {e}"))
        })?;

        let status = http_response.status();
        let response_text = http_response.text().await.map_err(|e| {
            QuiverError::embedding_provider(format!("failed to read response body: {e}"))
        })?;

        if !status.is_success() {
            return Err(QuiverError::embedding_provider(format!(
                "embedding API error (status {status}): {response_text}"
            )));
        }

        let response: EmbeddingResponse = serde_json::from_str(&response_text).map_err(|e| {
            QuiverError::embedding_provider(format!("failed to parse embedding response: {e}"))
        })?;

        let mut embedding = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| QuiverError::embedding_provider("no embedding in response"))?
            .embedding;

        if self.normalize {
            normalize(&mut embedding);
        }
        Ok(embedding)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
