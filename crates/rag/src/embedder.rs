//! Text embedding over an Ollama-compatible HTTP API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::RagError;

/// Maps text to dense vectors of a declared dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Declared vector dimensionality.
    fn dimensions(&self) -> usize;

    /// Model name in use.
    fn model(&self) -> &str;
}

/// Embedding dimensionality of known models.
const MODEL_DIMENSIONS: &[(&str, usize)] = &[
    ("nomic-embed-text", 768),
    ("mxbai-embed-large", 1024),
    ("bge-m3", 1024),
    ("all-minilm", 384),
    ("snowflake-arctic-embed", 1024),
];

const DEFAULT_DIMENSIONS: usize = 768;
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Embedder backed by Ollama's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Build an embedder from the RAG settings.
    pub fn new(config: &config::RagConfig) -> Result<Self, RagError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagError::Embedding(format!("failed to create HTTP client: {e}")))?;

        let dimensions = MODEL_DIMENSIONS
            .iter()
            .find(|(name, _)| *name == config.embedder_model)
            .map(|(_, dims)| *dims)
            .unwrap_or(DEFAULT_DIMENSIONS);

        Ok(Self {
            client,
            base_url: config.embedder_url.trim_end_matches('/').to_string(),
            model: config.embedder_model.clone(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!("embedder error (status {status}): {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("decode response: {e}")))?;

        Ok(parsed.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        // The API has no native batch endpoint; embed sequentially so a
        // failure reports which input broke.
        let mut embeddings = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            let embedding = self
                .embed(text)
                .await
                .map_err(|e| RagError::Embedding(format!("embed text {i}: {e}")))?;
            embeddings.push(embedding);
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}
