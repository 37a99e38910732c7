//! Ollama-backed embedding provider. Wraps ollama-rs behind [EmbeddingProvider].

use async_trait::async_trait;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;
use thiserror::Error;

use crate::embedding::{EmbeddingProvider, ProviderError};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
}

impl OllamaClient {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
        })
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    async fn request(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, ProviderError> {
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(res.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn model_name(&self) -> &str {
        &self.embed_model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let embedding = self
            .request(EmbeddingsInput::Single(text.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        if embedding.is_empty() {
            return Err(ProviderError::EmptyEmbedding);
        }
        Ok(embedding)
    }

    /// One request for the whole batch.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self
            .request(EmbeddingsInput::Multiple(texts.to_vec()))
            .await?;
        if embeddings.len() != texts.len() {
            return Err(ProviderError::BatchMismatch {
                sent: texts.len(),
                received: embeddings.len(),
            });
        }
        if embeddings.iter().any(Vec::is_empty) {
            return Err(ProviderError::EmptyEmbedding);
        }
        Ok(embeddings)
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
}
