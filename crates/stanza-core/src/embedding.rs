//! The embedding provider seam: text in, fixed-length vector out.
//!
//! Concrete backends (see [crate::ollama]) are constructed by the caller and injected
//! into the ranker and catalog, so tests can swap in a deterministic fake.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier (e.g. `nomic-embed-text`).
    fn model_name(&self) -> &str;

    /// Embed a single string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several strings; one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Memoises embeddings per exact input text. Failed calls are not cached.
pub struct CachedProvider<P> {
    inner: P,
    cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl<P: EmbeddingProvider> CachedProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached texts.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedProvider<P> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if let Some(hit) = self.cache.lock().await.get(text) {
            tracing::trace!("embedding cache hit");
            return Ok(hit.clone());
        }
        let embedding = self.inner.embed(text).await?;
        self.cache
            .lock()
            .await
            .insert(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let missing: Vec<String> = {
            let cache = self.cache.lock().await;
            texts
                .iter()
                .filter(|t| !cache.contains_key(t.as_str()))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            let fresh = self.inner.embed_batch(&missing).await?;
            if fresh.len() != missing.len() {
                return Err(ProviderError::BatchMismatch {
                    sent: missing.len(),
                    received: fresh.len(),
                });
            }
            let mut cache = self.cache.lock().await;
            for (text, embedding) in missing.into_iter().zip(fresh) {
                cache.insert(text, embedding);
            }
        }
        let cache = self.cache.lock().await;
        texts
            .iter()
            .map(|t| cache.get(t.as_str()).cloned().ok_or(ProviderError::EmptyEmbedding))
            .collect()
    }
}

/// Runs a provider call under a deadline.
pub(crate) async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ProviderError::Timeout(limit))?
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("embedding request failed: {0}")]
    Request(String),
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider returned an empty embedding")]
    EmptyEmbedding,
    #[error("provider returned {received} embeddings for {sent} inputs")]
    BatchMismatch { sent: usize, received: usize },
}
