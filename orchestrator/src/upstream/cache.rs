use super::EmbeddingProvider;
use crate::error::ProviderError;
use crate::models::EmbeddingVector;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Key/value store for previously computed embeddings.
#[async_trait]
pub trait EmbeddingCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<f32>>>;

    async fn put(&self, key: &str, vector: &[f32], ttl: Duration) -> Result<()>;
}

/// Serves repeated sub-query texts from a cache before calling the wrapped provider.
///
/// Cache faults are logged and bypassed.
pub struct CachedEmbeddingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn EmbeddingCache>,
    ttl: Duration,
}

impl CachedEmbeddingProvider {
    pub fn new(
        inner: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn EmbeddingCache>,
        ttl: Duration,
    ) -> Self {
        Self { inner, cache, ttl }
    }

    fn key(&self, text: &str) -> String {
        format!("cascade:embedding:{}:{}", self.inner.dimension(), text)
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        let key = self.key(text);

        match self.cache.get(&key).await {
            // A cached vector of the wrong width is stale; recompute it.
            Ok(Some(cached)) if cached.len() == self.inner.dimension() => {
                return Ok(EmbeddingVector::new(cached));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "embedding cache read failed"),
        }

        let vector = self.inner.embed(text).await?;

        if let Err(e) = self.cache.put(&key, vector.as_slice(), self.ttl).await {
            warn!(error = %e, "embedding cache write failed");
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
