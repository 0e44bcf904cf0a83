//! Contracts for the two scarce external capabilities the cascade drives,
//! plus HTTP, cached and in-memory implementations of them.

pub mod cache;
pub mod http;
pub mod memory;

use crate::error::{IndexError, ProviderError};
use crate::models::{EmbeddingVector, Hit, ScopeHints};
use async_trait::async_trait;

/// Turns text into a fixed-dimension vector.
///
/// Implementations are shared across concurrent requests and must be
/// reentrant. One call is one attempt; retrying is the caller's job.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError>;

    /// Dimension every returned vector is expected to have.
    fn dimension(&self) -> usize;
}

/// Nearest-neighbour search over stored vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `top_k` hits, most similar first. Scores are higher-is-better.
    async fn search(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: Option<&ScopeHints>,
    ) -> Result<Vec<Hit>, IndexError>;

    /// Dimension of the vectors the index stores.
    fn dimension(&self) -> usize;
}
