use super::{EmbeddingProvider, VectorIndex};
use crate::error::{IndexError, ProviderError};
use crate::models::{EmbeddingVector, Hit, ScopeHints};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Shared settings for the outbound service clients.
#[derive(Debug, Clone)]
pub struct HttpClientSettings {
    pub timeout: Duration,
    /// Client-side ceiling on calls per second; `None` disables pacing.
    pub requests_per_second: Option<u32>,
}

impl Default for HttpClientSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            requests_per_second: None,
        }
    }
}

fn build_client(settings: &HttpClientSettings) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(settings.timeout).build()
}

fn build_pacer(settings: &HttpClientSettings) -> Option<DefaultDirectRateLimiter> {
    settings
        .requests_per_second
        .and_then(NonZeroU32::new)
        .map(|rps| RateLimiter::direct(Quota::per_second(rps)))
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Client for the embedding service's `POST /embed`.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
    pacer: Option<DefaultDirectRateLimiter>,
}

impl HttpEmbeddingClient {
    pub fn new(
        base_url: impl Into<String>,
        dimension: usize,
        settings: &HttpClientSettings,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension,
            pacer: build_pacer(settings),
        })
    }
}

fn provider_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        let res = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(provider_error)?;

        let status = res.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(ProviderError::Quota(format!("embedding service returned {status}")))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Auth(format!("embedding service returned {status}")))
            }
            s if s.is_server_error() => {
                return Err(ProviderError::Network(format!("embedding service returned {status}")))
            }
            s if !s.is_success() => {
                return Err(ProviderError::InvalidResponse(format!(
                    "embedding service returned {status}"
                )))
            }
            _ => {}
        }

        let body: EmbedResponse = res.json().await.map_err(provider_error)?;
        debug!(dimension = body.embedding.len(), "embedding received");
        Ok(EmbeddingVector::new(body.embedding))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a ScopeHints>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

/// Client for the vector DB service's `POST /search`.
pub struct HttpVectorIndexClient {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
    pacer: Option<DefaultDirectRateLimiter>,
}

impl HttpVectorIndexClient {
    pub fn new(
        base_url: impl Into<String>,
        dimension: usize,
        settings: &HttpClientSettings,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension,
            pacer: build_pacer(settings),
        })
    }
}

fn index_error(err: reqwest::Error) -> IndexError {
    if err.is_decode() {
        IndexError::InvalidResponse(err.to_string())
    } else {
        IndexError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndexClient {
    async fn search(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: Option<&ScopeHints>,
    ) -> Result<Vec<Hit>, IndexError> {
        if let Some(pacer) = &self.pacer {
            pacer.until_ready().await;
        }

        let res = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&SearchRequest {
                vector: vector.as_slice(),
                top_k,
                filter,
            })
            .send()
            .await
            .map_err(index_error)?;

        let status = res.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IndexError::Unavailable(format!("vector DB returned {status}")));
        }
        if !status.is_success() {
            return Err(IndexError::Rejected(format!("vector DB returned {status}")));
        }

        let body: SearchResponse = res.json().await.map_err(index_error)?;
        debug!(hits = body.hits.len(), "vector search complete");
        Ok(body.hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
