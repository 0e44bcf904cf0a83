// Retriever: one theme's rate-limit check, embedding and vector search

use super::{CascadeConfig, RateLimitPolicy};
use crate::error::{CascadeError, IndexError, ProviderError};
use crate::metrics;
use crate::models::{EmbeddingVector, Hit, ScopeHints, SubQuery};
use crate::rate_limiter::RateLimiter;
use crate::upstream::{EmbeddingProvider, VectorIndex};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};

/// Bounded retry with exponential backoff for transient upstream failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, E, F, Fut>(
        &self,
        dependency: &'static str,
        is_transient: fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let delay = self.backoff(attempt);
                    warn!(dependency, attempt, error = %e, ?delay, "retrying upstream call");
                    metrics::record_retry(dependency);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Per-theme outcome before ranking and truncation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    Hits(Vec<Hit>),
    Failed(String),
    Skipped(String),
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawThemeResult {
    pub theme: String,
    pub sub_query: String,
    pub outcome: RawOutcome,
}

impl RawThemeResult {
    fn new(sub: &SubQuery, outcome: RawOutcome) -> Self {
        Self {
            theme: sub.theme.clone(),
            sub_query: sub.text.clone(),
            outcome,
        }
    }

    pub(crate) fn aborted(sub: &SubQuery, reason: impl Into<String>) -> Self {
        Self::new(sub, RawOutcome::Aborted(reason.into()))
    }
}

pub(crate) struct ThemeRetriever<'a> {
    pub embedder: &'a dyn EmbeddingProvider,
    pub index: &'a dyn VectorIndex,
    pub limiter: &'a RateLimiter,
    pub config: &'a CascadeConfig,
    pub rate_limit_key: &'a str,
    pub scope: Option<&'a ScopeHints>,
}

impl ThemeRetriever<'_> {
    /// Retrieve one theme.
    ///
    /// Upstream failures become a `Failed` slot. Only conditions that
    /// invalidate the whole request come back as `Err`.
    pub async fn retrieve(&self, sub: &SubQuery) -> Result<RawThemeResult, CascadeError> {
        let span = info_span!("theme", theme = %sub.theme);
        self.retrieve_inner(sub).instrument(span).await
    }

    async fn retrieve_inner(&self, sub: &SubQuery) -> Result<RawThemeResult, CascadeError> {
        if let Some(reason) = self.admit(&sub.theme).await? {
            return Ok(RawThemeResult::new(sub, RawOutcome::Skipped(reason)));
        }

        let retry = self.config.retry();
        let vector = match retry
            .run("embedding", ProviderError::is_transient, || {
                self.embedder.embed(&sub.text)
            })
            .await
        {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "embedding failed");
                return Ok(RawThemeResult::new(sub, RawOutcome::Failed(e.to_string())));
            }
        };
        self.check_dimension(&vector)?;

        let top_k = self.config.top_k_per_theme();
        match retry
            .run("vector_index", IndexError::is_transient, || {
                self.index.search(&vector, top_k, self.scope)
            })
            .await
        {
            Ok(hits) => {
                debug!(hits = hits.len(), "theme retrieved");
                Ok(RawThemeResult::new(sub, RawOutcome::Hits(hits)))
            }
            Err(e) => {
                warn!(error = %e, "vector search failed");
                Ok(RawThemeResult::new(sub, RawOutcome::Failed(e.to_string())))
            }
        }
    }

    /// `Ok(None)` when the theme may proceed, `Ok(Some(reason))` when it is skipped.
    async fn admit(&self, theme: &str) -> Result<Option<String>, CascadeError> {
        if self.limiter.acquire(self.rate_limit_key).allowed {
            return Ok(None);
        }
        warn!(key = self.rate_limit_key, "rate limit denied theme");

        match self.config.on_rate_limited() {
            RateLimitPolicy::Fail => Err(CascadeError::RateLimited {
                theme: theme.to_string(),
            }),
            RateLimitPolicy::Skip => Ok(Some("rate limited".to_string())),
            RateLimitPolicy::Defer => {
                tokio::time::sleep(self.limiter.refill_interval()).await;
                if self.limiter.acquire(self.rate_limit_key).allowed {
                    Ok(None)
                } else {
                    Ok(Some("rate limited after deferral".to_string()))
                }
            }
        }
    }

    fn check_dimension(&self, vector: &EmbeddingVector) -> Result<(), CascadeError> {
        let expected = self.embedder.dimension();
        if vector.dimension() != expected {
            return Err(CascadeError::DimensionMismatch {
                expected,
                actual: vector.dimension(),
            });
        }
        Ok(())
    }
}
