// Cascade orchestrator: fans a query out across themes and joins the results in theme order

use super::aggregator;
use super::planner;
use super::retriever::{RawOutcome, RawThemeResult, ThemeRetriever};
use super::CascadeConfig;
use crate::error::{CascadeError, ConfigError};
use crate::metrics;
use crate::models::{CascadeResponse, Query};
use crate::rate_limiter::RateLimiter;
use crate::upstream::{EmbeddingProvider, VectorIndex};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const WIDTH_CHECK_TEXT: &str = "embedding width check";

pub struct Orchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    limiter: Arc<RateLimiter>,
}

impl Orchestrator {
    /// Wire the collaborators together, refusing a provider and index that
    /// disagree on vector dimension.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        if embedder.dimension() != index.dimension() {
            return Err(ConfigError::DimensionMismatch {
                provider: embedder.dimension(),
                index: index.dimension(),
            });
        }
        Ok(Self {
            embedder,
            index,
            limiter,
        })
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Embed a fixed text once and compare the provider's actual output width with
    /// the index dimension.
    ///
    /// Declared dimensions can agree while a remote provider serves another width,
    /// so startup calls this before accepting traffic. An unreachable provider is
    /// only logged; the per-request check still applies once it comes up.
    pub async fn verify_embedding_width(&self) -> Result<(), ConfigError> {
        let index = self.index.dimension();
        match self.embedder.embed(WIDTH_CHECK_TEXT).await {
            Ok(vector) if vector.dimension() != index => Err(ConfigError::DimensionMismatch {
                provider: vector.dimension(),
                index,
            }),
            Ok(_) => {
                info!(dimension = index, "embedding width verified");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not verify embedding width at startup");
                Ok(())
            }
        }
    }

    pub async fn cascade(
        &self,
        query: &Query,
        config: &CascadeConfig,
    ) -> Result<CascadeResponse, CascadeError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("cascade", %request_id);
        let started = Instant::now();

        let result = self.run(query, config).instrument(span).await;

        let outcome = match &result {
            Ok(response) if response.has_failures() => "partial",
            Ok(_) => "ok",
            Err(CascadeError::InvalidQuery) => "invalid_query",
            Err(CascadeError::RateLimited { .. }) => "rate_limited",
            Err(CascadeError::UpstreamUnavailable(_)) => "upstream_unavailable",
            Err(CascadeError::DimensionMismatch { .. }) => "dimension_mismatch",
        };
        metrics::record_request(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn run(
        &self,
        query: &Query,
        config: &CascadeConfig,
    ) -> Result<CascadeResponse, CascadeError> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(CascadeError::InvalidQuery);
        }

        let sub_queries = planner::plan(text, config.themes());
        let rate_limit_key = config.rate_limit_key().resolve(query);
        info!(
            themes = sub_queries.len(),
            key = %rate_limit_key,
            "starting cascade"
        );

        let retriever = ThemeRetriever {
            embedder: self.embedder.as_ref(),
            index: self.index.as_ref(),
            limiter: self.limiter.as_ref(),
            config,
            rate_limit_key: &rate_limit_key,
            scope: query.scope.as_ref(),
        };

        // One slot per theme, filled in whatever order sub-retrievals finish.
        let mut slots: Vec<Option<RawThemeResult>> = vec![None; sub_queries.len()];
        let mut timed_out = false;
        {
            let retriever = &retriever;
            // Built eagerly so no mapping closure lives in this future; it must stay `Send`.
            let tasks: Vec<_> = sub_queries
                .iter()
                .enumerate()
                .map(|(slot, sub)| async move { (slot, retriever.retrieve(sub).await) })
                .collect();
            let mut in_flight =
                futures::stream::iter(tasks).buffer_unordered(config.max_concurrent_themes());

            let deadline = tokio::time::sleep(config.request_timeout());
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    biased;
                    next = in_flight.next() => match next {
                        Some((slot, Ok(raw))) => slots[slot] = Some(raw),
                        // Dropping the stream cancels the remaining themes.
                        Some((_, Err(e))) => {
                            warn!(error = %e, "cascade aborted");
                            return Err(e);
                        }
                        None => break,
                    },
                    _ = &mut deadline => {
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        if timed_out {
            warn!(timeout = ?config.request_timeout(), "cascade timed out");
        }
        let raw: Vec<RawThemeResult> = slots
            .into_iter()
            .zip(&sub_queries)
            .map(|(slot, sub)| {
                slot.unwrap_or_else(|| RawThemeResult::aborted(sub, "request timed out"))
            })
            .collect();

        if let Some(reason) = all_failed_upstream(&raw) {
            return Err(CascadeError::UpstreamUnavailable(reason));
        }

        let response = aggregator::assemble(raw, config.top_k_per_theme());
        for result in &response.results {
            metrics::record_theme_status(result.status.label());
        }
        info!(
            hits = response.results.iter().map(|r| r.hits.len()).sum::<usize>(),
            failed = response.results.iter().filter(|r| !r.is_ok()).count(),
            "cascade complete"
        );
        Ok(response)
    }
}

/// Reason to surface when every theme failed on an upstream dependency.
fn all_failed_upstream(raw: &[RawThemeResult]) -> Option<String> {
    let mut last = None;
    for result in raw {
        match &result.outcome {
            RawOutcome::Failed(reason) => last = Some(reason.clone()),
            _ => return None,
        }
    }
    last
}
