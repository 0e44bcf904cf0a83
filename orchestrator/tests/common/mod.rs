//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use cascade_orchestrator::cascade::{CascadeConfig, RetryPolicy, Theme};
use cascade_orchestrator::error::{IndexError, ProviderError};
use cascade_orchestrator::models::{EmbeddingVector, Hit, MetadataValue, ScopeHints};
use cascade_orchestrator::upstream::memory::{HashingEmbedder, InMemoryIndex};
use cascade_orchestrator::upstream::{EmbeddingProvider, VectorIndex};
use cascade_orchestrator::{Orchestrator, RateLimiter, RateLimiterConfig};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIM: usize = 64;

pub const CORPUS: &[(&str, &str, &str)] = &[
    ("doc-flood", "river flood crisis closes the warehouse", "emea"),
    ("doc-strike", "port strike exposure for shipping contracts", "apac"),
    ("doc-growth", "opportunity to expand rail freight capacity", "emea"),
    ("doc-recall", "product recall crisis and supplier exposure", "amer"),
    ("doc-market", "new market opportunity after competitor exit", "apac"),
];

pub fn seeded_index() -> Arc<InMemoryIndex> {
    let embedder = HashingEmbedder::new(DIM);
    let index = InMemoryIndex::new(DIM);
    for (id, text, region) in CORPUS {
        let metadata = BTreeMap::from([
            ("region".to_string(), MetadataValue::from(*region)),
            ("text".to_string(), MetadataValue::from(*text)),
        ]);
        index.insert(*id, embedder.vectorize(text), metadata).unwrap();
    }
    Arc::new(index)
}

pub fn themes(names: &[&str]) -> Vec<Theme> {
    names
        .iter()
        .map(|name| {
            let lens = name.to_lowercase();
            Theme::new(*name, move |q| format!("{lens} angle on {q}"))
        })
        .collect()
}

pub fn config(names: &[&str]) -> cascade_orchestrator::cascade::CascadeConfigBuilder {
    CascadeConfig::builder(themes(names)).retry(RetryPolicy::none())
}

pub fn limiter(capacity: u32, interval: Duration) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimiterConfig::per_interval(capacity, interval)).unwrap())
}

pub fn roomy_limiter() -> Arc<RateLimiter> {
    limiter(1_000, Duration::from_secs(60))
}

pub fn orchestrator(
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    limiter: Arc<RateLimiter>,
) -> Orchestrator {
    Orchestrator::new(embedder, index, limiter).unwrap()
}

/// Embedder that can be told to fail, stall or report failures a fixed number of times.
pub struct ScriptedEmbedder {
    inner: HashingEmbedder,
    fail_when: Option<(String, ProviderError)>,
    transient_failures: AtomicUsize,
    delays: Vec<(String, Duration)>,
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(DIM),
            fail_when: None,
            transient_failures: AtomicUsize::new(0),
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Every text containing `needle` fails with `error`.
    pub fn failing_on(mut self, needle: &str, error: ProviderError) -> Self {
        self.fail_when = Some((needle.to_string(), error));
        self
    }

    /// The first `n` calls fail with a network error.
    pub fn flaky(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Texts containing `needle` take `delay` to embed.
    pub fn delaying(mut self, needle: &str, delay: Duration) -> Self {
        self.delays.push((needle.to_string(), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());

        if let Some((_, delay)) = self.delays.iter().find(|(needle, _)| text.contains(needle.as_str())) {
            tokio::time::sleep(*delay).await;
        }

        let flaked = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if flaked {
            return Err(ProviderError::Network("connection reset".to_string()));
        }

        if let Some((needle, error)) = &self.fail_when {
            if text.contains(needle.as_str()) {
                return Err(error.clone());
            }
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Declares one dimension and returns another.
pub struct MisreportingEmbedder;

#[async_trait]
impl EmbeddingProvider for MisreportingEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector, ProviderError> {
        Ok(EmbeddingVector::new(vec![0.5; DIM / 2]))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Index that is never reachable.
pub struct DownIndex {
    pub calls: AtomicUsize,
}

impl DownIndex {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for DownIndex {
    async fn search(
        &self,
        _vector: &EmbeddingVector,
        _top_k: usize,
        _filter: Option<&ScopeHints>,
    ) -> Result<Vec<Hit>, IndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(IndexError::Unavailable("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Index with a fixed answer, used to check ranking of raw index output.
pub struct CannedIndex {
    pub hits: Vec<Hit>,
    pub filters: Mutex<Vec<Option<ScopeHints>>>,
}

impl CannedIndex {
    pub fn new(hits: Vec<Hit>) -> Self {
        Self {
            hits,
            filters: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorIndex for CannedIndex {
    async fn search(
        &self,
        _vector: &EmbeddingVector,
        _top_k: usize,
        filter: Option<&ScopeHints>,
    ) -> Result<Vec<Hit>, IndexError> {
        self.filters.lock().unwrap().push(filter.cloned());
        Ok(self.hits.clone())
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

/// Small deterministic generator for latency jitter.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_millis(&mut self, max: u64) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) % max
    }
}
