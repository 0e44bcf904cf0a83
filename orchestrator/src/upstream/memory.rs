//! Self-contained embedding and index implementations.
//!
//! Used for local runs (`upstream_mode = "memory"`) and as realistic
//! collaborators in tests. Both are deterministic.

use super::{EmbeddingProvider, VectorIndex};
use crate::error::{IndexError, ProviderError};
use crate::models::{EmbeddingVector, Hit, MetadataValue, ScopeHints};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Feature-hashing embedder: terms are hashed into buckets, weighted by
/// frequency and L2-normalised.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn bucket(term: &str, dimension: usize) -> usize {
        // FNV-1a
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= u64::from(*b);
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dimension as u64) as usize
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vec;
        }
        for term in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() >= 2)
        {
            vec[Self::bucket(&term.to_lowercase(), self.dimension)] += 1.0;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, ProviderError> {
        Ok(EmbeddingVector::new(self.vectorize(text)))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

struct Entry {
    id: String,
    vector: Vec<f32>,
    metadata: BTreeMap<String, MetadataValue>,
}

/// Brute-force cosine index. Ties keep insertion order.
pub struct InMemoryIndex {
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(
        &self,
        id: impl Into<String>,
        vector: Vec<f32>,
        metadata: BTreeMap<String, MetadataValue>,
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::Rejected(format!(
                "vector has {} dimensions, index stores {}",
                vector.len(),
                self.dimension
            )));
        }
        let mut entries = self
            .entries
            .write()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))?;
        entries.push(Entry {
            id: id.into(),
            vector,
            metadata,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn matches_scope(metadata: &BTreeMap<String, MetadataValue>, filter: Option<&ScopeHints>) -> bool {
    filter.map_or(true, |hints| {
        hints.iter().all(|(key, want)| {
            metadata
                .get(key)
                .is_some_and(|have| have.as_filter_text() == *want)
        })
    })
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn search(
        &self,
        vector: &EmbeddingVector,
        top_k: usize,
        filter: Option<&ScopeHints>,
    ) -> Result<Vec<Hit>, IndexError> {
        if vector.dimension() != self.dimension {
            return Err(IndexError::Rejected(format!(
                "query has {} dimensions, index stores {}",
                vector.dimension(),
                self.dimension
            )));
        }
        let entries = self
            .entries
            .read()
            .map_err(|_| IndexError::Unavailable("index lock poisoned".to_string()))?;

        let mut hits: Vec<Hit> = entries
            .iter()
            .filter(|e| matches_scope(&e.metadata, filter))
            .map(|e| Hit {
                id: e.id.clone(),
                score: cosine(vector.as_slice(), &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nearest_document_ranks_first() {
        let embedder = HashingEmbedder::new(64);
        let index = InMemoryIndex::new(64);
        for (id, text) in [
            ("flood", "river flood damaged the warehouse"),
            ("strike", "dock workers strike at the port"),
            ("launch", "new product launch in spring"),
        ] {
            index
                .insert(id, embedder.vectorize(text), BTreeMap::new())
                .unwrap();
        }

        let query = embedder.embed("port strike").await.unwrap();
        let hits = index.search(&query, 2, None).await.unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "strike");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn scope_hints_filter_on_metadata() {
        let index = InMemoryIndex::new(2);
        let emea = BTreeMap::from([("region".to_string(), MetadataValue::from("emea"))]);
        let apac = BTreeMap::from([("region".to_string(), MetadataValue::from("apac"))]);
        index.insert("a", vec![1.0, 0.0], emea).unwrap();
        index.insert("b", vec![1.0, 0.0], apac).unwrap();

        let scope = ScopeHints::from([("region".to_string(), "apac".to_string())]);
        let hits = index
            .search(&EmbeddingVector::new(vec![1.0, 0.0]), 5, Some(&scope))
            .await
            .unwrap();

        assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn equal_scores_keep_insertion_order() {
        let index = InMemoryIndex::new(2);
        for id in ["first", "second", "third"] {
            index.insert(id, vec![0.0, 1.0], BTreeMap::new()).unwrap();
        }
        let hits = index
            .search(&EmbeddingVector::new(vec![0.0, 1.0]), 3, None)
            .await
            .unwrap();
        assert_eq!(
            hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(),
            vec!["first", "second", "third"]
        );
    }

    #[test]
    fn rejects_wrong_dimension_on_insert() {
        let index = InMemoryIndex::new(3);
        assert!(index.insert("x", vec![1.0], BTreeMap::new()).is_err());
        assert!(index.is_empty());
    }
}
