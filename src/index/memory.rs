//! In-memory [`VectorIndex`] implementation.
//!
//! Brute-force cosine similarity over all stored vectors behind a single
//! `RwLock`, which makes every upsert and clear atomic with respect to
//! concurrent searches. Sufficient for a bounded, slowly-changing corpus;
//! larger deployments swap in a managed backend behind the same trait.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{Chunk, EmbeddingVector, SearchResult};

use super::{cosine_similarity, IndexStats, Query, UpsertOutcome, VectorIndex};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct Inner {
    /// Entries in insertion order, which is also the tie-break order for
    /// equal scores.
    entries: Vec<Entry>,
    /// chunk id → position in `entries`, so replacement keeps the original
    /// insertion position.
    by_id: HashMap<String, usize>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    dims: usize,
    inner: RwLock<Inner>,
}

impl InMemoryIndex {
    /// Create an index for vectors of the given dimensionality.
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                by_id: HashMap::new(),
            }),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(
        &self,
        chunks: &[Chunk],
        vectors: &[EmbeddingVector],
    ) -> Result<UpsertOutcome> {
        let by_chunk: HashMap<&str, &EmbeddingVector> = vectors
            .iter()
            .map(|v| (v.chunk_id.as_str(), v))
            .collect();

        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Index("index lock poisoned".into()))?;

        let mut outcome = UpsertOutcome::default();

        for chunk in chunks {
            let Some(vector) = by_chunk.get(chunk.id.as_str()) else {
                warn!(chunk_id = %chunk.id, "no vector for chunk, skipping");
                outcome.rejected += 1;
                continue;
            };

            if vector.values.len() != self.dims {
                warn!(
                    chunk_id = %chunk.id,
                    expected = self.dims,
                    actual = vector.values.len(),
                    "rejecting vector with mismatched dimensionality"
                );
                outcome.rejected += 1;
                continue;
            }

            let entry = Entry {
                chunk: chunk.clone(),
                vector: vector.values.clone(),
            };

            match inner.by_id.get(&chunk.id).copied() {
                Some(pos) => {
                    inner.entries[pos] = entry;
                }
                None => {
                    let pos = inner.entries.len();
                    inner.by_id.insert(chunk.id.clone(), pos);
                    inner.entries.push(entry);
                }
            }
            outcome.stored += 1;
        }

        Ok(outcome)
    }

    async fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchResult>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| Error::Index("index lock poisoned".into()))?;

        if inner.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        // One scoring unit per call: cosine when the query vector matches
        // the index dimensionality, otherwise lexical overlap for the
        // whole call. Units are never mixed within a single search.
        let use_cosine = query.vector.len() == self.dims;
        if !use_cosine {
            warn!(
                query_dims = query.vector.len(),
                index_dims = self.dims,
                "query vector unusable, scoring this search lexically"
            );
        }

        let query_tokens = lexical_tokens(&query.text);

        let mut results: Vec<SearchResult> = inner
            .entries
            .iter()
            .map(|entry| {
                let score = if use_cosine {
                    cosine_similarity(&query.vector, &entry.vector)
                } else {
                    jaccard_similarity(&query_tokens, &lexical_tokens(&entry.chunk.content))
                };
                SearchResult {
                    chunk: entry.chunk.clone(),
                    score,
                }
            })
            .collect();

        // Stable sort keeps insertion order for equal scores.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(top_k);
        Ok(results)
    }

    async fn stats(&self) -> Result<IndexStats> {
        let inner = self
            .inner
            .read()
            .map_err(|_| Error::Index("index lock poisoned".into()))?;
        Ok(IndexStats {
            chunk_count: inner.entries.len(),
            vector_count: inner.entries.len(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| Error::Index("index lock poisoned".into()))?;
        inner.entries.clear();
        inner.by_id.clear();
        Ok(())
    }
}

/// Lowercase tokens longer than two characters, the unit of the lexical
/// fallback score.
fn lexical_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f32 / union as f32
}
