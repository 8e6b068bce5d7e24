//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait defines the storage contract for the
//! retrieval core: associate chunks with their vectors, answer top-K
//! similarity queries, report counts, and reset. Backends are pluggable:
//! the in-memory implementation in [`memory`] is sufficient for a bounded
//! corpus; a managed vector-search service can substitute for it behind
//! the same contract.
//!
//! The index is a derived, rebuildable artifact: it never owns the
//! authoritative document records.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Chunk, EmbeddingVector, SearchResult};

pub use memory::InMemoryIndex;

/// A retrieval query: the embedded question plus its raw text.
///
/// The text rides along so an index can fall back to lexical scoring for
/// the whole call when the vector is unusable (e.g. produced by a
/// different-dimensionality fallback embedder than the stored corpus).
#[derive(Debug, Clone)]
pub struct Query {
    pub vector: Vec<f32>,
    pub text: String,
}

/// Counts reported by [`VectorIndex::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub vector_count: usize,
}

/// Outcome of an upsert: how many pairs were stored and how many were
/// rejected per-item (dimension mismatch, missing vector).
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertOutcome {
    pub stored: usize,
    pub rejected: usize,
}

/// Storage contract for the retrieval core.
///
/// Writes must be atomic with respect to readers: `search` and `stats`
/// never observe a chunk whose vector is missing or half-written.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Associate each chunk with its vector, replacing any prior vector
    /// stored under the same chunk id. Pairs whose vector dimensionality
    /// does not match the index are rejected individually; the rest of
    /// the batch still lands.
    async fn upsert(&self, chunks: &[Chunk], vectors: &[EmbeddingVector])
        -> Result<UpsertOutcome>;

    /// Top-K similarity search. Returns at most `top_k` results, strictly
    /// non-increasing in score, ties broken by insertion order.
    async fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchResult>>;

    async fn stats(&self) -> Result<IndexStats>;

    /// Remove all data. The index stays usable afterwards and reports
    /// `chunk_count == 0`.
    async fn clear(&self) -> Result<()>;
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` (never an error, never NaN) when either side is empty,
/// the lengths differ, or either magnitude is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric() {
        let a = vec![0.2, 0.5, -0.3, 0.9];
        let b = vec![-0.1, 0.4, 0.8, 0.0];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero_not_nan() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &b);
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
