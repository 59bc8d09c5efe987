//! Similarity retrieval over a [`KnowledgeBase`].
//!
//! # Ranking
//!
//! 1. Score every row of the embedding matrix against the query vector
//!    (dot product of unit vectors, i.e. cosine similarity).
//! 2. Sort by score descending; ties keep ascending chunk index.
//! 3. Walk the ranking, admitting a chunk only while its source has fewer
//!    than `max_per_source` admitted chunks.
//! 4. Stop at `top_k` admitted chunks or when the ranking is exhausted.
//!
//! The retriever never applies a relevance threshold; that is the
//! composer's decision. Scoring is brute force, O(N·D) per query.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::Chunk;
use crate::store::KnowledgeBase;

/// One ranked retrieval hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredChunk<'a> {
    /// Position of the chunk in the knowledge base.
    pub index: usize,
    /// Cosine similarity with the query.
    pub score: f32,
    pub chunk: &'a Chunk,
}

/// Ranked lookup of chunks by query vector.
///
/// [`KnowledgeBase`] implements this with an exhaustive scan; an
/// approximate index can implement it without touching the composer.
pub trait Retriever {
    /// True when there is nothing to search.
    fn is_empty(&self) -> bool;

    /// Top `top_k` chunks by similarity, at most `max_per_source` from any
    /// one source (`None` disables the cap).
    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        max_per_source: Option<usize>,
    ) -> Vec<ScoredChunk<'_>>;

    /// The single most similar chunk, if any.
    fn best_match(&self, query: &[f32]) -> Option<ScoredChunk<'_>> {
        self.search(query, 1, None).into_iter().next()
    }
}

impl Retriever for KnowledgeBase {
    fn is_empty(&self) -> bool {
        self.embeddings().is_none()
    }

    fn search(
        &self,
        query: &[f32],
        top_k: usize,
        max_per_source: Option<usize>,
    ) -> Vec<ScoredChunk<'_>> {
        let matrix = match self.embeddings() {
            Some(m) if top_k > 0 => m,
            _ => return Vec::new(),
        };
        if matrix.dims() != query.len() {
            tracing::warn!(
                expected = matrix.dims(),
                got = query.len(),
                "query vector dimension does not match the knowledge base"
            );
            return Vec::new();
        }

        let mut ranked: Vec<(usize, f32)> = matrix.scores(query).into_iter().enumerate().collect();
        ranked.sort_by(|a, b| rank_order(a, b));

        let chunks = self.chunks();
        let mut per_source: HashMap<&str, usize> = HashMap::new();
        let mut results = Vec::with_capacity(top_k.min(ranked.len()));

        for (index, score) in ranked {
            let chunk = &chunks[index];
            if let Some(cap) = max_per_source {
                let admitted = per_source.entry(chunk.source.as_str()).or_insert(0);
                if *admitted >= cap {
                    continue;
                }
                *admitted += 1;
            }
            results.push(ScoredChunk {
                index,
                score,
                chunk,
            });
            if results.len() == top_k {
                break;
            }
        }

        results
    }
}

/// Descending score, then ascending index.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}
