//! Hybrid retrieval: weighted fusion of dense and keyword rankings.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dense::DenseIndex;
use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::keyword::KeywordIndex;

/// Which indices answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalStrategy {
    DenseOnly,
    SparseOnly,
    /// Blend min-max normalized scores of both rankings.
    Fused { dense_weight: f32, sparse_weight: f32 },
}

impl Default for RetrievalStrategy {
    fn default() -> Self {
        Self::Fused { dense_weight: 0.7, sparse_weight: 0.3 }
    }
}

/// Rescale scores to `[0, 1]`. When every score is equal each maps to 1.0.
fn normalize(results: &[SearchResult]) -> Vec<f32> {
    let (min, max) = results.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), r| {
        (lo.min(r.score), hi.max(r.score))
    });
    let span = max - min;
    results
        .iter()
        .map(|r| if span > f32::EPSILON { (r.score - min) / span } else { 1.0 })
        .collect()
}

struct Candidate {
    result: SearchResult,
    score: f32,
    dense_rank: Option<usize>,
    sparse_rank: Option<usize>,
}

/// Merge two rankings into one list of at most `k` results.
///
/// Each ranking is normalized on its own, then a chunk's fused score is
/// `dense_weight * dense + sparse_weight * sparse`, where a ranking that did
/// not return the chunk contributes zero. Equal fused scores are ordered by
/// dense rank, then by keyword rank. Chunks are matched by id.
pub fn fuse(
    dense: Vec<SearchResult>,
    sparse: Vec<SearchResult>,
    dense_weight: f32,
    sparse_weight: f32,
    k: usize,
) -> Vec<SearchResult> {
    let mut candidates: Vec<Candidate> = Vec::with_capacity(dense.len() + sparse.len());
    let mut by_id: HashMap<String, usize> = HashMap::new();

    let dense_norm = normalize(&dense);
    for (rank, (result, norm)) in dense.into_iter().zip(dense_norm).enumerate() {
        by_id.insert(result.chunk.id.clone(), candidates.len());
        candidates.push(Candidate {
            result,
            score: dense_weight * norm,
            dense_rank: Some(rank),
            sparse_rank: None,
        });
    }

    let sparse_norm = normalize(&sparse);
    for (rank, (result, norm)) in sparse.into_iter().zip(sparse_norm).enumerate() {
        match by_id.get(&result.chunk.id) {
            Some(&i) => {
                candidates[i].score += sparse_weight * norm;
                candidates[i].sparse_rank = Some(rank);
            }
            None => {
                by_id.insert(result.chunk.id.clone(), candidates.len());
                candidates.push(Candidate {
                    result,
                    score: sparse_weight * norm,
                    dense_rank: None,
                    sparse_rank: Some(rank),
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank_order(a.dense_rank, b.dense_rank))
            .then_with(|| rank_order(a.sparse_rank, b.sparse_rank))
    });

    candidates
        .into_iter()
        .take(k)
        .map(|c| SearchResult { chunk: c.result.chunk, score: c.score })
        .collect()
}

/// Ranked before unranked, lower rank first.
fn rank_order(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Queries the dense and keyword indices of one chunk set.
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    dense: Arc<DenseIndex>,
    keyword: Arc<KeywordIndex>,
    strategy: RetrievalStrategy,
    similarity_threshold: Option<f32>,
}

impl HybridRetriever {
    pub fn new(dense: Arc<DenseIndex>, keyword: Arc<KeywordIndex>, strategy: RetrievalStrategy) -> Self {
        Self { dense, keyword, strategy, similarity_threshold: None }
    }

    /// Drop dense hits whose cosine similarity is below `threshold`.
    pub fn with_similarity_threshold(mut self, threshold: Option<f32>) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    async fn dense_hits(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        let mut hits = self.dense.query(text, k).await?;
        if let Some(threshold) = self.similarity_threshold {
            hits.retain(|r| r.score >= threshold);
        }
        Ok(hits)
    }

    /// Return up to `k` chunks for `text`, most relevant first.
    ///
    /// # Errors
    ///
    /// [`RagError::EmptyIndexError`] when nothing has been indexed, and any
    /// embedding failure from the dense side.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if self.dense.is_empty() {
            return Err(RagError::EmptyIndexError);
        }

        let results = match self.strategy {
            RetrievalStrategy::DenseOnly => self.dense_hits(text, k).await?,
            RetrievalStrategy::SparseOnly => self.keyword.query(text, k)?,
            RetrievalStrategy::Fused { dense_weight, sparse_weight } => {
                let dense = self.dense_hits(text, k).await?;
                let sparse = self.keyword.query(text, k)?;
                debug!(dense = dense.len(), sparse = sparse.len(), "fusing rankings");
                fuse(dense, sparse, dense_weight, sparse_weight, k)
            }
        };

        debug!(strategy = ?self.strategy, k, returned = results.len(), "hybrid query");
        Ok(results)
    }
}
