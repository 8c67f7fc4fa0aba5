//! Exact inner-product vector index
//!
//! Stores unit-length vectors row-major in one contiguous buffer and answers
//! top-k queries by scoring every row. Corpora here are hundreds to a few
//! thousand blocks, so brute force is both fast enough and reproducible:
//! results do not depend on insertion order or any randomized structure.
//!
//! Ranking is by descending score; equal scores rank by ascending block id.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::embedding::is_unit;
use crate::errors::{Result, RetrievalError};

/// One ranked hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredBlock {
    pub block_id: usize,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Ordered hits of one query, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<ScoredBlock>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.hits.iter().map(|h| h.block_id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredBlock> {
        self.hits.iter()
    }
}

/// Immutable brute-force index over normalized vectors
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from unit vectors, all of one dimension.
    ///
    /// Vectors are expected to be normalized already; a vector that is not
    /// unit length is accepted but logged, since scores then stop being
    /// cosine similarities.
    pub fn build(embeddings: Vec<Vec<f32>>) -> Result<Self> {
        let dimension = embeddings.first().map(|v| v.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(dimension * embeddings.len());

        for (i, v) in embeddings.into_iter().enumerate() {
            if v.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            if !is_unit(&v) {
                tracing::warn!(block_id = i, "indexing vector that is not unit length");
            }
            data.extend_from_slice(&v);
        }

        Ok(Self { dimension, data })
    }

    /// Rebuild from a flat row-major buffer (used when loading a snapshot)
    pub fn from_raw(dimension: usize, data: Vec<f32>) -> Result<Self> {
        if dimension == 0 && !data.is_empty() {
            return Err(RetrievalError::DimensionMismatch {
                expected: 0,
                actual: data.len(),
            });
        }
        if dimension > 0 && data.len() % dimension != 0 {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { dimension, data })
    }

    /// An index with no entries
    pub fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Flat row-major storage
    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// Stored vector for `block_id`
    pub fn vector(&self, block_id: usize) -> Option<&[f32]> {
        if block_id >= self.len() {
            return None;
        }
        let start = block_id * self.dimension;
        Some(&self.data[start..start + self.dimension])
    }

    /// Exact top-k by inner product.
    ///
    /// `top_k` is clamped to the index size; zero or an empty index yields an
    /// empty result. The query must match the stored dimensionality.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<SearchResult> {
        let count = self.len();
        if count == 0 || top_k == 0 {
            return Ok(SearchResult::default());
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredBlock> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(block_id, row)| ScoredBlock {
                block_id,
                score: dot(query, row),
            })
            .collect();

        let k = top_k.min(count);
        if k < count {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(rank_order);

        Ok(SearchResult { hits: scored })
    }
}

#[inline]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Descending score, NaN last, then ascending id
fn rank_order(a: &ScoredBlock, b: &ScoredBlock) -> Ordering {
    match (a.score.is_nan(), b.score.is_nan()) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.block_id.cmp(&b.block_id))
}
