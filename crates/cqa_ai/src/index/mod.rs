//! Exact (flat) vector index over unit-normalized embeddings.

use std::cmp::Ordering;

use cqa_core::domain::SimilarityMetric;
use cqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

pub mod build;
pub mod similarity;
pub mod store;

pub use build::{build_index_with_embedder, BuildReport, IndexBuildInput};
pub use store::{ArtifactPresence, ArtifactStore, IndexInfo, IndexStatus, LoadedIndex};

/// Norm tolerance for the unit-length invariant.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub vector_id: usize,
    /// Inner product (higher is better) or squared L2 distance (lower is better), per the index metric.
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    metric: SimilarityMetric,
    dims: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Build from vectors in insertion order (`vector_id` = position).
    ///
    /// All vectors must share one dimension and be unit length.
    pub fn build(vectors: Vec<Vec<f32>>, metric: SimilarityMetric) -> Result<Self, AppError> {
        let first = vectors.first().ok_or_else(|| {
            AppError::new(codes::CORPUS_EMPTY, "Cannot build an index from zero vectors")
        })?;
        let dims = first.len();
        if dims == 0 {
            return Err(AppError::new(
                codes::INDEX_DIMENSION_MISMATCH,
                "Embedding vectors must not be empty",
            ));
        }
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dims {
                return Err(AppError::new(
                    codes::INDEX_DIMENSION_MISMATCH,
                    "Embedding dimension mismatch across vectors",
                )
                .with_details(format!("expected={}; got={}; vector_id={}", dims, v.len(), i)));
            }
            if !similarity::is_unit(v, UNIT_NORM_TOLERANCE) {
                return Err(AppError::new(
                    codes::INDEX_NOT_NORMALIZED,
                    "Index vectors must be L2-normalized",
                )
                .with_details(format!("vector_id={}; norm={}", i, similarity::l2_norm(v))));
            }
        }
        Ok(Self {
            metric,
            dims,
            vectors,
        })
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn size(&self) -> usize {
        self.vectors.len()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    /// Exact top-k search. Best first; ties go to the lower `vector_id`.
    /// `k` larger than the index returns every entry.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, AppError> {
        if query.len() != self.dims {
            return Err(AppError::new(
                codes::INDEX_DIMENSION_MISMATCH,
                "Query embedding dims do not match index dims",
            )
            .with_details(format!("index_dims={}; query_dims={}", self.dims, query.len())));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(vector_id, v)| SearchHit {
                vector_id,
                score: match self.metric {
                    SimilarityMetric::InnerProduct => similarity::dot(query, v),
                    SimilarityMetric::L2 => similarity::squared_l2_distance(query, v),
                },
            })
            .collect();

        let metric = self.metric;
        let by_rank = |a: &SearchHit, b: &SearchHit| -> Ordering {
            let primary = match metric {
                SimilarityMetric::InnerProduct => b.score.total_cmp(&a.score),
                SimilarityMetric::L2 => a.score.total_cmp(&b.score),
            };
            primary.then(a.vector_id.cmp(&b.vector_id))
        };

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, by_rank);
            hits.truncate(k);
        }
        hits.sort_by(by_rank);
        Ok(hits)
    }
}

/// Convert a raw index score to cosine similarity. Valid for unit vectors only.
pub fn cosine_from_score(metric: SimilarityMetric, score: f32) -> f32 {
    match metric {
        SimilarityMetric::InnerProduct => score,
        SimilarityMetric::L2 => 1.0 - score / 2.0,
    }
}
