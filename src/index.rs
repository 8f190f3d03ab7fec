//! In-memory exact nearest-neighbour index.
//!
//! The corpora behind the demos hold tens of items, so every query scans all
//! entries. Results are ordered by ascending distance; equal distances keep
//! insertion order.

use crate::error::{AppError, Result};
use log::info;

/// Distance used for a whole index, fixed at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMetric {
    /// L2 distance
    #[default]
    Euclidean,
    /// One minus cosine similarity; zero vectors are treated as orthogonal
    Cosine,
}

impl DistanceMetric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = magnitude(a);
                let norm_b = magnitude(b);
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
        }
    }
}

fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// A stored vector and whatever identifies its source
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry<M> {
    pub vector: Vec<f32>,
    pub metadata: M,
}

impl<M> IndexEntry<M> {
    pub fn new(vector: Vec<f32>, metadata: M) -> Self {
        IndexEntry { vector, metadata }
    }
}

/// One query result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<'a, M> {
    pub metadata: &'a M,
    pub distance: f32,
}

#[derive(Debug, Clone)]
pub struct VectorIndex<M> {
    entries: Vec<IndexEntry<M>>,
    dimension: Option<usize>,
    metric: DistanceMetric,
}

impl<M> VectorIndex<M> {
    /// Build an index, checking every vector has the same dimension.
    ///
    /// Zero entries is allowed; such an index refuses queries.
    pub fn build(entries: Vec<IndexEntry<M>>, metric: DistanceMetric) -> Result<Self> {
        let dimension = entries.first().map(|e| e.vector.len());
        if let Some(expected) = dimension {
            if expected == 0 {
                return Err(AppError::input("cannot index zero-length vectors"));
            }
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
                return Err(AppError::DimensionMismatch {
                    expected,
                    actual: bad.vector.len(),
                });
            }
        }

        info!(
            "Built {:?} index with {} entries (dimension {:?})",
            metric,
            entries.len(),
            dimension
        );

        Ok(VectorIndex {
            entries,
            dimension,
            metric,
        })
    }

    /// Return the `k` nearest entries, nearest first
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor<'_, M>>> {
        let Some(expected) = self.dimension else {
            return Err(AppError::EmptyIndex {
                reason: "the index was built from zero entries".to_string(),
            });
        };
        if vector.len() != expected {
            return Err(AppError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, self.metric.distance(&entry.vector, vector)))
            .collect();

        // Stable sort keeps insertion order for equal distances
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| Neighbor {
                metadata: &self.entries[i].metadata,
                distance,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
