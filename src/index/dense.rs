//! Dense vector index: exact (Flat) and approximate (IVF) backends behind
//! one [`DenseIndex`] contract.

use crate::error::{HermesError, Result};
use crate::types::ChunkId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::path::Path;

/// Vector similarity engine keyed by `chunk_id`. Vectors are assumed
/// L2-normalized by the caller, so inner product equals cosine similarity.
pub trait DenseIndex: Send + Sync {
    /// Returns up to `k` `(chunk_id, score)` pairs, descending score, ties
    /// broken by ascending chunk_id. Returns all vectors if `k` exceeds the
    /// corpus size; returns an empty list if the index holds no vectors.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dim(&self) -> usize;
}

fn rank_and_truncate(mut scored: Vec<(ChunkId, f32)>, k: usize) -> Vec<(ChunkId, f32)> {
    scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal) {
        CmpOrdering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    scored.truncate(k);
    scored
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Exact brute-force inner product search. Default backend when the corpus
/// has fewer than 100,000 chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
        }
    }

    /// Builds a flat index from a dense row-major `(N, D)` matrix, where
    /// row `i` is assumed to be chunk_id `i`.
    pub fn from_matrix(vectors: Vec<Vec<f32>>, dim: usize) -> Self {
        Self { dim, vectors }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| HermesError::Integrity(format!("encode dense index: {e}")))?;
        std::fs::write(path, bytes)
            .map_err(|e| HermesError::Integrity(format!("write dense index: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| HermesError::Integrity(format!("read dense index: {e}")))?;
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| HermesError::Integrity(format!("decode dense index: {e}")))?;
        Ok(index)
    }
}

impl DenseIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(HermesError::Validation(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let scored: Vec<(ChunkId, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id as ChunkId, dot(v, query)))
            .collect();
        Ok(rank_and_truncate(scored, k))
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Inverted-file approximate index: `nlist` coarse centroids trained by a
/// simple k-means pass over the corpus, probing the `nprobe` nearest
/// centroids per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfIndex {
    dim: usize,
    nprobe: usize,
    centroids: Vec<Vec<f32>>,
    // partition index -> (chunk_id, vector)
    partitions: Vec<Vec<(ChunkId, Vec<f32>)>>,
}

impl IvfIndex {
    /// Trains `nlist` centroids from `vectors` (row `i` is chunk_id `i`)
    /// with a fixed number of Lloyd iterations, then assigns every vector
    /// to its nearest centroid's partition.
    pub fn train(vectors: &[Vec<f32>], dim: usize, nlist: usize, nprobe: usize) -> Self {
        if vectors.is_empty() {
            return Self {
                dim,
                nprobe,
                centroids: Vec::new(),
                partitions: Vec::new(),
            };
        }

        let nlist = nlist.max(1).min(vectors.len());
        let mut centroids: Vec<Vec<f32>> = (0..nlist)
            .map(|i| vectors[i * vectors.len() / nlist].clone())
            .collect();

        for _ in 0..8 {
            let mut sums = vec![vec![0f32; dim]; nlist];
            let mut counts = vec![0usize; nlist];

            for v in vectors {
                let nearest = nearest_centroid(&centroids, v);
                counts[nearest] += 1;
                for (s, x) in sums[nearest].iter_mut().zip(v.iter()) {
                    *s += x;
                }
            }

            for (c, (sum, count)) in centroids.iter_mut().zip(sums.iter().zip(counts.iter())) {
                if *count > 0 {
                    for (ci, si) in c.iter_mut().zip(sum.iter()) {
                        *ci = si / *count as f32;
                    }
                }
            }
        }

        let mut partitions = vec![Vec::new(); nlist];
        for (id, v) in vectors.iter().enumerate() {
            let nearest = nearest_centroid(&centroids, v);
            partitions[nearest].push((id as ChunkId, v.clone()));
        }

        Self {
            dim,
            nprobe: nprobe.max(1),
            centroids,
            partitions,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| HermesError::Integrity(format!("encode dense index: {e}")))?;
        std::fs::write(path, bytes)
            .map_err(|e| HermesError::Integrity(format!("write dense index: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| HermesError::Integrity(format!("read dense index: {e}")))?;
        let (index, _): (Self, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| HermesError::Integrity(format!("decode dense index: {e}")))?;
        Ok(index)
    }
}

fn nearest_centroid(centroids: &[Vec<f32>], v: &[f32]) -> usize {
    centroids
        .iter()
        .enumerate()
        .map(|(i, c)| (i, dot(c, v)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(CmpOrdering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl DenseIndex for IvfIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>> {
        if self.centroids.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(HermesError::Validation(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let mut centroid_order: Vec<usize> = (0..self.centroids.len()).collect();
        centroid_order.sort_by(|&a, &b| {
            dot(&self.centroids[b], query)
                .partial_cmp(&dot(&self.centroids[a], query))
                .unwrap_or(CmpOrdering::Equal)
        });

        let mut scored = Vec::new();
        for &partition_idx in centroid_order.iter().take(self.nprobe) {
            for (id, v) in &self.partitions[partition_idx] {
                scored.push((*id, dot(v, query)));
            }
        }
        Ok(rank_and_truncate(scored, k))
    }

    fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_index_exact_match_scores_near_one() {
        let index = FlatIndex::from_matrix(
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.707, 0.707]],
            2,
        );
        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn flat_index_empty_returns_empty() {
        let index = FlatIndex::new(4);
        assert_eq!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap(), vec![]);
    }

    #[test]
    fn flat_index_ties_break_on_ascending_chunk_id() {
        let index = FlatIndex::from_matrix(vec![vec![1.0, 0.0], vec![1.0, 0.0]], 2);
        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
    }

    #[test]
    fn flat_index_k_greater_than_n_returns_all() {
        let index = FlatIndex::from_matrix(vec![vec![1.0, 0.0]], 2);
        assert_eq!(index.search(&[1.0, 0.0], 50).unwrap().len(), 1);
    }

    #[test]
    fn ivf_index_recovers_exact_match_with_full_probe() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
            vec![0.0, -1.0],
        ];
        let index = IvfIndex::train(&vectors, 2, 4, 4);
        let results = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].0, 0);
        assert!((results[0].1 - 1.0).abs() < 1e-5);
    }
}
