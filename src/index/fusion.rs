//! Reciprocal Rank Fusion over an arbitrary number of ranked lists.

use crate::types::ChunkId;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

/// Fuses `lists` (each descending-sorted `(chunk_id, score)`) into one
/// ranked list using RRF with constant `k`. The per-retriever scores are
/// discarded by the fused score but the first list's score (or the second's,
/// if the chunk is absent from the first) is kept alongside for
/// explainability.
pub fn reciprocal_rank_fusion(
    lists: &[Vec<(ChunkId, f32)>],
    k: u32,
) -> Vec<(ChunkId, f32, f32)> {
    let mut fused: HashMap<ChunkId, f32> = HashMap::new();
    let mut retrieval_score: HashMap<ChunkId, f32> = HashMap::new();

    for list in lists {
        for (rank, (chunk_id, score)) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f32 + rank as f32 + 1.0);
            *fused.entry(*chunk_id).or_insert(0.0) += contribution;
            retrieval_score.entry(*chunk_id).or_insert(*score);
        }
    }

    let mut out: Vec<(ChunkId, f32, f32)> = fused
        .into_iter()
        .map(|(id, fused_score)| (id, fused_score, *retrieval_score.get(&id).unwrap_or(&0.0)))
        .collect();

    out.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal) {
        CmpOrdering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    out
}
