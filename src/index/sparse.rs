//! Sparse Index: an Okapi BM25 inverted index over the shared tokenizer's
//! output, serialized to a self-contained JSON document so reload never
//! re-tokenizes the corpus.

use crate::error::{HermesError, Result};
use crate::tokenizer::tokenize;
use crate::types::ChunkId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// BM25 inverted index: `term -> (chunk_id -> term_frequency)`, plus the
/// per-document lengths required for length normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseIndex {
    params: Bm25Params,
    postings: HashMap<String, HashMap<ChunkId, u32>>,
    doc_frequencies: HashMap<String, u32>,
    doc_lengths: HashMap<ChunkId, u32>,
    avg_doc_length: f32,
    num_docs: u32,
}

impl SparseIndex {
    /// Builds the index from `(chunk_id, code_text)` pairs using the shared
    /// tokenizer. `chunk_id` order need not be contiguous, but the caller is
    /// expected to pass every chunk from the corpus in one pass (§9: no
    /// partial rebuilds).
    pub fn build(documents: &[(ChunkId, &str)], params: Bm25Params) -> Self {
        let mut postings: HashMap<String, HashMap<ChunkId, u32>> = HashMap::new();
        let mut doc_lengths = HashMap::new();
        let mut total_len: u64 = 0;

        for (chunk_id, text) in documents {
            let tokens = tokenize(text);
            doc_lengths.insert(*chunk_id, tokens.len() as u32);
            total_len += tokens.len() as u64;

            let mut term_counts: HashMap<String, u32> = HashMap::new();
            for token in tokens {
                *term_counts.entry(token).or_insert(0) += 1;
            }
            for (term, count) in term_counts {
                postings.entry(term).or_default().insert(*chunk_id, count);
            }
        }

        let num_docs = documents.len() as u32;
        let avg_doc_length = if num_docs > 0 {
            total_len as f32 / num_docs as f32
        } else {
            0.0
        };

        let doc_frequencies = postings
            .iter()
            .map(|(term, docs)| (term.clone(), docs.len() as u32))
            .collect();

        Self {
            params,
            postings,
            doc_frequencies,
            doc_lengths,
            avg_doc_length,
            num_docs,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = *self.doc_frequencies.get(term).unwrap_or(&0) as f32;
        let n = self.num_docs as f32;
        (((n - df + 0.5) / (df + 0.5)) + 1.0).ln()
    }

    fn score(&self, chunk_id: ChunkId, query_tokens: &[String]) -> f32 {
        let doc_len = *self.doc_lengths.get(&chunk_id).unwrap_or(&0) as f32;
        let mut score = 0.0;
        for term in query_tokens {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let Some(&tf) = docs.get(&chunk_id) else {
                continue;
            };
            let tf = tf as f32;
            let idf = self.idf(term);
            let numerator = tf * (self.params.k1 + 1.0);
            let denominator = tf
                + self.params.k1
                    * (1.0 - self.params.b
                        + self.params.b * doc_len / self.avg_doc_length.max(1e-6));
            score += idf * numerator / denominator;
        }
        score
    }

    /// Tokenizes `query` and returns up to `k` `(chunk_id, score)` pairs,
    /// descending score, ties broken by ascending chunk_id.
    pub fn search(&self, query: &str, k: usize) -> Vec<(ChunkId, f32)> {
        let query_tokens = tokenize(query);
        self.search_tokens(&query_tokens, k)
    }

    pub fn search_tokens(&self, query_tokens: &[String], k: usize) -> Vec<(ChunkId, f32)> {
        if self.num_docs == 0 || query_tokens.is_empty() {
            return Vec::new();
        }

        let mut candidates: std::collections::HashSet<ChunkId> = std::collections::HashSet::new();
        for term in query_tokens {
            if let Some(docs) = self.postings.get(term) {
                candidates.extend(docs.keys().copied());
            }
        }

        let mut scored: Vec<(ChunkId, f32)> = candidates
            .into_iter()
            .map(|id| (id, self.score(id, query_tokens)))
            .collect();

        scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal) {
            CmpOrdering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.num_docs as usize
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| HermesError::Integrity(format!("encode sparse index: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| HermesError::Integrity(format!("write sparse index: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| HermesError::Integrity(format!("read sparse index: {e}")))?;
        serde_json::from_str(&json)
            .map_err(|e| HermesError::Integrity(format!("decode sparse index: {e}")))
    }
}
