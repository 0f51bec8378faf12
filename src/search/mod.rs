pub mod pipeline;

pub use pipeline::SearchPipeline;

use crate::config::RetrievalMode;
use serde::{Deserialize, Serialize};

fn default_top_k_retrieve() -> usize {
    100
}
fn default_top_k_rerank() -> usize {
    10
}
fn default_retrieval_mode() -> RetrievalMode {
    RetrievalMode::Hybrid
}
fn default_return_snippets() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k_retrieve")]
    pub top_k_retrieve: usize,
    #[serde(default = "default_top_k_rerank")]
    pub top_k_rerank: usize,
    #[serde(default = "default_retrieval_mode")]
    pub retrieval_mode: RetrievalMode,
    #[serde(default)]
    pub filter_language: Option<String>,
    #[serde(default)]
    pub filter_path_prefix: Option<String>,
    #[serde(default = "default_return_snippets")]
    pub return_snippets: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub chunk_id: u64,
    pub file_path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    pub retrieval_rank: usize,
    pub retrieval_score: f32,
    pub rerank_score: Option<f32>,
    pub final_rank: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Timings {
    pub embed_query_ms: f64,
    pub retrieval_ms: f64,
    pub rerank_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub request_id: String,
    pub query: String,
    pub retrieval_mode: RetrievalMode,
    pub results: Vec<SearchResultItem>,
    pub timings_ms: Timings,
    pub rerank_skipped: bool,
    pub total_candidates: usize,
}

/// 12 lowercase hex characters, uniformly random — not a hash of any
/// request content, per the spec's explicit disambiguation. Derived from a
/// UUID v4 with the dashes stripped.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub index_size: usize,
    pub n_chunks: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub retrieval_mode: RetrievalMode,
    pub biencoder_model: String,
    pub crossencoder_model: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_twelve_hex_chars() {
        let id = new_request_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn request_ids_are_not_repeated() {
        assert_ne!(new_request_id(), new_request_id());
    }
}
