//! Search Pipeline: embed -> retrieve -> filter -> rerank -> assemble.

use crate::config::{RetrievalMode, SearchConfig};
use crate::embed::{Embedder, QueryEmbeddingCache, Reranker};
use crate::error::{HermesError, Result};
use crate::index::{reciprocal_rank_fusion, DenseIndex, SparseIndex};
use crate::search::{new_request_id, SearchRequest, SearchResponse, SearchResultItem, Timings};
use crate::store::MetadataStore;
use crate::tokenizer::tokenize;
use crate::types::ChunkId;
use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct SearchPipeline {
    dense: Arc<dyn DenseIndex>,
    sparse: Arc<SparseIndex>,
    metadata: Arc<dyn MetadataStore>,
    biencoder: Arc<dyn Embedder>,
    crossencoder: Arc<dyn Reranker>,
    cache: Arc<QueryEmbeddingCache>,
    config: SearchConfig,
}

impl SearchPipeline {
    pub fn new(
        dense: Arc<dyn DenseIndex>,
        sparse: Arc<SparseIndex>,
        metadata: Arc<dyn MetadataStore>,
        biencoder: Arc<dyn Embedder>,
        crossencoder: Arc<dyn Reranker>,
        cache: Arc<QueryEmbeddingCache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            dense,
            sparse,
            metadata,
            biencoder,
            crossencoder,
            cache,
            config,
        }
    }

    pub fn n_chunks(&self) -> usize {
        self.dense.len().max(self.sparse.len())
    }

    pub fn cache(&self) -> &QueryEmbeddingCache {
        &self.cache
    }

    pub fn biencoder_model(&self) -> &str {
        self.biencoder.model_name()
    }

    pub fn crossencoder_model(&self) -> &str {
        self.crossencoder.model_name()
    }

    pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        validate(&req)?;
        let total_start = Instant::now();
        let mut timings = Timings::default();

        // Stage 1: embed.
        let embed_start = Instant::now();
        let query_vec = if matches!(req.retrieval_mode, RetrievalMode::Dense | RetrievalMode::Hybrid)
        {
            Some(self.embed_query(&req.query).await?)
        } else {
            None
        };
        let query_tokens = tokenize(&req.query);
        timings.embed_query_ms = elapsed_ms(embed_start);

        // Stage 2: retrieve.
        let retrieve_start = Instant::now();
        let (candidates, retrieval_scores) = self.retrieve(&req, query_vec.as_deref(), &query_tokens)?;
        timings.retrieval_ms = elapsed_ms(retrieve_start);

        // Stage 3: filter.
        let filtered = self.filter(&req, candidates).await?;

        let total_candidates = filtered.len();
        if filtered.is_empty() {
            timings.total_ms = elapsed_ms(total_start);
            return Ok(SearchResponse {
                request_id: new_request_id(),
                query: req.query,
                retrieval_mode: req.retrieval_mode,
                results: Vec::new(),
                timings_ms: timings,
                rerank_skipped: true,
                total_candidates: 0,
            });
        }

        // Stage 4: rerank.
        let rerank_start = Instant::now();
        let (ordered, rerank_scores, rerank_skipped) =
            self.rerank(&req, filtered.clone()).await?;
        timings.rerank_ms = elapsed_ms(rerank_start);

        // Stage 5: truncate and assemble.
        let kept: Vec<ChunkId> = ordered.into_iter().take(req.top_k_rerank).collect();
        let records = self.metadata.get_many(&kept).await?;

        let retrieval_rank_of: std::collections::HashMap<ChunkId, usize> = filtered
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i + 1))
            .collect();

        let mut results = Vec::with_capacity(kept.len());
        for (final_idx, (chunk_id, record)) in kept.iter().zip(records.into_iter()).enumerate() {
            results.push(SearchResultItem {
                chunk_id: record.chunk_id,
                file_path: record.file_path,
                language: record.language,
                start_line: record.start_line,
                end_line: record.end_line,
                symbol_name: record.symbol_name,
                code_snippet: if req.return_snippets {
                    Some(record.code_text)
                } else {
                    None
                },
                retrieval_rank: *retrieval_rank_of.get(chunk_id).unwrap_or(&0),
                retrieval_score: *retrieval_scores.get(chunk_id).unwrap_or(&0.0),
                rerank_score: rerank_scores.get(chunk_id).copied(),
                final_rank: final_idx + 1,
            });
        }

        timings.total_ms = elapsed_ms(total_start);

        Ok(SearchResponse {
            request_id: new_request_id(),
            query: req.query,
            retrieval_mode: req.retrieval_mode,
            results,
            timings_ms: timings,
            rerank_skipped,
            total_candidates,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.cache.get(query) {
            return Ok(cached);
        }
        let embedding = self.biencoder.encode_one(query).await?;
        self.cache.insert(query, embedding.clone());
        Ok(embedding)
    }

    fn retrieve(
        &self,
        req: &SearchRequest,
        query_vec: Option<&[f32]>,
        query_tokens: &[String],
    ) -> Result<(
        Vec<ChunkId>,
        std::collections::HashMap<ChunkId, f32>,
    )> {
        match req.retrieval_mode {
            RetrievalMode::Dense => {
                let vec = query_vec.ok_or_else(|| {
                    HermesError::Integrity("dense mode requires a query embedding".to_string())
                })?;
                let ranked = self.dense.search(vec, req.top_k_retrieve)?;
                let scores = ranked.iter().copied().collect();
                Ok((ranked.into_iter().map(|(id, _)| id).collect(), scores))
            }
            RetrievalMode::Sparse => {
                let ranked = self.sparse.search_tokens(query_tokens, req.top_k_retrieve);
                let scores = ranked.iter().copied().collect();
                Ok((ranked.into_iter().map(|(id, _)| id).collect(), scores))
            }
            RetrievalMode::Hybrid => {
                let vec = query_vec.ok_or_else(|| {
                    HermesError::Integrity("hybrid mode requires a query embedding".to_string())
                })?;
                let dense_ranked = self.dense.search(vec, req.top_k_retrieve)?;
                let sparse_ranked = self.sparse.search_tokens(query_tokens, req.top_k_retrieve);
                let fused = reciprocal_rank_fusion(&[dense_ranked, sparse_ranked], self.config.rrf_k);
                let truncated: Vec<_> = fused.into_iter().take(req.top_k_retrieve).collect();
                let scores = truncated
                    .iter()
                    .map(|(id, _fused, retrieval_score)| (*id, *retrieval_score))
                    .collect();
                Ok((truncated.into_iter().map(|(id, _, _)| id).collect(), scores))
            }
        }
    }

    async fn filter(&self, req: &SearchRequest, candidates: Vec<ChunkId>) -> Result<Vec<ChunkId>> {
        if req.filter_language.is_none() && req.filter_path_prefix.is_none() {
            return Ok(candidates);
        }
        let allowed = self
            .metadata
            .filter_ids(req.filter_language.as_deref(), req.filter_path_prefix.as_deref())
            .await?;
        Ok(candidates
            .into_iter()
            .filter(|id| allowed.contains(id))
            .collect())
    }

    async fn rerank(
        &self,
        req: &SearchRequest,
        candidates: Vec<ChunkId>,
    ) -> Result<(
        Vec<ChunkId>,
        std::collections::HashMap<ChunkId, f32>,
        bool,
    )> {
        let cap = self.config.max_rerank_candidates.min(candidates.len());
        let head: Vec<ChunkId> = candidates[..cap].to_vec();
        let tail: Vec<ChunkId> = candidates[cap..].to_vec();

        let records = self.metadata.get_many(&head).await?;
        let query = req.query.clone();
        let pairs: Vec<(String, String)> = records
            .iter()
            .map(|r| (query.clone(), r.code_text.clone()))
            .collect();

        let crossencoder = self.crossencoder.clone();
        let batch_size = 16;
        let timeout = Duration::from_secs_f64(self.config.rerank_timeout_seconds);

        let handle = tokio::task::spawn_blocking(move || crossencoder.score(&pairs, batch_size));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(scores))) => {
                let mut scored: Vec<(ChunkId, f32, usize)> = head
                    .iter()
                    .zip(scores.iter())
                    .enumerate()
                    .map(|(rank, (id, score))| (*id, *score, rank))
                    .collect();
                scored.sort_by(|a, b| match b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal) {
                    CmpOrdering::Equal => a.2.cmp(&b.2),
                    other => other,
                });
                let rerank_scores: std::collections::HashMap<ChunkId, f32> =
                    head.iter().zip(scores.iter()).map(|(id, s)| (*id, *s)).collect();
                let mut ordered: Vec<ChunkId> = scored.into_iter().map(|(id, _, _)| id).collect();
                ordered.extend(tail);
                Ok((ordered, rerank_scores, false))
            }
            _ => {
                // Timeout, join error, or scorer error: skip rerank, keep
                // retrieval order. The in-flight task (if any) is left to
                // finish and its result dropped, per the join-with-deadline
                // design.
                let mut ordered = head;
                ordered.extend(tail);
                Ok((ordered, std::collections::HashMap::new(), true))
            }
        }
    }
}

fn validate(req: &SearchRequest) -> Result<()> {
    if req.query.trim().is_empty() {
        return Err(HermesError::Validation("query must not be empty".to_string()));
    }
    if !(1..=1000).contains(&req.top_k_retrieve) {
        return Err(HermesError::Validation(
            "top_k_retrieve must be in 1..=1000".to_string(),
        ));
    }
    if !(1..=200).contains(&req.top_k_rerank) {
        return Err(HermesError::Validation(
            "top_k_rerank must be in 1..=200".to_string(),
        ));
    }
    if let Some(lang) = &req.filter_language {
        if lang.is_empty() {
            return Err(HermesError::Validation(
                "filter_language must not be empty when present".to_string(),
            ));
        }
    }
    if let Some(prefix) = &req.filter_path_prefix {
        if prefix.is_empty() {
            return Err(HermesError::Validation(
                "filter_path_prefix must not be empty when present".to_string(),
            ));
        }
    }
    Ok(())
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
