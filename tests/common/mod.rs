//! Shared test scaffolding for HERMES integration tests: stub model
//! implementations that avoid loading real embedding weights, plus a helper
//! to assemble a [`hermes::search::SearchPipeline`] directly from in-memory
//! artifacts.

use async_trait::async_trait;
use hermes::embed::{Embedder, QueryEmbeddingCache, Reranker};
use hermes::error::Result;
use hermes::index::{Bm25Params, DenseIndex, FlatIndex, SparseIndex};
use hermes::search::SearchPipeline;
use hermes::store::{MetadataStore, RocksDbMetadataStore};
use hermes::types::{Chunk, ChunkId};
use std::sync::Arc;

/// A deterministic bi-encoder stand-in: every text maps to the unit vector
/// `[1.0, 0.0]`. Lets tests exercise dense/hybrid retrieval without
/// downloading model weights.
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn encode_one(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn encode_batch(&self, texts: &[String], _batch_size: usize) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn model_name(&self) -> &str {
        "fixed-test-embedder"
    }

    fn dim(&self) -> usize {
        2
    }
}

/// Scores every pair 1.0 after a fixed sleep, long enough to trip a short
/// `rerank_timeout_seconds` in tests exercising the timeout-skip path.
pub struct SlowReranker {
    pub delay: std::time::Duration,
}

impl Reranker for SlowReranker {
    fn score(&self, pairs: &[(String, String)], _batch_size: usize) -> Result<Vec<f32>> {
        std::thread::sleep(self.delay);
        Ok(pairs.iter().map(|_| 1.0).collect())
    }

    fn model_name(&self) -> &str {
        "slow-test-reranker"
    }
}

pub fn make_chunk(id: ChunkId, text: &str, lang: &str, path: &str) -> Chunk {
    Chunk {
        chunk_id: id,
        file_path: path.to_string(),
        language: lang.to_string(),
        start_line: 1,
        end_line: 1,
        symbol_name: None,
        code_text: text.to_string(),
    }
}

/// Assembles a ready [`SearchPipeline`] from an in-memory corpus, a chosen
/// dense index, and a chosen cross-encoder — bypassing `load_pipeline`'s
/// real `BiEncoder::new`/`CrossEncoder::new` so tests never touch the
/// network or model cache.
pub async fn build_pipeline(
    docs: &[(&str, &str, &str)],
    dense: Arc<dyn DenseIndex>,
    crossencoder: Arc<dyn Reranker>,
    config: hermes::config::SearchConfig,
) -> (SearchPipeline, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksDbMetadataStore::open(dir.path()).unwrap());
    let chunks: Vec<Chunk> = docs
        .iter()
        .enumerate()
        .map(|(i, (text, lang, path))| make_chunk(i as ChunkId, text, lang, path))
        .collect();
    store.insert_many(&chunks).await.unwrap();

    let bm25_docs: Vec<(ChunkId, &str)> = docs
        .iter()
        .enumerate()
        .map(|(i, (text, _, _))| (i as ChunkId, *text))
        .collect();
    let sparse = Arc::new(SparseIndex::build(&bm25_docs, Bm25Params::default()));

    let metadata: Arc<dyn MetadataStore> = store;
    let biencoder: Arc<dyn Embedder> = Arc::new(FixedEmbedder);
    let cache = Arc::new(QueryEmbeddingCache::new(16));

    let pipeline = SearchPipeline::new(dense, sparse, metadata, biencoder, crossencoder, cache, config);
    (pipeline, dir)
}

/// `FlatIndex` built from one embedding per doc in the same order, so
/// `chunk_id == index`. Every row gets the same `FixedEmbedder` vector
/// unless `vectors` overrides specific rows.
pub fn flat_index(n: usize, dim: usize, vectors: Vec<Vec<f32>>) -> Arc<dyn DenseIndex> {
    let rows = if vectors.is_empty() {
        vec![vec![1.0, 0.0]; n]
    } else {
        vectors
    };
    Arc::new(FlatIndex::from_matrix(rows, dim))
}
