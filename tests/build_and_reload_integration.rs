//! S6 from spec.md §8: build an index, load its artifacts, and serve a
//! search against the freshly loaded pipeline — without a server restart.
//! `serving::load_pipeline` hardcodes a real `BiEncoder`/`CrossEncoder`
//! (which would need downloaded model weights), so this test reproduces its
//! artifact-loading logic with the stub models from `common`, the same
//! substitution the unit tests in `src/search/pipeline.rs` and
//! `src/build/orchestrator.rs` already make.

mod common;

use common::FixedEmbedder;
use hermes::build::IndexBuildOrchestrator;
use hermes::config::Config;
use hermes::embed::{CrossEncoder, Embedder, QueryEmbeddingCache, Reranker};
use hermes::index::{DenseIndex, FlatIndex, SparseIndex};
use hermes::search::SearchPipeline;
use hermes::store::{MetadataStore, RocksDbMetadataStore};
use std::sync::Arc;

#[tokio::test]
async fn build_then_load_serves_search_without_restart() {
    let repo = tempfile::tempdir().unwrap();
    std::fs::write(
        repo.path().join("bmi.py"),
        "def calculate_bmi(weight, height):\n    return weight / (height * height)\n",
    )
    .unwrap();
    std::fs::write(
        repo.path().join("parse.py"),
        "def parse_json(s):\n    return json.loads(s)\n",
    )
    .unwrap();

    let artifacts_parent = tempfile::tempdir().unwrap();
    let artifacts_dir = artifacts_parent.path().join("artifacts");

    let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder);
    let orchestrator = IndexBuildOrchestrator::new(embedder);
    let config = Config::default();

    let summary = orchestrator
        .run(repo.path(), &config, &artifacts_dir)
        .await
        .unwrap();
    assert_eq!(summary.files_scanned, 2);
    assert!(summary.chunks_produced >= 2);

    // Reproduce `serving::load_pipeline`'s artifact-loading steps with stub
    // models standing in for the real BiEncoder/CrossEncoder.
    let dense: Arc<dyn DenseIndex> = Arc::new(FlatIndex::load(&artifacts_dir.join("faiss.index")).unwrap());
    let sparse = Arc::new(SparseIndex::load(&artifacts_dir.join("sparse_index.json")).unwrap());
    let metadata: Arc<dyn MetadataStore> =
        Arc::new(RocksDbMetadataStore::open(&artifacts_dir.join("metadata.db")).unwrap());
    let biencoder: Arc<dyn Embedder> = Arc::new(FixedEmbedder);
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new("test-cross-encoder"));
    let cache = Arc::new(QueryEmbeddingCache::new(config.embed.query_cache_size));

    // `/stats.n_chunks` after a fresh load must match the build summary's
    // chunk count (spec.md §8 invariant 8).
    assert_eq!(dense.len().max(sparse.len()), summary.chunks_produced);

    let pipeline = SearchPipeline::new(
        dense,
        sparse,
        metadata,
        biencoder,
        crossencoder,
        cache,
        config.search.clone(),
    );

    let req = hermes::search::SearchRequest {
        query: "calculate_bmi".to_string(),
        top_k_retrieve: 10,
        top_k_rerank: 5,
        retrieval_mode: hermes::config::RetrievalMode::Sparse,
        filter_language: None,
        filter_path_prefix: None,
        return_snippets: true,
    };
    let response = pipeline.search(req).await.unwrap();
    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].file_path, "bmi.py");
}
