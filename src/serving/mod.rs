//! Serving Surface: a thin axum facade exposing search, stats, health, and
//! index lifecycle, stateless except for the pipeline atomic reference and
//! the indexing job state.

use crate::build::IndexBuildOrchestrator;
use crate::config::Config;
use crate::embed::{BiEncoder, CrossEncoder, Embedder, QueryEmbeddingCache, Reranker};
use crate::error::{HermesError, Result};
use crate::index::{DenseIndex, FlatIndex, IvfIndex, SparseIndex};
use crate::search::{SearchPipeline, SearchRequest, Stats};
use crate::store::{MetadataStore, RocksDbMetadataStore};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Loads the dense index, sparse index, and metadata store from
/// `config.general.artifacts_dir` and assembles a ready [`SearchPipeline`].
pub async fn load_pipeline(config: &Config) -> Result<SearchPipeline> {
    let artifacts_dir = &config.general.artifacts_dir;
    let dense: Arc<dyn DenseIndex> = if config.index.faiss_use_ivf {
        Arc::new(IvfIndex::load(&artifacts_dir.join("faiss.index"))?)
    } else {
        Arc::new(FlatIndex::load(&artifacts_dir.join("faiss.index"))?)
    };
    let sparse = Arc::new(SparseIndex::load(&artifacts_dir.join("sparse_index.json"))?);
    let metadata: Arc<dyn MetadataStore> =
        Arc::new(RocksDbMetadataStore::open(&artifacts_dir.join("metadata.db"))?);
    let biencoder: Arc<dyn Embedder> = Arc::new(BiEncoder::new(&config.embed.biencoder_model)?);
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new(&config.embed.crossencoder_model));
    let cache = Arc::new(QueryEmbeddingCache::new(config.embed.query_cache_size));

    Ok(SearchPipeline::new(
        dense,
        sparse,
        metadata,
        biencoder,
        crossencoder,
        cache,
        config.search.clone(),
    ))
}

fn artifacts_exist(config: &Config) -> bool {
    config.general.artifacts_dir.join("metadata.db").exists()
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RwLock<Option<Arc<SearchPipeline>>>>,
    pub orchestrator: Arc<IndexBuildOrchestrator>,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<IndexBuildOrchestrator>, config: Config) -> Self {
        Self {
            pipeline: Arc::new(RwLock::new(None)),
            orchestrator,
            config: Arc::new(RwLock::new(config)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/index/check", get(index_check))
        .route("/index/status", get(index_status))
        .route("/index", post(start_index))
        .route("/reload-index", post(reload_index))
        .route("/stats", get(stats))
        .route("/search", post(search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn no_index_loaded_response() -> axum::response::Response {
    HermesError::NoIndexLoaded.into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn index_check(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.config.read().await;
    Json(json!({ "has_index": artifacts_exist(&config) }))
}

async fn index_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.orchestrator.status().await)
}

#[derive(Debug, Deserialize)]
struct StartIndexRequest {
    repo_path: String,
}

async fn start_index(
    State(state): State<AppState>,
    Json(req): Json<StartIndexRequest>,
) -> impl IntoResponse {
    let config = state.config.read().await.clone();
    let repo_path = std::path::PathBuf::from(req.repo_path);
    let orchestrator = state.orchestrator.clone();

    tokio::spawn(async move {
        let artifacts_dir = config.general.artifacts_dir.clone();
        if let Err(e) = orchestrator.run(&repo_path, &config, &artifacts_dir).await {
            tracing::error!(error = %e, "indexing job failed");
        }
    });

    Json(json!({ "message": "indexing started" }))
}

async fn reload_index(State(state): State<AppState>) -> axum::response::Response {
    let config = state.config.read().await.clone();
    if !artifacts_exist(&config) {
        return no_index_loaded_response().await;
    }

    match load_pipeline(&config).await {
        Ok(pipeline) => {
            let n_chunks = pipeline.n_chunks();
            *state.pipeline.write().await = Some(Arc::new(pipeline));
            Json(json!({ "n_chunks": n_chunks })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn stats(State(state): State<AppState>) -> axum::response::Response {
    let pipeline = state.pipeline.read().await.clone();
    let Some(pipeline) = pipeline else {
        return no_index_loaded_response().await;
    };
    let config = state.config.read().await;
    let n_chunks = pipeline.n_chunks();
    let cache = pipeline.cache();
    let response = Stats {
        index_size: n_chunks,
        n_chunks,
        cache_hits: cache.hits(),
        cache_misses: cache.misses(),
        cache_hit_rate: cache.hit_rate(),
        retrieval_mode: config.search.retrieval_mode,
        biencoder_model: pipeline.biencoder_model().to_string(),
        crossencoder_model: pipeline.crossencoder_model().to_string(),
    };
    Json(response).into_response()
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> axum::response::Response {
    let pipeline = state.pipeline.read().await.clone();
    let Some(pipeline) = pipeline else {
        return no_index_loaded_response().await;
    };
    match pipeline.search(req).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => e.into_response(),
    }
}
