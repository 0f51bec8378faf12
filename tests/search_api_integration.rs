//! End-to-end HTTP surface tests: drives `serving::router` with
//! `tower::ServiceExt::oneshot` against pipelines assembled from in-memory
//! artifacts (see `common::build_pipeline`), so these exercise the real
//! request/response wire contract without touching a real embedding model.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{build_pipeline, flat_index, FixedEmbedder, SlowReranker};
use hermes::build::IndexBuildOrchestrator;
use hermes::config::Config;
use hermes::embed::{CrossEncoder, Embedder, Reranker};
use hermes::serving::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_state() -> AppState {
    let embedder: Arc<dyn Embedder> = Arc::new(FixedEmbedder);
    let orchestrator = Arc::new(IndexBuildOrchestrator::new(embedder));
    AppState::new(orchestrator, Config::default())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok_without_any_index() {
    let app = router(test_state());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn search_before_any_reload_returns_no_index_loaded() {
    let app = router(test_state());
    let request_body = serde_json::to_vec(&json!({ "query": "parse json" })).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(request_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(
        body["detail"],
        "No index loaded. Please index a repository first."
    );
}

/// S1 from spec.md §8: sparse retrieval ranks an exact keyword match first.
#[tokio::test]
async fn sparse_search_surfaces_exact_keyword_match() {
    let docs = [
        ("def calculate_bmi(weight, height): pass", "python", "a.py"),
        ("def compute_weight_ratio(w, h): pass", "python", "b.py"),
        ("def parse_json(s): pass", "python", "c.py"),
    ];
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new("test-cross-encoder"));
    let (pipeline, _dir) = build_pipeline(
        &docs,
        flat_index(3, 2, vec![]),
        crossencoder,
        hermes::config::SearchConfig::default(),
    )
    .await;

    let state = test_state();
    *state.pipeline.write().await = Some(Arc::new(pipeline));
    let app = router(state);

    let request_body = serde_json::to_vec(&json!({
        "query": "calculate_bmi",
        "retrieval_mode": "sparse",
        "top_k_retrieve": 3,
        "top_k_rerank": 3
    }))
    .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(request_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["results"][0]["chunk_id"], 0);
    assert_eq!(body["results"][0]["final_rank"], 1);
    assert_eq!(body["rerank_skipped"], false);
}

/// S4 from spec.md §8: `filter_language` restricts results to that language.
#[tokio::test]
async fn language_filter_excludes_other_languages() {
    let docs = [
        ("def a(): pass", "python", "a.py"),
        ("def b(): pass", "python", "b.py"),
        ("function c() {}", "typescript", "c.ts"),
    ];
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new("test-cross-encoder"));
    let (pipeline, _dir) = build_pipeline(
        &docs,
        flat_index(3, 2, vec![]),
        crossencoder,
        hermes::config::SearchConfig::default(),
    )
    .await;

    let state = test_state();
    *state.pipeline.write().await = Some(Arc::new(pipeline));
    let app = router(state);

    let request_body = serde_json::to_vec(&json!({
        "query": "def",
        "retrieval_mode": "sparse",
        "filter_language": "typescript"
    }))
    .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(request_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty());
    for result in results {
        assert_eq!(result["language"], "typescript");
    }
}

/// S5 from spec.md §8: a cross-encoder that sleeps past the deadline causes
/// the pipeline to skip rerank and keep retrieval order, over HTTP.
#[tokio::test]
async fn rerank_timeout_is_surfaced_as_skipped_not_as_an_error() {
    let docs = [
        ("alpha beta gamma", "text", "a.txt"),
        ("alpha beta delta", "text", "b.txt"),
        ("alpha epsilon zeta", "text", "c.txt"),
    ];
    let slow: Arc<dyn Reranker> = Arc::new(SlowReranker {
        delay: std::time::Duration::from_millis(200),
    });
    let mut config = hermes::config::SearchConfig::default();
    config.rerank_timeout_seconds = 0.02;
    let (pipeline, _dir) = build_pipeline(&docs, flat_index(3, 2, vec![]), slow, config).await;

    let state = test_state();
    *state.pipeline.write().await = Some(Arc::new(pipeline));
    let app = router(state);

    let request_body = serde_json::to_vec(&json!({
        "query": "alpha beta",
        "retrieval_mode": "sparse"
    }))
    .unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(request_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["rerank_skipped"], true);
    for result in body["results"].as_array().unwrap() {
        assert!(result["rerank_score"].is_null());
    }
}

/// Empty query is a validation failure, not a 500 or a silent empty result.
#[tokio::test]
async fn empty_query_returns_validation_error() {
    let docs = [("fn a() {}", "rust", "a.rs")];
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new("test-cross-encoder"));
    let (pipeline, _dir) = build_pipeline(
        &docs,
        flat_index(1, 2, vec![]),
        crossencoder,
        hermes::config::SearchConfig::default(),
    )
    .await;

    let state = test_state();
    *state.pipeline.write().await = Some(Arc::new(pipeline));
    let app = router(state);

    let request_body = serde_json::to_vec(&json!({ "query": "" })).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(request_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// `/stats` surfaces cache accounting alongside the loaded model names.
#[tokio::test]
async fn stats_reports_cache_counters_and_model_names() {
    let docs = [
        ("alpha beta", "text", "a.txt"),
        ("gamma delta", "text", "b.txt"),
    ];
    let crossencoder: Arc<dyn Reranker> = Arc::new(CrossEncoder::new("test-cross-encoder"));
    let (pipeline, _dir) = build_pipeline(
        &docs,
        flat_index(2, 2, vec![]),
        crossencoder,
        hermes::config::SearchConfig::default(),
    )
    .await;

    let state = test_state();
    *state.pipeline.write().await = Some(Arc::new(pipeline));
    let app = router(state);

    let search_body = serde_json::to_vec(&json!({
        "query": "alpha",
        "retrieval_mode": "sparse"
    }))
    .unwrap();
    let search_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/search")
                .header("content-type", "application/json")
                .body(Body::from(search_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(search_response.status(), StatusCode::OK);

    let stats_response = app
        .oneshot(
            Request::builder()
                .uri("/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stats_response.status(), StatusCode::OK);
    let body = body_json(stats_response).await;
    assert_eq!(body["n_chunks"], 2);
    assert_eq!(body["cache_misses"], 1);
    assert_eq!(body["crossencoder_model"], "test-cross-encoder");
}
