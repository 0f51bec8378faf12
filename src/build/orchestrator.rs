//! Index Build Orchestrator: scan -> chunk -> embed -> build -> write+rename.
//!
//! Exposes a state machine (`idle -> indexing -> done | error`) readable by
//! the serving surface, and guarantees the three co-registered artifacts
//! (Metadata Store, Dense Index, Sparse Index) are built from one ordered
//! chunk list in a single pass — never a partial rebuild.

use crate::chunk::{Chunker, HeuristicChunker, RawChunk, TreeSitterChunker};
use crate::config::Config;
use crate::embed::Embedder;
use crate::error::{HermesError, Result};
use crate::index::{Bm25Params, FlatIndex, IvfIndex, SparseIndex};
use crate::store::RocksDbMetadataStore;
use crate::types::{Chunk, IndexSummary};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

const IGNORE_DIRS: &[&str] = &["node_modules", "target", ".git", "dist", "build", ".hermes"];

/// Corpus size at which the dense backend switches from exact `FlatIndex` to
/// approximate `IvfIndex` even without `faiss_use_ivf` set.
const FLAT_INDEX_MAX_CHUNKS: usize = 100_000;

fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "rs" => Some("rust"),
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" => Some("javascript"),
        "py" => Some("python"),
        "go" => Some("go"),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum IndexingState {
    Idle,
    Indexing { repo_path: String },
    Done { repo_path: String, summary: IndexSummary },
    Error { repo_path: String, message: String },
}

pub struct IndexBuildOrchestrator {
    state: Mutex<IndexingState>,
    embedder: Arc<dyn Embedder>,
}

impl IndexBuildOrchestrator {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            state: Mutex::new(IndexingState::Idle),
            embedder,
        }
    }

    pub async fn status(&self) -> IndexingState {
        self.state.lock().await.clone()
    }

    /// Runs one build to completion. Only one job may be in flight per
    /// process; callers dispatch this from a background task and poll
    /// [`status`] rather than awaiting it directly from an HTTP handler.
    pub async fn run(&self, repo_path: &Path, config: &Config, artifacts_dir: &Path) -> Result<IndexSummary> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, IndexingState::Indexing { .. }) {
                return Err(HermesError::Indexing(
                    "an indexing job is already in flight".to_string(),
                ));
            }
            *state = IndexingState::Indexing {
                repo_path: repo_path.display().to_string(),
            };
        }

        match self.run_inner(repo_path, config, artifacts_dir).await {
            Ok(summary) => {
                *self.state.lock().await = IndexingState::Done {
                    repo_path: repo_path.display().to_string(),
                    summary: summary.clone(),
                };
                Ok(summary)
            }
            Err(e) => {
                *self.state.lock().await = IndexingState::Error {
                    repo_path: repo_path.display().to_string(),
                    message: e.to_string(),
                };
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        repo_path: &Path,
        config: &Config,
        artifacts_dir: &Path,
    ) -> Result<IndexSummary> {
        // Phase 1: scan.
        let scan_start = Instant::now();
        let files = scan(repo_path)?;
        let scan_ms = scan_start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(files = files.len(), duration_ms = scan_ms, "scan complete");

        // Phase 2: chunk.
        let chunk_start = Instant::now();
        let heuristic = HeuristicChunker;
        let tree_sitter = TreeSitterChunker::new();
        let mut raw_chunks: Vec<(String, RawChunk)> = Vec::new();
        let mut chunks_per_language: HashMap<String, usize> = HashMap::new();

        for (path, language) in &files {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| HermesError::Indexing(format!("reading {path:?}: {e}")))?;
            let chunker: &dyn Chunker = if language == "rust" {
                &tree_sitter
            } else {
                &heuristic
            };
            let file_chunks = chunker.chunk(language, &text, &config.chunk);
            let rel_path = path
                .strip_prefix(repo_path)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            for rc in file_chunks {
                *chunks_per_language.entry(rc.language.clone()).or_insert(0) += 1;
                raw_chunks.push((rel_path.clone(), rc));
            }
        }
        let chunk_ms = chunk_start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            chunks = raw_chunks.len(),
            duration_ms = chunk_ms,
            "chunk complete"
        );

        // Phase 3: embed (batched).
        let embed_start = Instant::now();
        let texts: Vec<String> = raw_chunks.iter().map(|(_, rc)| rc.code_text.clone()).collect();
        let embeddings = self
            .embedder
            .encode_batch(&texts, config.embed.biencoder_batch_size)
            .await?;
        if embeddings.len() != raw_chunks.len() {
            return Err(HermesError::Integrity(
                "embedder returned a different row count than the chunk list".to_string(),
            ));
        }
        let embed_ms = embed_start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(duration_ms = embed_ms, "embed complete");

        // Phase 4: build dense, sparse, metadata artifacts from the single
        // ordered chunk list.
        let build_start = Instant::now();
        let chunks: Vec<Chunk> = raw_chunks
            .iter()
            .enumerate()
            .map(|(i, (path, rc))| Chunk {
                chunk_id: i as u64,
                file_path: path.clone(),
                language: rc.language.clone(),
                start_line: rc.start_line,
                end_line: rc.end_line,
                symbol_name: rc.symbol_name.clone(),
                code_text: rc.code_text.clone(),
            })
            .collect();

        let use_ivf = select_ivf(config.index.faiss_use_ivf, embeddings.len());
        let dense = if use_ivf {
            let index = IvfIndex::train(
                &embeddings,
                self.embedder.dim(),
                config.index.faiss_ivf_nlist,
                config.index.faiss_nprobe,
            );
            DenseBuilt::Ivf(index)
        } else {
            DenseBuilt::Flat(FlatIndex::from_matrix(embeddings.clone(), self.embedder.dim()))
        };

        let bm25_docs: Vec<(u64, &str)> = chunks
            .iter()
            .map(|c| (c.chunk_id, c.code_text.as_str()))
            .collect();
        let sparse = SparseIndex::build(&bm25_docs, Bm25Params::default());

        // Write to a staging directory, then rename the group into place —
        // atomic from the serving plane's perspective.
        let staging = artifacts_dir.with_extension("staging");
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| HermesError::Indexing(format!("creating staging dir: {e}")))?;

        let mut bytes_written = HashMap::new();
        match &dense {
            DenseBuilt::Flat(index) => {
                index.save(&staging.join("faiss.index"))?;
            }
            DenseBuilt::Ivf(index) => {
                index.save(&staging.join("faiss.index"))?;
            }
        }
        bytes_written.insert(
            "faiss.index".to_string(),
            std::fs::metadata(staging.join("faiss.index"))
                .map(|m| m.len())
                .unwrap_or(0),
        );

        sparse.save(&staging.join("sparse_index.json"))?;
        bytes_written.insert(
            "sparse_index.json".to_string(),
            std::fs::metadata(staging.join("sparse_index.json"))
                .map(|m| m.len())
                .unwrap_or(0),
        );

        let metadata_path = staging.join("metadata.db");
        let store = RocksDbMetadataStore::open(&metadata_path)?;
        store.insert_many(&chunks).await?;
        drop(store);

        if artifacts_dir.exists() {
            tokio::fs::remove_dir_all(artifacts_dir)
                .await
                .map_err(|e| HermesError::Indexing(format!("removing old artifacts: {e}")))?;
        }
        if let Some(parent) = artifacts_dir.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::rename(&staging, artifacts_dir)
            .await
            .map_err(|e| HermesError::Indexing(format!("renaming staging into place: {e}")))?;

        let build_ms = build_start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(duration_ms = build_ms, "build complete");

        Ok(IndexSummary {
            files_scanned: files.len(),
            chunks_produced: chunks.len(),
            chunks_per_language,
            bytes_written,
            scan_ms,
            chunk_ms,
            embed_ms,
            build_ms,
        })
    }
}

enum DenseBuilt {
    Flat(FlatIndex),
    Ivf(IvfIndex),
}

/// Dense backend selection: IVF if the operator asked for it, or if the
/// corpus is too large for a brute-force `FlatIndex` to stay cheap.
fn select_ivf(configured: bool, n_chunks: usize) -> bool {
    configured || n_chunks >= FLAT_INDEX_MAX_CHUNKS
}

fn scan(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut out = Vec::new();
    scan_dir(root, &mut out)?;
    Ok(out)
}

fn scan_dir(dir: &Path, out: &mut Vec<(PathBuf, String)>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| HermesError::Indexing(format!("reading dir {dir:?}: {e}")))?;

    for entry in entries {
        let entry = entry.map_err(|e| HermesError::Indexing(format!("dir entry: {e}")))?;
        let path = entry.path();
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if IGNORE_DIRS.iter().any(|ignored| name_str == *ignored) {
            continue;
        }

        if path.is_dir() {
            scan_dir(&path, out)?;
        } else if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            if let Some(language) = language_for_extension(ext) {
                out.push((path, language.to_string()));
            }
        }
    }
    Ok(())
}
