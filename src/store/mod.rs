//! Metadata Store: the durable `chunk_id -> Chunk` mapping plus the
//! secondary `language` and `file_path` indexes that back filter pushdown.

use crate::error::{HermesError, Result};
use crate::types::{Chunk, ChunkId};
use async_trait::async_trait;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const CHUNK_PREFIX: &[u8] = b"chunk:";
const LANG_PREFIX: &[u8] = b"by_lang:";
const PATH_PREFIX: &[u8] = b"by_path:";

fn chunk_key(id: ChunkId) -> Vec<u8> {
    let mut key = CHUNK_PREFIX.to_vec();
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn lang_key(language: &str, id: ChunkId) -> Vec<u8> {
    let mut key = LANG_PREFIX.to_vec();
    key.extend_from_slice(language.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn path_key(file_path: &str, id: ChunkId) -> Vec<u8> {
    let mut key = PATH_PREFIX.to_vec();
    key.extend_from_slice(file_path.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_from_suffix(key: &[u8]) -> Option<ChunkId> {
    if key.len() < 8 {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[key.len() - 8..]);
    Some(ChunkId::from_be_bytes(bytes))
}

/// Durable mapping of `chunk_id -> Chunk` with filter pushdown on `language`
/// and `file_path` prefix. One store instance backs one live pipeline.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Appends `chunks`, preserving order. The i-th chunk's `chunk_id` must
    /// equal the store's count before this call plus `i`.
    async fn insert_many(&self, chunks: &[Chunk]) -> Result<()>;

    /// Order-preserving batch lookup. A missing id is a fatal integrity
    /// error: the caller has already validated these ids came from a
    /// successful retrieval against this same store.
    async fn get_many(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;

    /// Total number of chunks ever inserted.
    async fn count(&self) -> Result<usize>;

    /// Returns the set of chunk_ids matching both filters (AND). Either
    /// filter may be absent, in which case it is not applied.
    async fn filter_ids(
        &self,
        language: Option<&str>,
        path_prefix: Option<&str>,
    ) -> Result<HashSet<ChunkId>>;
}

/// RocksDB-backed [`MetadataStore`]. All I/O runs on the blocking thread
/// pool; the public API is async.
pub struct RocksDbMetadataStore {
    db: Arc<DB>,
    count: AtomicU64,
}

impl RocksDbMetadataStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);

        let db = match DB::open(&opts, path) {
            Ok(db) => db,
            Err(e) => {
                let err_str = e.to_string();
                if err_str.to_lowercase().contains("lock") {
                    let lock_file = path.join("LOCK");
                    if lock_file.exists() {
                        tracing::warn!("removing stale RocksDB LOCK file at {:?}", lock_file);
                        let _ = std::fs::remove_file(&lock_file);
                        DB::open(&opts, path).map_err(|e| {
                            HermesError::Integrity(format!(
                                "failed to open metadata store at {path:?} after lock cleanup: {e}"
                            ))
                        })?
                    } else {
                        return Err(HermesError::Integrity(format!(
                            "failed to open metadata store at {path:?}: {e}"
                        )));
                    }
                } else {
                    return Err(HermesError::Integrity(format!(
                        "failed to open metadata store at {path:?}: {e}"
                    )));
                }
            }
        };

        let count = Self::scan_count(&db);

        Ok(Self {
            db: Arc::new(db),
            count: AtomicU64::new(count),
        })
    }

    fn scan_count(db: &DB) -> u64 {
        let mut max_seen: i64 = -1;
        for item in db.prefix_iterator(CHUNK_PREFIX) {
            let Ok((key, _)) = item else { continue };
            if let Some(id) = id_from_suffix(&key) {
                max_seen = max_seen.max(id as i64);
            }
        }
        (max_seen + 1) as u64
    }
}

#[async_trait]
impl MetadataStore for RocksDbMetadataStore {
    async fn insert_many(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let db = self.db.clone();
        let start = self.count.load(Ordering::SeqCst);
        for (i, chunk) in chunks.iter().enumerate() {
            let expected = start + i as u64;
            if chunk.chunk_id != expected {
                return Err(HermesError::Integrity(format!(
                    "chunk_id {} out of order, expected {}",
                    chunk.chunk_id, expected
                )));
            }
        }

        let owned: Vec<Chunk> = chunks.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut batch = WriteBatch::default();
            for chunk in &owned {
                let value = bincode::serde::encode_to_vec(chunk, bincode::config::standard())
                    .map_err(|e| HermesError::Integrity(format!("encode chunk: {e}")))?;
                batch.put(chunk_key(chunk.chunk_id), value);
                batch.put(lang_key(&chunk.language, chunk.chunk_id), []);
                batch.put(path_key(&chunk.file_path, chunk.chunk_id), []);
            }
            db.write(batch)
                .map_err(|e| HermesError::Integrity(format!("metadata store write: {e}")))
        })
        .await
        .map_err(|e| HermesError::Integrity(format!("join error: {e}")))??;

        self.count.fetch_add(chunks.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn get_many(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let db = self.db.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Vec<Chunk>> {
            let mut out = Vec::with_capacity(ids.len());
            for id in ids {
                let key = chunk_key(id);
                match db
                    .get(&key)
                    .map_err(|e| HermesError::Integrity(format!("metadata store read: {e}")))?
                {
                    Some(bytes) => {
                        let (chunk, _): (Chunk, usize) = bincode::serde::decode_from_slice(
                            &bytes,
                            bincode::config::standard(),
                        )
                        .map_err(|e| HermesError::Integrity(format!("decode chunk: {e}")))?;
                        out.push(chunk);
                    }
                    None => {
                        return Err(HermesError::Integrity(format!(
                            "chunk_id {id} missing from metadata store"
                        )))
                    }
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| HermesError::Integrity(format!("join error: {e}")))?
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.count.load(Ordering::SeqCst) as usize)
    }

    async fn filter_ids(
        &self,
        language: Option<&str>,
        path_prefix: Option<&str>,
    ) -> Result<HashSet<ChunkId>> {
        let db = self.db.clone();
        let language = language.map(str::to_string);
        let path_prefix = path_prefix.map(str::to_string);

        tokio::task::spawn_blocking(move || -> Result<HashSet<ChunkId>> {
            let lang_ids = language.as_ref().map(|lang| {
                let mut prefix = LANG_PREFIX.to_vec();
                prefix.extend_from_slice(lang.as_bytes());
                prefix.push(0);
                let mut ids = HashSet::new();
                for item in db.iterator(IteratorMode::From(&prefix, rocksdb::Direction::Forward)) {
                    let Ok((key, _)) = item else { continue };
                    if !key.starts_with(&prefix) {
                        break;
                    }
                    if let Some(id) = id_from_suffix(&key) {
                        ids.insert(id);
                    }
                }
                ids
            });

            let path_ids = path_prefix.as_ref().map(|prefix_str| {
                let scan_prefix = PATH_PREFIX.to_vec();
                let mut ids = HashSet::new();
                for item in db.prefix_iterator(&scan_prefix) {
                    let Ok((key, _)) = item else { continue };
                    let Some(rest) = key.strip_prefix(PATH_PREFIX) else {
                        continue;
                    };
                    let Some(nul_pos) = rest.iter().position(|&b| b == 0) else {
                        continue;
                    };
                    let path = String::from_utf8_lossy(&rest[..nul_pos]);
                    if path.starts_with(prefix_str.as_str()) {
                        if let Some(id) = id_from_suffix(key.as_ref()) {
                            ids.insert(id);
                        }
                    }
                }
                ids
            });

            Ok(match (lang_ids, path_ids) {
                (Some(a), Some(b)) => a.intersection(&b).copied().collect(),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => {
                    let total = Self::scan_count(&db);
                    (0..total).collect()
                }
            })
        })
        .await
        .map_err(|e| HermesError::Integrity(format!("join error: {e}")))?
    }
}
