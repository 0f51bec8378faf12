//! Core data types shared across the indexing and serving planes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dense row position in the Metadata Store, the embedding matrix, and the
/// sparse index document space. One identifier space shared by all three
/// artifacts.
pub type ChunkId = u64;

/// An immutable record of one contiguous region of a source file.
///
/// `chunk_id` is assigned in insertion order starting at 0 and is the row
/// position shared by the Metadata Store, the dense embedding matrix, and the
/// sparse index. Divergence between these three is a fatal integrity error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol_name: Option<String>,
    pub code_text: String,
}

/// Per-build counters and timings, returned by the Index Build Orchestrator
/// and surfaced verbatim through `/index/status` when `state == done`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSummary {
    pub files_scanned: usize,
    pub chunks_produced: usize,
    pub chunks_per_language: HashMap<String, usize>,
    pub bytes_written: HashMap<String, u64>,
    pub scan_ms: f64,
    pub chunk_ms: f64,
    pub embed_ms: f64,
    pub build_ms: f64,
}

impl IndexSummary {
    pub fn total_ms(&self) -> f64 {
        self.scan_ms + self.chunk_ms + self.embed_ms + self.build_ms
    }
}
