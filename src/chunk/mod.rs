//! Chunking: splitting a source file's text into metadata-bearing [`Chunk`]s.
//!
//! Two implementations sit behind one [`Chunker`] trait — the polymorphism
//! point named in the design notes. [`HeuristicChunker`] is language-agnostic
//! and always available; [`TreeSitterChunker`] chunks Rust source along
//! top-level item boundaries using the grammar already vendored for symbol
//! extraction elsewhere in this crate.

use crate::config::ChunkConfig;

/// One chunk of source text prior to `chunk_id` assignment (assigned by the
/// orchestrator when all chunks from all files are known).
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub symbol_name: Option<String>,
    pub code_text: String,
}

/// Splits one file's text into chunks. Implementations never see other
/// files; cross-file concerns (id assignment, ordering) live in the
/// orchestrator.
pub trait Chunker: Send + Sync {
    fn chunk(&self, language: &str, text: &str, config: &ChunkConfig) -> Vec<RawChunk>;
}

/// Blank-line- and size-bounded splitting. Works for any language: walks
/// lines, accumulates until `max_chars`, then starts a new chunk, carrying
/// `overlap_lines` of trailing context forward so a boundary never splits
/// a concept a human would have kept together.
pub struct HeuristicChunker;

impl Chunker for HeuristicChunker {
    fn chunk(&self, language: &str, text: &str, config: &ChunkConfig) -> Vec<RawChunk> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start_idx = 0usize;

        while start_idx < lines.len() {
            let mut end_idx = start_idx;
            let mut char_count = 0usize;

            while end_idx < lines.len() {
                let line_len = lines[end_idx].len() + 1;
                if char_count > 0 && char_count + line_len > config.max_chars {
                    break;
                }
                char_count += line_len;
                end_idx += 1;
            }
            // Guarantee progress even if a single line exceeds max_chars.
            if end_idx == start_idx {
                end_idx = start_idx + 1;
            }

            let body = lines[start_idx..end_idx].join("\n");
            if body.len() >= config.min_chars || end_idx == lines.len() {
                chunks.push(RawChunk {
                    language: language.to_string(),
                    start_line: (start_idx + 1) as u32,
                    end_line: end_idx as u32,
                    symbol_name: None,
                    code_text: body,
                });
            }

            if end_idx >= lines.len() {
                break;
            }
            start_idx = end_idx.saturating_sub(config.overlap_lines).max(start_idx + 1);
        }

        chunks
    }
}

/// AST-aware chunking for Rust, splitting along top-level item boundaries
/// (functions, structs, enums, traits, impls) so each chunk is a single
/// semantic unit instead of an arbitrary character window. Falls back to
/// [`HeuristicChunker`] behavior for files the grammar fails to parse.
pub struct TreeSitterChunker {
    heuristic: HeuristicChunker,
}

impl TreeSitterChunker {
    pub fn new() -> Self {
        Self {
            heuristic: HeuristicChunker,
        }
    }

    fn chunk_rust(&self, text: &str, config: &ChunkConfig) -> Option<Vec<RawChunk>> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&tree_sitter_rust::LANGUAGE.into())
            .ok()?;
        let tree = parser.parse(text, None)?;
        let root = tree.root_node();

        let bytes = text.as_bytes();
        let mut chunks = Vec::new();
        let mut cursor = root.walk();

        for child in root.children(&mut cursor) {
            if !is_top_level_item(child.kind()) {
                continue;
            }
            let start = child.start_byte();
            let end = child.end_byte();
            if end <= start {
                continue;
            }
            let code_text = String::from_utf8_lossy(&bytes[start..end]).to_string();
            if code_text.len() < config.min_chars {
                continue;
            }
            chunks.push(RawChunk {
                language: "rust".to_string(),
                start_line: child.start_position().row as u32 + 1,
                end_line: child.end_position().row as u32 + 1,
                symbol_name: item_name(child, bytes),
                code_text,
            });
        }

        if chunks.is_empty() {
            None
        } else {
            Some(chunks)
        }
    }
}

impl Default for TreeSitterChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for TreeSitterChunker {
    fn chunk(&self, language: &str, text: &str, config: &ChunkConfig) -> Vec<RawChunk> {
        if language == "rust" {
            if let Some(chunks) = self.chunk_rust(text, config) {
                return chunks;
            }
        }
        self.heuristic.chunk(language, text, config)
    }
}

fn is_top_level_item(kind: &str) -> bool {
    matches!(
        kind,
        "function_item"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "impl_item"
            | "mod_item"
            | "const_item"
            | "static_item"
    )
}

fn item_name(node: tree_sitter::Node, bytes: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" || child.kind() == "type_identifier" {
            return Some(String::from_utf8_lossy(&bytes[child.start_byte()..child.end_byte()]).to_string());
        }
    }
    None
}
