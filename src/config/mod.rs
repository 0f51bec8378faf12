use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chunk: ChunkConfig,
    pub embed: EmbedConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub max_chars: usize,
    pub overlap_lines: usize,
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: 1500,
            overlap_lines: 3,
            min_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedConfig {
    pub biencoder_model: String,
    pub biencoder_batch_size: usize,
    pub biencoder_max_length: usize,
    pub crossencoder_model: String,
    pub crossencoder_batch_size: usize,
    pub crossencoder_max_length: usize,
    pub query_cache_size: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            biencoder_model: "AllMiniLML6V2".to_string(),
            biencoder_batch_size: 64,
            biencoder_max_length: 512,
            crossencoder_model: "ms-marco-MiniLM-L-6-v2".to_string(),
            crossencoder_batch_size: 16,
            crossencoder_max_length: 512,
            query_cache_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub faiss_use_ivf: bool,
    pub faiss_nprobe: usize,
    pub faiss_ivf_nlist: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            faiss_use_ivf: false,
            faiss_nprobe: 8,
            faiss_ivf_nlist: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Dense,
    Sparse,
    Hybrid,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        RetrievalMode::Hybrid
    }
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dense" => Ok(RetrievalMode::Dense),
            "sparse" => Ok(RetrievalMode::Sparse),
            "hybrid" => Ok(RetrievalMode::Hybrid),
            other => Err(format!("unknown retrieval_mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub retrieval_mode: RetrievalMode,
    pub top_k_retrieve: usize,
    pub top_k_rerank: usize,
    pub max_rerank_candidates: usize,
    pub rerank_timeout_seconds: f64,
    pub rrf_k: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            retrieval_mode: RetrievalMode::Hybrid,
            top_k_retrieve: 100,
            top_k_rerank: 10,
            max_rerank_candidates: 50,
            rerank_timeout_seconds: 10.0,
            rrf_k: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub artifacts_dir: PathBuf,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from(".hermes/artifacts"),
            log_level: "INFO".to_string(),
            log_json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            embed: EmbedConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }
}
