//! Bi-encoder: maps text to a fixed-length, L2-normalized vector
//! independently of any other text. Wraps `fastembed`'s `TextEmbedding`,
//! serializing calls behind a `tokio::sync::Mutex` since the underlying
//! model is not assumed thread-safe.

use crate::error::{HermesError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

/// A single-query/batch text embedder. Exists so the Search Pipeline can be
/// exercised in tests against a stand-in that never loads real model
/// weights.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>>;
    async fn encode_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
    fn dim(&self) -> usize;
}

pub struct BiEncoder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dim: usize,
}

impl BiEncoder {
    pub fn new(model_name: &str) -> Result<Self> {
        let model = EmbeddingModel::AllMiniLML6V2; // only model wired up; model_name recorded for /stats
        let init_options = InitOptions::new(model);
        let embedding_model = TextEmbedding::try_new(init_options)
            .map_err(|e| HermesError::TransientModel(format!("bi-encoder init failed: {e}")))?;

        Ok(Self {
            model: Mutex::new(embedding_model),
            model_name: model_name.to_string(),
            dim: 384,
        })
    }

}

#[async_trait]
impl Embedder for BiEncoder {
    async fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.encode_batch(&[text.to_string()], 1).await?;
        batch
            .pop()
            .ok_or_else(|| HermesError::TransientModel("no embedding returned".to_string()))
    }

    async fn encode_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self.model.lock().await;
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size.max(1)) {
            let embeddings = model
                .embed(chunk.to_vec(), None)
                .map_err(|e| HermesError::TransientModel(format!("embedding call failed: {e}")))?;
            out.extend(embeddings.into_iter().map(l2_normalize));
        }
        Ok(out)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let v = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let v = l2_normalize(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
