pub mod biencoder;
pub mod cache;
pub mod crossencoder;

pub use biencoder::{BiEncoder, Embedder};
pub use cache::QueryEmbeddingCache;
pub use crossencoder::{CrossEncoder, Reranker};
