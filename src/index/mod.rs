pub mod dense;
pub mod fusion;
pub mod sparse;

pub use dense::{DenseIndex, FlatIndex, IvfIndex};
pub use fusion::reciprocal_rank_fusion;
pub use sparse::{Bm25Params, SparseIndex};
