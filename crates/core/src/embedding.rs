//! Embedder trait - text to fixed-length vector.

use crate::error::RetrievalError;
use async_trait::async_trait;

/// Computes embeddings for retrieval.
///
/// Must be deterministic for identical input under a fixed model, and every
/// vector must have exactly `dimensions()` components.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}
