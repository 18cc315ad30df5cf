//! Embedders: deterministic feature hashing and provider-backed vectors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netintent_config::{AppConfig, EmbeddingBackend};
use netintent_core::embedding::Embedder;
use netintent_core::error::{ProviderError, RetrievalError};
use netintent_core::provider::{EmbeddingRequest, Provider};
use netintent_providers::OpenAiCompatProvider;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Signed feature hashing over lowercase word tokens, L2-normalized.
///
/// Needs no model and no network. Texts sharing words land close together,
/// which is enough to rank a small sample library.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous form of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        for token in tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut idx_bytes = [0u8; 8];
            idx_bytes.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(idx_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] % 2 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_text(text))
    }
}

/// Embeddings from a provider's `/embeddings` endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimensions: usize,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        let vector = response.embeddings.into_iter().next().ok_or_else(|| {
            RetrievalError::EmbeddingFailed("provider returned no embeddings".into())
        })?;

        if vector.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }

        debug!(model = %self.model, dims = vector.len(), "Embedded text");
        Ok(vector)
    }
}

/// Build the embedder selected by `[embedding]`.
///
/// The `openai_compat` backend borrows the provider URL and key when the
/// embedding section leaves them unset.
pub fn embedder_from_config(
    config: &AppConfig,
) -> std::result::Result<Arc<dyn Embedder>, ProviderError> {
    let emb = &config.embedding;
    match emb.backend {
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbedder::new(emb.dimensions))),
        EmbeddingBackend::OpenaiCompat => {
            let api_url = emb
                .api_url
                .clone()
                .unwrap_or_else(|| config.provider.api_url.clone());
            let api_key = emb
                .api_key
                .clone()
                .or_else(|| config.provider.api_key.clone())
                .ok_or_else(|| {
                    ProviderError::NotConfigured(
                        "No API key for embeddings. Set embedding.api_key or provider.api_key"
                            .into(),
                    )
                })?;
            let provider = OpenAiCompatProvider::with_timeout(
                "embeddings",
                api_url,
                api_key,
                Duration::from_secs(config.retrieval.timeout_secs),
            );
            Ok(Arc::new(ProviderEmbedder::new(
                Arc::new(provider),
                emb.model.clone(),
                emb.dimensions,
            )))
        }
    }
}
