//! Provider trait - the abstraction over LLM backends.
//!
//! A Provider sends an ordered list of messages plus a model identifier and
//! returns one reply. It may also compute embeddings.
//!
//! Implementations: OpenAI-compatible endpoints (Groq, OpenAI, Ollama, vLLM).

use crate::error::ProviderError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "openai/gpt-oss-20b")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An embedding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// The model to use for embeddings.
    pub model: String,

    /// The texts to embed.
    pub inputs: Vec<String>,
}

/// An embedding response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The embedding vectors, one per input text.
    pub embeddings: Vec<Vec<f32>>,

    /// Which model was used.
    pub model: String,

    /// Token usage.
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// The chat pipeline treats the model as opaque: prompt in, text out. Any
/// error is surfaced to the caller without retry.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "groq", "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Generate embeddings for the given texts.
    ///
    /// Default implementation returns an error indicating embeddings aren't supported.
    async fn embed(
        &self,
        _request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }

    /// Health check - can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
