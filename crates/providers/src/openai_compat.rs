//! OpenAI-compatible provider implementation.
//!
//! Works with: Groq (default), OpenAI, Ollama, vLLM, and any endpoint that
//! exposes `/chat/completions` and `/embeddings`.

use async_trait::async_trait;
use netintent_config::ProviderConfig;
use netintent_core::error::ProviderError;
use netintent_core::message::Message;
use netintent_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider with a 120s request timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::with_timeout(name, base_url, api_key, Duration::from_secs(120))
    }

    pub fn with_timeout(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {e}");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create a Groq provider (convenience constructor).
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::new("groq", "https://api.groq.com/openai/v1", api_key)
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Self {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Build from the `[provider]` config section.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "No API key. Set GROQ_API_KEY or provider.api_key in config.toml".into(),
            )
        })?;
        let name = if config.api_url.contains("groq.com") {
            "groq"
        } else {
            "openai_compat"
        };
        Ok(Self::with_timeout(
            name,
            config.api_url.clone(),
            api_key,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
            })
            .collect()
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ModelNotFound(error_body));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl netintent_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self.post("chat/completions", &body).await?;

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: Message::assistant(choice.message.content.unwrap_or_default()),
            usage,
            model: api_response.model,
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let body = serde_json::json!({
            "model": request.model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post("embeddings", &body).await?;

        let api_resp: EmbeddingApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse embedding response: {e}"),
            })?;

        let embeddings = api_resp.data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model,
            usage,
        })
    }
}

// --- OpenAI API types (private) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use netintent_core::Provider;

    #[test]
    fn groq_constructor() {
        let provider = OpenAiCompatProvider::groq("gsk-test");
        assert_eq!(provider.name(), "groq");
        assert!(provider.base_url.contains("api.groq.com"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None);
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let provider = OpenAiCompatProvider::new("x", "http://host/v1/", "k");
        assert_eq!(provider.base_url(), "http://host/v1");
    }

    #[test]
    fn from_config_requires_key() {
        let config = ProviderConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = ProviderConfig {
            api_key: Some("gsk".into()),
            ..ProviderConfig::default()
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.name(), "groq");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::assistant("Hi"),
        ];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 3);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert_eq!(api_messages[2].role, "assistant");
    }

    #[test]
    fn parse_completion_response() {
        let data = r#"{
            "id": "chatcmpl-1",
            "model": "openai/gpt-oss-20b",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"intents\": []}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.model, "openai/gpt-oss-20b");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"intents\": []}")
        );
        assert_eq!(parsed.usage.unwrap().total_tokens, 14);
    }

    #[test]
    fn parse_embedding_response() {
        let data = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0},
                {"embedding": [0.4, 0.5, 0.6], "index": 1}
            ],
            "model": "nomic-embed-text",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let parsed: EmbeddingApiResponse = serde_json::from_str(data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(parsed.model, "nomic-embed-text");
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 8);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let provider = OpenAiCompatProvider::with_timeout(
            "dead",
            "http://127.0.0.1:1/v1",
            "k",
            Duration::from_secs(2),
        );
        let err = provider
            .complete(ProviderRequest {
                model: "m".into(),
                messages: vec![Message::user("hi")],
                temperature: 0.0,
                max_tokens: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Network(_) | ProviderError::Timeout(_)
        ));
    }
}
