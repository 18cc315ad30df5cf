//! Configuration loading, validation, and management for netintent.
//!
//! Loads configuration from `~/.netintent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.netintent/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// SDN controller connection
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Language model endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Embedding backend for sample retrieval
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Context budget
    #[serde(default)]
    pub context: ContextConfig,

    /// Persistence
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// What a chat turn does when the controller cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryFallback {
    /// Proceed with the last known state from the identity store
    #[default]
    Stale,
    /// Reject the turn
    Fail,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// REST API root, with trailing slash
    #[serde(default = "default_controller_url")]
    pub api_url: String,

    #[serde(default = "default_controller_user")]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Per-fetch timeout
    #[serde(default = "default_controller_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub on_failure: TelemetryFallback,
}

fn default_controller_url() -> String {
    "http://localhost:8181/onos/v1/".into()
}
fn default_controller_user() -> String {
    "onos".into()
}
fn default_controller_password() -> String {
    "rocks".into()
}
fn default_controller_timeout() -> u64 {
    5
}

impl ControllerConfig {
    /// The configured password, or the controller's factory default.
    pub fn password_or_default(&self) -> String {
        self.password
            .clone()
            .unwrap_or_else(default_controller_password)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_url: default_controller_url(),
            username: default_controller_user(),
            password: None,
            timeout_secs: default_controller_timeout(),
            on_failure: TelemetryFallback::default(),
        }
    }
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("timeout_secs", &self.timeout_secs)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_provider_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_url() -> String {
    "https://api.groq.com/openai/v1".into()
}
fn default_model() -> String {
    "openai/gpt-oss-20b".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_provider_url(),
            api_key: None,
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which embedder computes sample and query vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Deterministic feature hashing; works offline
    #[default]
    Hash,
    /// `/embeddings` on an OpenAI-compatible endpoint
    OpenaiCompat,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,

    /// Base URL for `openai_compat`. Falls back to the provider URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Must match the vectors already stored
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_dimensions() -> usize {
    768
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            api_url: None,
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("backend", &self.backend)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Bound on embedding + nearest-neighbor query, each
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    3
}
fn default_retrieval_timeout() -> u64 {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Ceiling on estimated tokens per turn (preamble + history + new turn)
    #[serde(default = "default_budget_tokens")]
    pub budget_tokens: usize,

    /// Replaces the built-in system preamble
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_budget_tokens() -> usize {
    6000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            budget_tokens: default_budget_tokens(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file. Relative paths resolve against the config dir.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("netintent.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.netintent/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// - `ONOS_API_URL`, `ONOS_USER`, `ONOS_PASS`
    /// - `NETINTENT_API_KEY` (highest priority), then `GROQ_API_KEY`
    /// - `NETINTENT_MODEL`
    /// - `CHAT_CONTEXT_BUDGET_TOKENS` (ignored unless it parses)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mut url) = lookup("ONOS_API_URL") {
            if !url.ends_with('/') {
                url.push('/');
            }
            self.controller.api_url = url;
        }
        if let Some(user) = lookup("ONOS_USER") {
            self.controller.username = user;
        }
        if let Some(pass) = lookup("ONOS_PASS") {
            self.controller.password = Some(pass);
        }

        if let Some(key) = lookup("NETINTENT_API_KEY").or_else(|| {
            if self.provider.api_key.is_none() {
                lookup("GROQ_API_KEY")
            } else {
                None
            }
        }) {
            self.provider.api_key = Some(key);
        }

        if let Some(model) = lookup("NETINTENT_MODEL") {
            self.provider.default_model = model;
        }

        if let Some(raw) = lookup("CHAT_CONTEXT_BUDGET_TOKENS") {
            match raw.trim().parse::<usize>() {
                Ok(budget) => self.context.budget_tokens = budget,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring unparseable CHAT_CONTEXT_BUDGET_TOKENS"
                ),
            }
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".netintent")
    }

    /// Absolute path of the SQLite database.
    pub fn store_path(&self) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            Self::config_dir().join(&self.store.path)
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }

        if self.context.budget_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.budget_tokens must be > 0".into(),
            ));
        }

        if self.controller.timeout_secs == 0 || self.retrieval.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be at least 1 second".into(),
            ));
        }

        if !self.controller.api_url.ends_with('/') {
            return Err(ConfigError::ValidationError(
                "controller.api_url must end with '/'".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
