//! Error types for the netintent domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; the chat pipeline decides
//! which ones degrade a turn and which ones stop it.

use serde::Serialize;
use thiserror::Error;

/// The top-level error type for all netintent operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Language model ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Controller telemetry ---
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    // --- Persistence ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Retrieval ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Context budget ---
    #[error(transparent)]
    ContextOverflow(#[from] ContextOverflow),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure to read topology from the controller.
///
/// Every variant means "no fresh data this turn"; none of them is fatal to
/// the process.
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    #[error("Controller unreachable while fetching {resource}: {reason}")]
    Unavailable { resource: String, reason: String },

    #[error("Controller did not answer {resource} within {timeout_secs}s")]
    Timeout { resource: String, timeout_secs: u64 },

    #[error("Controller returned status {status_code} for {resource}: {body}")]
    Status {
        resource: String,
        status_code: u16,
        body: String,
    },

    #[error("Malformed {resource} payload: {reason}")]
    Decode { resource: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
}

/// Why a retrieval call produced no grounding examples.
///
/// Never propagated out of a chat turn; the retriever turns it into a note.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Nearest-neighbor query failed: {0}")]
    QueryFailed(String),

    #[error("{stage} timed out after {timeout_secs}s")]
    Timeout { stage: String, timeout_secs: u64 },

    #[error("Query embedding has {actual} dimensions, samples use {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("top_k must be at least 1 (got {0})")]
    InvalidLimit(usize),
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other => Self::QueryFailed(other.to_string()),
        }
    }
}

/// The assembled turn would not fit the model's context budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Conversation context too long ({estimated} estimated tokens, budget {budget}). Please start a new chat."
)]
pub struct ContextOverflow {
    pub estimated: usize,
    pub budget: usize,
}

/// More than one stored entity claims the address of a newly keyed host.
///
/// Reconciliation never guesses which one to migrate; both rows stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("Ambiguous migration for {stable_id}: address {address} is held by {candidates:?}")]
pub struct ReconciliationConflict {
    pub stable_id: String,
    pub address: String,
    pub candidates: Vec<String>,
}
