//! Config samples and the SampleStore trait.
//!
//! A sample is a labeled (intent, configuration) pair used to ground new
//! requests. Its embedding is written in the same statement as its intent
//! text, so a sample without an embedding is never visible.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored config sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSample {
    /// Store-assigned ID
    pub sample_id: i64,

    pub category: String,

    pub intent_text: String,

    /// Opaque controller configuration
    pub config_payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_metadata: Option<Value>,

    /// Embedding of `intent_text`
    #[serde(skip)]
    pub embedding: Vec<f32>,

    pub created_at: DateTime<Utc>,
}

/// Input for creating a sample. The embedding is supplied separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConfigSample {
    pub category: String,
    pub intent_text: String,
    #[serde(alias = "config_json")]
    pub config_payload: Value,
    #[serde(default)]
    pub extra_metadata: Option<Value>,
}

/// Partial update of a sample. Fields left `None` are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleUpdate {
    #[serde(default)]
    pub category: Option<String>,
    /// Changing this requires a fresh embedding.
    #[serde(default)]
    pub intent_text: Option<String>,
    #[serde(default)]
    pub config_payload: Option<Value>,
    #[serde(default)]
    pub extra_metadata: Option<Value>,
}

/// Filter for listing samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleFilter {
    /// Substring of intent text or category (case-insensitive)
    #[serde(default)]
    pub query: Option<String>,

    /// Exact category (case-insensitive)
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self {
            query: None,
            category: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl SampleFilter {
    /// Whether a sample passes the query and category predicates.
    pub fn matches(&self, sample: &ConfigSample) -> bool {
        if let Some(cat) = self.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            if !sample.category.eq_ignore_ascii_case(cat) {
                return false;
            }
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let q = q.to_lowercase();
            return sample.intent_text.to_lowercase().contains(&q)
                || sample.category.to_lowercase().contains(&q);
        }
        true
    }
}

/// A sample together with its distance from a query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSample {
    pub sample: ConfigSample,
    /// Euclidean distance; smaller is closer
    pub distance: f32,
}

/// The SampleStore trait.
///
/// Implementations: SQLite, in-memory.
#[async_trait]
pub trait SampleStore: Send + Sync {
    fn name(&self) -> &str;

    /// Dimensionality every stored embedding must have.
    fn dimensions(&self) -> usize;

    /// Insert a sample and its embedding in one write.
    async fn insert(
        &self,
        sample: NewConfigSample,
        embedding: Vec<f32>,
    ) -> std::result::Result<ConfigSample, StoreError>;

    /// Apply an update. `embedding` must be present whenever the intent text
    /// changes. Returns `None` when the sample does not exist.
    async fn update(
        &self,
        sample_id: i64,
        update: SampleUpdate,
        embedding: Option<Vec<f32>>,
    ) -> std::result::Result<Option<ConfigSample>, StoreError>;

    async fn delete(&self, sample_id: i64) -> std::result::Result<bool, StoreError>;

    async fn get(&self, sample_id: i64) -> std::result::Result<Option<ConfigSample>, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &SampleFilter) -> std::result::Result<Vec<ConfigSample>, StoreError>;

    /// The `limit` samples closest to `query`, by ascending distance with
    /// ties broken by ascending `sample_id`.
    async fn nearest(
        &self,
        query: &[f32],
        limit: usize,
    ) -> std::result::Result<Vec<ScoredSample>, StoreError>;

    async fn count(&self) -> std::result::Result<usize, StoreError>;
}
