//! Similarity retrieval of config samples.
//!
//! Given the operator's text, embed it and ask the sample store for the `k`
//! nearest samples. Retrieval never fails a turn: every failure becomes an
//! empty match set plus a note that the prompt carries to the model.

pub mod embedder;

pub use embedder::{HashEmbedder, ProviderEmbedder, embedder_from_config};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use netintent_core::embedding::Embedder;
use netintent_core::error::RetrievalError;
use netintent_core::sample::{SampleStore, ScoredSample};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

pub const NOTE_FOUND: &str = "Retrieved similar samples from the sample library.";
pub const NOTE_EMPTY: &str = "No similar samples found; proceed with general knowledge.";
pub const NOTE_DISABLED: &str = "Retrieval disabled by request.";

/// Short view of a match: `{sample_id, category, intent_text}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub sample_id: i64,
    pub category: String,
    pub intent_text: String,
}

/// Full view of a match: `{intent_text, config_payload, extra_metadata}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawSample {
    pub intent_text: String,
    pub config_payload: Value,
    pub extra_metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RetrievalTimings {
    pub embedding_seconds: f64,
    pub query_seconds: f64,
}

/// What one retrieval call produced.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Ascending distance, ties by ascending `sample_id`
    pub matches: Vec<ScoredSample>,
    /// Always non-empty
    pub note: String,
    /// False when retrieval was skipped for this turn
    pub enabled: bool,
    pub timings: RetrievalTimings,
}

impl RetrievalOutcome {
    /// Outcome for a turn that opted out of retrieval.
    pub fn disabled() -> Self {
        Self {
            matches: Vec::new(),
            note: NOTE_DISABLED.into(),
            enabled: false,
            timings: RetrievalTimings::default(),
        }
    }

    fn degraded(err: &RetrievalError, timings: RetrievalTimings) -> Self {
        Self {
            matches: Vec::new(),
            note: format!("Sample lookup failed ({err}); proceed with general knowledge."),
            enabled: true,
            timings,
        }
    }

    pub fn summary(&self) -> Vec<SampleSummary> {
        self.matches
            .iter()
            .map(|m| SampleSummary {
                sample_id: m.sample.sample_id,
                category: m.sample.category.clone(),
                intent_text: m.sample.intent_text.clone(),
            })
            .collect()
    }

    pub fn raw_samples(&self) -> Vec<RawSample> {
        self.matches
            .iter()
            .map(|m| RawSample {
                intent_text: m.sample.intent_text.clone(),
                config_payload: m.sample.config_payload.clone(),
                extra_metadata: m.sample.extra_metadata.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Embeds queries and ranks stored samples against them.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    samples: Arc<dyn SampleStore>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        samples: Arc<dyn SampleStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            samples,
            timeout,
        }
    }

    /// The `k` nearest samples to `query`. Never fails.
    pub async fn retrieve(&self, query: &str, k: usize) -> RetrievalOutcome {
        let mut timings = RetrievalTimings::default();
        match self.try_retrieve(query, k, &mut timings).await {
            Ok(matches) if matches.is_empty() => {
                debug!("Retrieval found no samples");
                RetrievalOutcome {
                    matches,
                    note: NOTE_EMPTY.into(),
                    enabled: true,
                    timings,
                }
            }
            Ok(matches) => {
                info!(
                    count = matches.len(),
                    closest = matches[0].sample.sample_id,
                    "Retrieved similar samples"
                );
                RetrievalOutcome {
                    matches,
                    note: NOTE_FOUND.into(),
                    enabled: true,
                    timings,
                }
            }
            Err(e) => {
                warn!(error = %e, "Retrieval degraded");
                RetrievalOutcome::degraded(&e, timings)
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        k: usize,
        timings: &mut RetrievalTimings,
    ) -> std::result::Result<Vec<ScoredSample>, RetrievalError> {
        if k == 0 {
            return Err(RetrievalError::InvalidLimit(k));
        }

        let started = Instant::now();
        let vector = self
            .bounded("embedding", self.embedder.embed(query))
            .await?;
        timings.embedding_seconds = started.elapsed().as_secs_f64();

        let expected = self.samples.dimensions();
        if vector.len() != expected {
            return Err(RetrievalError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let started = Instant::now();
        let matches = self
            .bounded("nearest-neighbor query", async {
                self.samples
                    .nearest(&vector, k)
                    .await
                    .map_err(RetrievalError::from)
            })
            .await?;
        timings.query_seconds = started.elapsed().as_secs_f64();

        Ok(matches)
    }

    async fn bounded<T>(
        &self,
        stage: &str,
        fut: impl Future<Output = std::result::Result<T, RetrievalError>>,
    ) -> std::result::Result<T, RetrievalError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RetrievalError::Timeout {
                stage: stage.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })?
    }
}
