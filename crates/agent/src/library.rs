//! The sample library: the only write path into the sample store.
//!
//! Every write that sets intent text computes its embedding first, so the
//! store always receives text and vector together.

use std::collections::HashSet;
use std::sync::Arc;

use netintent_core::embedding::Embedder;
use netintent_core::error::{RetrievalError, StoreError};
use netintent_core::sample::{
    ConfigSample, NewConfigSample, SampleFilter, SampleStore, SampleUpdate,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Could not embed intent text: {0}")]
    Embedding(#[from] RetrievalError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid sample: {0}")]
    Invalid(String),

    #[error("Sample {0} not found")]
    NotFound(i64),
}

/// What a bulk import did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: Vec<i64>,
    /// Samples whose category and intent text were already stored
    pub skipped: usize,
}

pub struct SampleLibrary {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn SampleStore>,
}

impl SampleLibrary {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn SampleStore>) -> Self {
        Self { embedder, store }
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, LibraryError> {
        let vector = self.embedder.embed(text).await?;
        let expected = self.store.dimensions();
        if vector.len() != expected {
            return Err(RetrievalError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }
        Ok(vector)
    }

    pub async fn create(
        &self,
        mut sample: NewConfigSample,
    ) -> std::result::Result<ConfigSample, LibraryError> {
        sample.category = required("category", &sample.category)?;
        sample.intent_text = required("intent_text", &sample.intent_text)?;

        let embedding = self.embed(&sample.intent_text).await?;
        let stored = self.store.insert(sample, embedding).await?;
        info!(
            sample_id = stored.sample_id,
            category = %stored.category,
            "Added config sample"
        );
        Ok(stored)
    }

    /// Apply a partial update. The intent is re-embedded only when it
    /// actually changes.
    pub async fn update(
        &self,
        sample_id: i64,
        mut update: SampleUpdate,
    ) -> std::result::Result<ConfigSample, LibraryError> {
        let current = self
            .store
            .get(sample_id)
            .await?
            .ok_or(LibraryError::NotFound(sample_id))?;

        if let Some(category) = &update.category {
            update.category = Some(required("category", category)?);
        }

        let mut embedding = None;
        if let Some(intent) = &update.intent_text {
            let intent = required("intent_text", intent)?;
            if intent == current.intent_text {
                update.intent_text = None;
            } else {
                embedding = Some(self.embed(&intent).await?);
                update.intent_text = Some(intent);
            }
        }

        let reembedded = embedding.is_some();
        let updated = self
            .store
            .update(sample_id, update, embedding)
            .await?
            .ok_or(LibraryError::NotFound(sample_id))?;
        info!(sample_id, reembedded, "Updated config sample");
        Ok(updated)
    }

    /// Replace the intent text and its embedding in one write.
    pub async fn update_intent(
        &self,
        sample_id: i64,
        intent_text: &str,
    ) -> std::result::Result<ConfigSample, LibraryError> {
        self.update(
            sample_id,
            SampleUpdate {
                intent_text: Some(intent_text.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    /// Add every sample not already in the library. A sample is already
    /// present when a stored one has the same intent text and category
    /// (case-insensitive), so re-running an import adds nothing.
    pub async fn import(
        &self,
        samples: Vec<NewConfigSample>,
    ) -> std::result::Result<ImportReport, LibraryError> {
        let total = self.store.count().await?;
        let stored = self
            .store
            .list(&SampleFilter {
                limit: total.max(1),
                ..Default::default()
            })
            .await?;
        let mut seen: HashSet<(String, String)> = stored
            .iter()
            .map(|s| (s.category.to_lowercase(), s.intent_text.clone()))
            .collect();

        let mut report = ImportReport::default();
        for sample in samples {
            let key = (
                sample.category.trim().to_lowercase(),
                sample.intent_text.trim().to_string(),
            );
            if seen.contains(&key) {
                report.skipped += 1;
                continue;
            }
            let created = self.create(sample).await?;
            report.added.push(created.sample_id);
            seen.insert(key);
        }
        info!(
            added = report.added.len(),
            skipped = report.skipped,
            "Imported config samples"
        );
        Ok(report)
    }

    pub async fn delete(&self, sample_id: i64) -> std::result::Result<bool, LibraryError> {
        let deleted = self.store.delete(sample_id).await?;
        debug!(sample_id, deleted, "Delete config sample");
        Ok(deleted)
    }

    pub async fn get(&self, sample_id: i64) -> std::result::Result<Option<ConfigSample>, LibraryError> {
        Ok(self.store.get(sample_id).await?)
    }

    /// Newest first. See [`SampleFilter`] for matching rules.
    pub async fn list(
        &self,
        filter: &SampleFilter,
    ) -> std::result::Result<Vec<ConfigSample>, LibraryError> {
        Ok(self.store.list(filter).await?)
    }

    pub async fn count(&self) -> std::result::Result<usize, LibraryError> {
        Ok(self.store.count().await?)
    }
}

fn required(field: &str, value: &str) -> std::result::Result<String, LibraryError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LibraryError::Invalid(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{HashEmbedder, Retriever};
    use crate::test_helpers::{FailingEmbedder, TableEmbedder};
    use netintent_store::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn new_sample(category: &str, intent: &str) -> NewConfigSample {
        NewConfigSample {
            category: category.into(),
            intent_text: intent.into(),
            config_payload: json!({"intents": []}),
            extra_metadata: Some(json!({"source": "test"})),
        }
    }

    fn library(dims: usize) -> (SampleLibrary, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(dims));
        (
            SampleLibrary::new(Arc::new(HashEmbedder::new(dims)), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn create_embeds_and_stores() {
        let (lib, _) = library(16);
        let s = lib.create(new_sample(" acl ", "  block h1 ")).await.unwrap();
        assert_eq!(s.category, "acl");
        assert_eq!(s.intent_text, "block h1");
        assert_eq!(s.embedding, HashEmbedder::new(16).embed_text("block h1"));
        assert_eq!(lib.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_intent_rejected() {
        let (lib, _) = library(16);
        let err = lib.create(new_sample("acl", "   ")).await.unwrap_err();
        assert!(matches!(err, LibraryError::Invalid(_)));
        assert_eq!(lib.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn embedder_failure_writes_nothing() {
        let store = Arc::new(InMemoryStore::new(4));
        let lib = SampleLibrary::new(Arc::new(FailingEmbedder::new(4)), store);
        assert!(matches!(
            lib.create(new_sample("acl", "x")).await,
            Err(LibraryError::Embedding(_))
        ));
        assert_eq!(lib.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_dimensions_rejected() {
        let store = Arc::new(InMemoryStore::new(4));
        let lib = SampleLibrary::new(Arc::new(TableEmbedder::new(3)), store);
        assert!(matches!(
            lib.create(new_sample("acl", "x")).await,
            Err(LibraryError::Embedding(RetrievalError::DimensionMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn update_intent_reembeds_and_is_retrievable() {
        let (lib, store) = library(64);
        let s = lib.create(new_sample("qos", "limit bandwidth for h2")).await.unwrap();
        lib.create(new_sample("acl", "block traffic from h1 to h3")).await.unwrap();

        let updated = lib
            .update_intent(s.sample_id, "route traffic through s4")
            .await
            .unwrap();
        assert_eq!(
            updated.embedding,
            HashEmbedder::new(64).embed_text("route traffic through s4")
        );
        assert_eq!(updated.category, "qos");

        let retriever = Retriever::new(
            Arc::new(HashEmbedder::new(64)),
            store,
            Duration::from_secs(5),
        );
        let out = retriever.retrieve("route traffic through s4", 1).await;
        assert_eq!(out.summary()[0].sample_id, s.sample_id);
    }

    #[tokio::test]
    async fn unchanged_intent_keeps_embedding() {
        let store = Arc::new(InMemoryStore::new(2));
        let first = TableEmbedder::new(2).with("x", vec![1.0, 0.0]);
        let lib = SampleLibrary::new(Arc::new(first), store.clone());
        let s = lib.create(new_sample("acl", "x")).await.unwrap();

        // an embedder that would fail proves no re-embed happened
        let lib = SampleLibrary::new(Arc::new(FailingEmbedder::new(2)), store);
        let updated = lib
            .update(
                s.sample_id,
                SampleUpdate {
                    intent_text: Some(" x ".into()),
                    category: Some("security".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.category, "security");
        assert_eq!(updated.embedding, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let (lib, _) = library(8);
        assert!(matches!(
            lib.update_intent(42, "x").await,
            Err(LibraryError::NotFound(42))
        ));
        assert!(!lib.delete(42).await.unwrap());
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let (lib, _) = library(16);
        lib.create(new_sample("acl", "block h1")).await.unwrap();

        let batch = vec![
            new_sample("ACL", " block h1 "),
            new_sample("qos", "limit h2"),
            new_sample("qos", "limit h2"),
        ];
        let report = lib.import(batch.clone()).await.unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped, 2);

        let again = lib.import(batch).await.unwrap();
        assert!(again.added.is_empty());
        assert_eq!(again.skipped, 3);
        assert_eq!(lib.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn import_accepts_fixture_field_names() {
        let (lib, _) = library(16);
        let rows: Vec<NewConfigSample> = serde_json::from_value(json!([
            {"category": "acl", "intent_text": "block h1", "config_json": {"intents": []}}
        ]))
        .unwrap();
        let report = lib.import(rows).await.unwrap();
        let stored = lib.get(report.added[0]).await.unwrap().unwrap();
        assert_eq!(stored.config_payload, json!({"intents": []}));
        assert!(stored.extra_metadata.is_none());
    }

    #[tokio::test]
    async fn list_filters_newest_first() {
        let (lib, _) = library(8);
        lib.create(new_sample("acl", "block h1")).await.unwrap();
        lib.create(new_sample("QoS", "limit h2")).await.unwrap();
        lib.create(new_sample("acl", "Block h3")).await.unwrap();

        let acl = lib
            .list(&SampleFilter {
                category: Some("ACL".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let intents: Vec<&str> = acl.iter().map(|s| s.intent_text.as_str()).collect();
        assert_eq!(intents, ["Block h3", "block h1"]);

        let by_query = lib
            .list(&SampleFilter {
                query: Some("qos".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_query.len(), 1);

        let page = lib
            .list(&SampleFilter {
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].intent_text, "limit h2");
    }
}
