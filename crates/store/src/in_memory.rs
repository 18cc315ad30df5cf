//! In-memory store - useful for testing and ephemeral sessions.

use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use netintent_core::conversation::ConversationStore;
use netintent_core::error::StoreError;
use netintent_core::identity::{IdentityStore, ManagedEntity, Observation, UpsertOutcome};
use netintent_core::message::{Conversation, ConversationId, Message};
use netintent_core::sample::{
    ConfigSample, NewConfigSample, SampleFilter, SampleStore, SampleUpdate, ScoredSample,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entities and their address index share one lock so every write updates
/// both at once.
#[derive(Default)]
struct IdentityState {
    seq: u64,
    entities: BTreeMap<String, ManagedEntity>,
    by_address: HashMap<String, BTreeSet<String>>,
}

impl IdentityState {
    fn unindex(&mut self, stable_id: &str) {
        let Some(entity) = self.entities.get(stable_id) else {
            return;
        };
        for addr in &entity.addresses {
            if let Some(ids) = self.by_address.get_mut(addr) {
                ids.remove(stable_id);
                if ids.is_empty() {
                    self.by_address.remove(addr);
                }
            }
        }
    }

    fn index(&mut self, stable_id: &str) {
        let Some(entity) = self.entities.get(stable_id) else {
            return;
        };
        for addr in entity.addresses.clone() {
            self.by_address
                .entry(addr)
                .or_default()
                .insert(stable_id.to_string());
        }
    }

    fn remove(&mut self, stable_id: &str) -> Option<ManagedEntity> {
        self.unindex(stable_id);
        self.entities.remove(stable_id)
    }

    /// Write an observation over an existing row, keeping its name.
    fn apply(&mut self, obs: &Observation) -> bool {
        let Some(current) = self.entities.get(&obs.stable_id) else {
            return false;
        };
        if obs.seen_seq < current.last_seen_seq {
            return false;
        }
        self.unindex(&obs.stable_id);
        if let Some(entity) = self.entities.get_mut(&obs.stable_id) {
            entity.entity_type = obs.entity_type;
            entity.last_metadata = obs.metadata.clone();
            entity.addresses = obs.addresses.clone();
            entity.last_seen_seq = obs.seen_seq;
            entity.updated_at = Utc::now();
        }
        self.index(&obs.stable_id);
        true
    }

    fn insert(&mut self, obs: &Observation, friendly_name: Option<String>) {
        self.entities.insert(
            obs.stable_id.clone(),
            ManagedEntity {
                stable_id: obs.stable_id.clone(),
                entity_type: obs.entity_type,
                friendly_name,
                last_metadata: obs.metadata.clone(),
                addresses: obs.addresses.clone(),
                last_seen_seq: obs.seen_seq,
                updated_at: Utc::now(),
            },
        );
        self.index(&obs.stable_id);
    }
}

#[derive(Default)]
struct SampleState {
    next_id: i64,
    samples: BTreeMap<i64, ConfigSample>,
}

/// An in-memory store implementing all three persistence traits.
pub struct InMemoryStore {
    dimensions: usize,
    identity: Arc<RwLock<IdentityState>>,
    samples: Arc<RwLock<SampleState>>,
    conversations: Arc<RwLock<HashMap<ConversationId, (Conversation, Vec<Message>)>>>,
}

impl InMemoryStore {
    /// Create an empty store whose samples carry `dimensions`-long embeddings.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            identity: Arc::new(RwLock::new(IdentityState::default())),
            samples: Arc::new(RwLock::new(SampleState::default())),
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<(), StoreError> {
        if embedding.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn next_sync_seq(&self) -> Result<u64, StoreError> {
        let mut state = self.identity.write().await;
        state.seq += 1;
        Ok(state.seq)
    }

    async fn get(&self, stable_id: &str) -> Result<Option<ManagedEntity>, StoreError> {
        Ok(self.identity.read().await.entities.get(stable_id).cloned())
    }

    async fn get_many(&self, stable_ids: &[String]) -> Result<Vec<ManagedEntity>, StoreError> {
        let state = self.identity.read().await;
        Ok(stable_ids
            .iter()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect())
    }

    async fn find_by_address(&self, address: &str) -> Result<Vec<ManagedEntity>, StoreError> {
        let state = self.identity.read().await;
        Ok(state
            .by_address
            .get(address)
            .into_iter()
            .flatten()
            .filter_map(|id| state.entities.get(id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<ManagedEntity>, StoreError> {
        Ok(self.identity.read().await.entities.values().cloned().collect())
    }

    async fn upsert_observation(&self, obs: &Observation) -> Result<UpsertOutcome, StoreError> {
        let mut state = self.identity.write().await;
        if !state.entities.contains_key(&obs.stable_id) {
            state.insert(obs, None);
            return Ok(UpsertOutcome::Created);
        }
        if state.apply(obs) {
            Ok(UpsertOutcome::Updated)
        } else {
            Ok(UpsertOutcome::Superseded)
        }
    }

    async fn migrate(
        &self,
        orphan_id: &str,
        obs: &Observation,
    ) -> Result<Option<String>, StoreError> {
        let mut state = self.identity.write().await;
        let inherited = state
            .entities
            .get(orphan_id)
            .and_then(|e| e.friendly_name.clone());

        if state.entities.contains_key(&obs.stable_id) {
            state.apply(obs);
            if let Some(target) = state.entities.get_mut(&obs.stable_id) {
                if target.friendly_name.is_none() {
                    target.friendly_name = inherited;
                }
            }
        } else {
            state.insert(obs, inherited);
        }

        if orphan_id != obs.stable_id {
            state.remove(orphan_id);
        }
        Ok(state
            .entities
            .get(&obs.stable_id)
            .and_then(|e| e.friendly_name.clone()))
    }

    async fn set_friendly_name(
        &self,
        stable_id: &str,
        name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut state = self.identity.write().await;
        match state.entities.get_mut(stable_id) {
            Some(entity) => {
                entity.friendly_name = name.map(str::to_string);
                entity.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, stable_id: &str) -> Result<bool, StoreError> {
        Ok(self.identity.write().await.remove(stable_id).is_some())
    }
}

#[async_trait]
impl SampleStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn insert(
        &self,
        sample: NewConfigSample,
        embedding: Vec<f32>,
    ) -> Result<ConfigSample, StoreError> {
        self.check_dimensions(&embedding)?;
        let mut state = self.samples.write().await;
        state.next_id += 1;
        let stored = ConfigSample {
            sample_id: state.next_id,
            category: sample.category,
            intent_text: sample.intent_text,
            config_payload: sample.config_payload,
            extra_metadata: sample.extra_metadata,
            embedding,
            created_at: Utc::now(),
        };
        state.samples.insert(stored.sample_id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        sample_id: i64,
        update: SampleUpdate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Option<ConfigSample>, StoreError> {
        if update.intent_text.is_some() && embedding.is_none() {
            return Err(StoreError::QueryFailed(
                "intent text changed without a new embedding".into(),
            ));
        }
        if let Some(emb) = &embedding {
            self.check_dimensions(emb)?;
        }

        let mut state = self.samples.write().await;
        let Some(sample) = state.samples.get_mut(&sample_id) else {
            return Ok(None);
        };
        if let Some(category) = update.category {
            sample.category = category;
        }
        if let Some(intent) = update.intent_text {
            sample.intent_text = intent;
        }
        if let Some(payload) = update.config_payload {
            sample.config_payload = payload;
        }
        if let Some(extra) = update.extra_metadata {
            sample.extra_metadata = Some(extra);
        }
        if let Some(emb) = embedding {
            sample.embedding = emb;
        }
        Ok(Some(sample.clone()))
    }

    async fn delete(&self, sample_id: i64) -> Result<bool, StoreError> {
        Ok(self.samples.write().await.samples.remove(&sample_id).is_some())
    }

    async fn get(&self, sample_id: i64) -> Result<Option<ConfigSample>, StoreError> {
        Ok(self.samples.read().await.samples.get(&sample_id).cloned())
    }

    async fn list(&self, filter: &SampleFilter) -> Result<Vec<ConfigSample>, StoreError> {
        let state = self.samples.read().await;
        Ok(state
            .samples
            .values()
            .rev()
            .filter(|s| filter.matches(s))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredSample>, StoreError> {
        self.check_dimensions(query)?;
        let state = self.samples.read().await;
        Ok(vector::rank_nearest(state.samples.values(), query, limit))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.samples.read().await.samples.len())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create(&self, title: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), (conversation.clone(), Vec::new()));
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(id)
            .map(|(c, _)| c.clone()))
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let mut all: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .map(|(c, _)| c.clone())
            .collect();
        all.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(all)
    }

    async fn history(&self, id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        self.conversations
            .read()
            .await
            .get(id)
            .map(|(_, msgs)| msgs.clone())
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    async fn append(
        &self,
        id: &ConversationId,
        messages: &[Message],
        title: Option<&str>,
    ) -> Result<Conversation, StoreError> {
        let mut all = self.conversations.write().await;
        let (conversation, log) = all
            .get_mut(id)
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;
        log.extend_from_slice(messages);
        if conversation.title.is_none() {
            conversation.title = title.map(str::to_string);
        }
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netintent_core::identity::EntityType;
    use serde_json::json;

    fn host_obs(stable_id: &str, addr: &str, seq: u64) -> Observation {
        Observation {
            stable_id: stable_id.into(),
            entity_type: EntityType::Host,
            addresses: vec![addr.into()],
            metadata: json!({ "id": stable_id, "ipAddresses": [addr] }),
            seen_seq: seq,
        }
    }

    fn new_sample(category: &str, intent: &str) -> NewConfigSample {
        NewConfigSample {
            category: category.into(),
            intent_text: intent.into(),
            config_payload: json!({ "type": "HostToHostIntent" }),
            extra_metadata: None,
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates() {
        let store = InMemoryStore::new(3);
        let obs = host_obs("host:10.0.0.1", "10.0.0.1", 1);
        assert_eq!(
            store.upsert_observation(&obs).await.unwrap(),
            UpsertOutcome::Created
        );
        let obs2 = host_obs("host:10.0.0.1", "10.0.0.1", 2);
        assert_eq!(
            store.upsert_observation(&obs2).await.unwrap(),
            UpsertOutcome::Updated
        );
        assert_eq!(IdentityStore::list(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn older_observation_is_superseded() {
        let store = InMemoryStore::new(3);
        store
            .upsert_observation(&host_obs("h", "10.0.0.1", 5))
            .await
            .unwrap();
        let outcome = store
            .upsert_observation(&host_obs("h", "10.0.0.2", 4))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Superseded);
        let entity = IdentityStore::get(&store, "h").await.unwrap().unwrap();
        assert_eq!(entity.last_seen_seq, 5);
        assert_eq!(entity.addresses, vec!["10.0.0.1".to_string()]);
    }

    #[tokio::test]
    async fn upsert_keeps_friendly_name() {
        let store = InMemoryStore::new(3);
        store
            .upsert_observation(&host_obs("h", "10.0.0.1", 1))
            .await
            .unwrap();
        assert!(store.set_friendly_name("h", Some("edge")).await.unwrap());
        store
            .upsert_observation(&host_obs("h", "10.0.0.1", 2))
            .await
            .unwrap();
        let entity = IdentityStore::get(&store, "h").await.unwrap().unwrap();
        assert_eq!(entity.friendly_name.as_deref(), Some("edge"));
    }

    #[tokio::test]
    async fn address_index_tracks_writes() {
        let store = InMemoryStore::new(3);
        store
            .upsert_observation(&host_obs("a", "10.0.0.1", 1))
            .await
            .unwrap();
        store
            .upsert_observation(&host_obs("b", "10.0.0.1", 1))
            .await
            .unwrap();
        assert_eq!(store.find_by_address("10.0.0.1").await.unwrap().len(), 2);

        store
            .upsert_observation(&host_obs("a", "10.0.0.9", 2))
            .await
            .unwrap();
        let holders = store.find_by_address("10.0.0.1").await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].stable_id, "b");

        IdentityStore::delete(&store, "b").await.unwrap();
        assert!(store.find_by_address("10.0.0.1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrate_copies_name_and_removes_orphan() {
        let store = InMemoryStore::new(3);
        store
            .upsert_observation(&host_obs("old", "10.0.0.5", 1))
            .await
            .unwrap();
        store.set_friendly_name("old", Some("edge-server")).await.unwrap();

        let name = store
            .migrate("old", &host_obs("host:10.0.0.5", "10.0.0.5", 2))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("edge-server"));
        assert!(IdentityStore::get(&store, "old").await.unwrap().is_none());
        let holders = store.find_by_address("10.0.0.5").await.unwrap();
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].stable_id, "host:10.0.0.5");
    }

    #[tokio::test]
    async fn migrate_does_not_regress_newer_target() {
        let store = InMemoryStore::new(3);
        let mut newer = host_obs("host:10.0.0.5", "10.0.0.5", 5);
        newer.metadata = json!({ "mac": "newer", "ipAddresses": ["10.0.0.5"] });
        store.upsert_observation(&newer).await.unwrap();
        store
            .upsert_observation(&host_obs("orphan", "10.0.0.9", 1))
            .await
            .unwrap();
        store.set_friendly_name("orphan", Some("edge-server")).await.unwrap();

        let mut older = host_obs("host:10.0.0.5", "10.0.0.7", 3);
        older.metadata = json!({ "mac": "older", "ipAddresses": ["10.0.0.7"] });
        let name = store.migrate("orphan", &older).await.unwrap();
        assert_eq!(name.as_deref(), Some("edge-server"));

        let entity = IdentityStore::get(&store, "host:10.0.0.5").await.unwrap().unwrap();
        assert_eq!(entity.last_seen_seq, 5);
        assert_eq!(entity.last_metadata["mac"], "newer");
        assert_eq!(store.find_by_address("10.0.0.5").await.unwrap().len(), 1);
        assert!(store.find_by_address("10.0.0.7").await.unwrap().is_empty());
        assert!(IdentityStore::get(&store, "orphan").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_name_on_unknown_entity_creates_nothing() {
        let store = InMemoryStore::new(3);
        assert!(!store.set_friendly_name("ghost", Some("x")).await.unwrap());
        assert!(IdentityStore::list(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_seq_is_strictly_increasing() {
        let store = InMemoryStore::new(3);
        let a = store.next_sync_seq().await.unwrap();
        let b = store.next_sync_seq().await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn sample_insert_rejects_wrong_dimensions() {
        let store = InMemoryStore::new(3);
        let err = store
            .insert(new_sample("acl", "block h1"), vec![1.0, 2.0])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sample_update_requires_embedding_for_new_intent() {
        let store = InMemoryStore::new(2);
        let s = store
            .insert(new_sample("acl", "block h1"), vec![1.0, 0.0])
            .await
            .unwrap();
        let update = SampleUpdate {
            intent_text: Some("block h2".into()),
            ..Default::default()
        };
        assert!(store.update(s.sample_id, update.clone(), None).await.is_err());

        let updated = store
            .update(s.sample_id, update, Some(vec![0.0, 1.0]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.intent_text, "block h2");
        assert_eq!(updated.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn sample_list_is_newest_first_with_paging() {
        let store = InMemoryStore::new(1);
        for i in 0..5 {
            store
                .insert(new_sample("qos", &format!("limit {i}")), vec![i as f32])
                .await
                .unwrap();
        }
        let filter = SampleFilter {
            limit: 2,
            offset: 1,
            ..Default::default()
        };
        let page = SampleStore::list(&store, &filter).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|s| s.sample_id).collect();
        assert_eq!(ids, vec![4, 3]);
    }

    #[tokio::test]
    async fn nearest_orders_by_distance() {
        let store = InMemoryStore::new(2);
        store.insert(new_sample("a", "far"), vec![5.0, 5.0]).await.unwrap();
        store.insert(new_sample("a", "near"), vec![0.1, 0.0]).await.unwrap();
        let hits = store.nearest(&[0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].sample.intent_text, "near");
        assert!(store.nearest(&[0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn conversation_append_and_title() {
        let store = InMemoryStore::new(1);
        let convo = store.create(None).await.unwrap();
        let updated = store
            .append(
                &convo.id,
                &[Message::user("hi"), Message::assistant("hello")],
                Some("hi"),
            )
            .await
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("hi"));

        store
            .append(&convo.id, &[Message::user("again")], Some("again"))
            .await
            .unwrap();
        let history = store.history(&convo.id).await.unwrap();
        assert_eq!(history.len(), 3);
        let fetched = ConversationStore::get(&store, &convo.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn append_to_unknown_conversation_fails() {
        let store = InMemoryStore::new(1);
        let err = store
            .append(&ConversationId::from("missing"), &[Message::user("x")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound(_)));
    }
}
