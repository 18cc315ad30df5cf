//! End-to-end integration tests for the netintent chat pipeline.
//!
//! These tests run full chat turns against scripted controller and model
//! doubles, with both store backends, and check what the operator would
//! see: names that survive controller resets, grounded prompts, budget
//! stops, degraded turns and concurrent sync passes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netintent_agent::{
    ChatService, Collaborators, HashEmbedder, Reconciler, SampleLibrary, TurnError, TurnOptions,
};
use netintent_config::AppConfig;
use netintent_core::conversation::ConversationStore;
use netintent_core::error::{ProviderError, TelemetryError};
use netintent_core::identity::{EntityRecord, EntityType, IdentityStore, Observation};
use netintent_core::message::{Message, Role};
use netintent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use netintent_core::sample::{NewConfigSample, SampleStore};
use netintent_core::topology::{ResourceKind, TelemetrySource};
use netintent_store::{InMemoryStore, SqliteStore};
use serde_json::{Map, Value, json};

const DIMS: usize = 64;

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence and keeps
/// every request.
struct ScriptedProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            responses: Mutex::new(replies.iter().map(|r| text_response(r)).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_prompt(&self) -> String {
        let requests = self.requests.lock().unwrap();
        let last = requests.last().expect("no requests made");
        last.messages.last().unwrap().content.clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let n = requests.len();
        if n >= responses.len() {
            panic!("ScriptedProvider exhausted: call #{n}, have {}", responses.len());
        }
        requests.push(request);
        Ok(responses[n].clone())
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
    }
}

// ── Mock Controller ──────────────────────────────────────────────────────

struct ScriptedController {
    payloads: Mutex<HashMap<ResourceKind, Value>>,
    down: Mutex<bool>,
}

impl ScriptedController {
    fn new() -> Self {
        let payloads = ResourceKind::ALL
            .iter()
            .map(|k| (*k, payload(*k, json!([]))))
            .collect();
        Self {
            payloads: Mutex::new(payloads),
            down: Mutex::new(false),
        }
    }

    fn set(&self, kind: ResourceKind, records: Value) {
        self.payloads
            .lock()
            .unwrap()
            .insert(kind, payload(kind, records));
    }

    fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ScriptedController {
    fn name(&self) -> &str {
        "scripted_onos"
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Value, TelemetryError> {
        if *self.down.lock().unwrap() {
            return Err(TelemetryError::Unavailable {
                resource: kind.as_str().into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self.payloads.lock().unwrap()[&kind].clone())
    }
}

fn payload(kind: ResourceKind, records: Value) -> Value {
    let mut body = Map::new();
    body.insert(kind.as_str().to_string(), records);
    Value::Object(body)
}

fn onos_host(mac: &str, ip: &str) -> Value {
    json!({
        "id": format!("{mac}/None"),
        "mac": mac,
        "vlan": "None",
        "ipAddresses": [ip],
        "locations": [{"elementId": "of:0000000000000001", "port": "1"}]
    })
}

fn onos_switch(id: &str) -> Value {
    json!({"id": id, "type": "SWITCH", "available": true, "role": "MASTER"})
}

// ── Wiring ───────────────────────────────────────────────────────────────

struct Pipeline<S> {
    service: ChatService,
    store: Arc<S>,
    controller: Arc<ScriptedController>,
    provider: Arc<ScriptedProvider>,
}

fn pipeline<S>(store: Arc<S>, replies: &[&str], config: AppConfig) -> Pipeline<S>
where
    S: IdentityStore + SampleStore + ConversationStore + 'static,
{
    let controller = Arc::new(ScriptedController::new());
    controller.set(
        ResourceKind::Devices,
        json!([onos_switch("of:0000000000000001")]),
    );
    let provider = Arc::new(ScriptedProvider::new(replies));

    let service = ChatService::from_config(
        &config,
        Collaborators {
            provider: provider.clone(),
            telemetry: controller.clone(),
            identity: store.clone(),
            samples: store.clone(),
            conversations: store.clone(),
            embedder: Arc::new(HashEmbedder::new(DIMS)),
        },
    );

    Pipeline {
        service,
        store,
        controller,
        provider,
    }
}

async fn sqlite() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::new("sqlite::memory:", DIMS).await.unwrap())
}

// ── E2E: Identity survives controller resets ─────────────────────────────

async fn volatile_id_scenario<S>(store: Arc<S>)
where
    S: IdentityStore + SampleStore + ConversationStore + 'static,
{
    let p = pipeline(store, &["ack 1", "ack 2"], AppConfig::default());
    p.controller
        .set(ResourceKind::Hosts, json!([onos_host("mac123", "10.0.0.5")]));

    let convo = p.service.create_conversation(None).await.unwrap();
    let first = p
        .service
        .send_message(&convo.id, "list hosts", TurnOptions::default())
        .await
        .unwrap();
    assert_eq!(first.reconciliation.as_ref().unwrap().created, 2);

    assert!(p
        .service
        .reconciler()
        .set_friendly_name("host:10.0.0.5", Some("printer"))
        .await
        .unwrap());

    // controller restart: same host, new volatile id
    p.controller
        .set(ResourceKind::Hosts, json!([onos_host("mac456", "10.0.0.5")]));
    p.service
        .send_message(&convo.id, "block the printer", TurnOptions::default())
        .await
        .unwrap();

    let prompt = p.provider.last_prompt();
    assert!(prompt.contains("\"friendly_name\": \"printer\""));
    assert!(prompt.contains("mac456"));

    let hosts: Vec<_> = IdentityStore::list(p.store.as_ref())
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.stable_id.starts_with("host:"))
        .collect();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].friendly_name.as_deref(), Some("printer"));
    assert_eq!(hosts[0].last_metadata["mac"], "mac456");
}

#[tokio::test]
async fn e2e_volatile_host_id_keeps_name_in_memory() {
    volatile_id_scenario(Arc::new(InMemoryStore::new(DIMS))).await;
}

#[tokio::test]
async fn e2e_volatile_host_id_keeps_name_sqlite() {
    volatile_id_scenario(sqlite().await).await;
}

// ── E2E: Retrieval grounds the prompt ────────────────────────────────────

#[tokio::test]
async fn e2e_closest_sample_grounds_prompt() {
    let store = sqlite().await;
    let library = SampleLibrary::new(Arc::new(HashEmbedder::new(DIMS)), store.clone());
    library
        .create(NewConfigSample {
            category: "acl".into(),
            intent_text: "block traffic from h1 to h2".into(),
            config_payload: json!({"type": "HostToHostIntent", "priority": 40000}),
            extra_metadata: None,
        })
        .await
        .unwrap();
    library
        .create(NewConfigSample {
            category: "qos".into(),
            intent_text: "limit bandwidth on switch s3".into(),
            config_payload: json!({"type": "MeterIntent"}),
            extra_metadata: None,
        })
        .await
        .unwrap();

    let p = pipeline(store, &["{\"intents\": []}"], AppConfig::default());
    let convo = p.service.create_conversation(None).await.unwrap();
    let out = p
        .service
        .send_message(&convo.id, "block traffic from h3 to h4", TurnOptions::default())
        .await
        .unwrap();

    assert_eq!(out.samples[0].category, "acl");
    assert!(out.notes[0].contains("Retrieved similar samples"));
    let prompt = p.provider.last_prompt();
    assert!(prompt.contains("HostToHostIntent"));
    assert!(prompt.ends_with("block traffic from h3 to h4\n"));
}

// ── E2E: Budget exhaustion ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_long_conversation_hits_budget_then_new_chat_works() {
    let long_reply = "x".repeat(4000); // 1000 estimated tokens
    let replies = vec![long_reply.as_str(); 10];
    let mut config = AppConfig::default();
    config.context.budget_tokens = 3000;

    let p = pipeline(Arc::new(InMemoryStore::new(DIMS)), &replies, config);
    let convo = p.service.create_conversation(None).await.unwrap();

    let mut overflow = None;
    for turn in 0..6 {
        match p
            .service
            .send_message(&convo.id, &format!("turn {turn}"), TurnOptions::default())
            .await
        {
            Ok(_) => {}
            Err(TurnError::ContextOverflow(e)) => {
                overflow = Some(e);
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let overflow = overflow.expect("budget should be exhausted within six turns");
    assert_eq!(overflow.budget, 3000);
    assert!(overflow.to_string().contains("Please start a new chat"));

    // nothing was appended for the rejected turn
    let history = p.service.history(&convo.id).await.unwrap();
    assert_eq!(history.len(), 2 * p.provider.calls());

    let fresh = p.service.create_conversation(None).await.unwrap();
    p.service
        .send_message(&fresh.id, "start over", TurnOptions::default())
        .await
        .unwrap();
}

// ── E2E: Controller outage ───────────────────────────────────────────────

#[tokio::test]
async fn e2e_controller_outage_uses_last_known_names() {
    let p = pipeline(sqlite().await, &["one", "two"], AppConfig::default());
    p.controller
        .set(ResourceKind::Hosts, json!([onos_host("aa:bb", "10.0.0.9")]));

    let convo = p.service.create_conversation(None).await.unwrap();
    p.service
        .send_message(&convo.id, "hello", TurnOptions::default())
        .await
        .unwrap();
    p.service
        .reconciler()
        .set_friendly_name("of:0000000000000001", Some("core-switch"))
        .await
        .unwrap();

    p.controller.set_down(true);
    let out = p
        .service
        .send_message(&convo.id, "what changed?", TurnOptions::default())
        .await
        .unwrap();

    assert!(out.stale_topology);
    let prompt = p.provider.last_prompt();
    assert!(prompt.contains("(stale)"));
    assert!(prompt.contains("core-switch"));
    assert!(prompt.contains("10.0.0.9"));

    let history = p.service.history(&convo.id).await.unwrap();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(history[2].content, "what changed?");
}

// ── E2E: Ambiguous migration ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_ambiguous_address_leaves_named_rows_alone() {
    let store = sqlite().await;
    let p = pipeline(store.clone(), &["ok"], AppConfig::default());
    let reconciler = p.service.reconciler();

    // two legacy rows share an address, keyed by native ids
    for (id, name) in [("legacy-a", "alpha"), ("legacy-b", "beta")] {
        let seq = store.next_sync_seq().await.unwrap();
        store
            .upsert_observation(&Observation {
                stable_id: id.into(),
                entity_type: EntityType::Host,
                addresses: vec!["10.0.0.5".into()],
                metadata: json!({"id": id, "ipAddresses": ["10.0.0.5"]}),
                seen_seq: seq,
            })
            .await
            .unwrap();
        assert!(reconciler.set_friendly_name(id, Some(name)).await.unwrap());
    }

    p.controller
        .set(ResourceKind::Hosts, json!([onos_host("mac9", "10.0.0.5")]));
    let convo = p.service.create_conversation(None).await.unwrap();
    let out = p
        .service
        .send_message(&convo.id, "hi", TurnOptions::default())
        .await
        .unwrap();

    let sync = out.reconciliation.unwrap();
    assert_eq!(sync.conflicts.len(), 1);
    let mut candidates = sync.conflicts[0].candidates.clone();
    candidates.sort();
    assert_eq!(candidates, ["legacy-a", "legacy-b"]);
    assert!(sync.collected.is_empty());

    let a = IdentityStore::get(store.as_ref(), "legacy-a").await.unwrap().unwrap();
    let b = IdentityStore::get(store.as_ref(), "legacy-b").await.unwrap().unwrap();
    assert_eq!(a.friendly_name.as_deref(), Some("alpha"));
    assert_eq!(b.friendly_name.as_deref(), Some("beta"));
    let new = IdentityStore::get(store.as_ref(), "host:10.0.0.5").await.unwrap().unwrap();
    assert!(new.friendly_name.is_none());
}

// ── E2E: Concurrent sync passes ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_syncs_keep_one_row_per_host() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteStore::open(&dir.path().join("netintent.db"), DIMS)
            .await
            .unwrap(),
    );

    // a named row from before hosts were keyed by address
    let seq = store.next_sync_seq().await.unwrap();
    store
        .upsert_observation(&Observation {
            stable_id: "mac5/None".into(),
            entity_type: EntityType::Host,
            addresses: vec!["10.0.0.5".into()],
            metadata: onos_host("mac5", "10.0.0.5"),
            seen_seq: seq,
        })
        .await
        .unwrap();
    store
        .set_friendly_name("mac5/None", Some("edge-server"))
        .await
        .unwrap();

    let reconciler = Arc::new(Reconciler::new(store.clone(), Duration::from_secs(5)));
    let records: Arc<Vec<EntityRecord>> = Arc::new(
        (1..=20)
            .filter_map(|i| {
                EntityRecord::from_host(&onos_host(&format!("mac{i}"), &format!("10.0.0.{i}")))
            })
            .collect(),
    );

    let mut passes = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let reconciler = reconciler.clone();
        let records = records.clone();
        passes.spawn(async move { reconciler.sync(&records).await });
    }
    let mut errors = 0;
    while let Some(joined) = passes.join_next().await {
        if joined.unwrap().is_err() {
            errors += 1;
        }
    }
    assert_eq!(errors, 0);

    let rows = IdentityStore::list(store.as_ref()).await.unwrap();
    assert_eq!(rows.len(), 20);
    let mut ids: Vec<&str> = rows.iter().map(|e| e.stable_id.as_str()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    assert!(ids.iter().all(|id| id.starts_with("host:10.0.0.")));

    let migrated = IdentityStore::get(store.as_ref(), "host:10.0.0.5")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(migrated.friendly_name.as_deref(), Some("edge-server"));
    assert_eq!(store.find_by_address("10.0.0.5").await.unwrap().len(), 1);
}
