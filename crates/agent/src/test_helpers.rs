//! Shared test doubles for the chat pipeline.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use netintent_core::embedding::Embedder;
use netintent_core::error::{ProviderError, RetrievalError, TelemetryError};
use netintent_core::message::Message;
use netintent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use netintent_core::topology::{ResourceKind, TelemetrySource};
use serde_json::{Value, json};

/// A mock provider that returns a sequence of scripted responses and keeps
/// every request it received.
pub struct SequentialMockProvider {
    responses: Mutex<Vec<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        let count = requests.len();

        if count >= responses.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                count,
                responses.len()
            );
        }

        requests.push(request);
        Ok(responses[count].clone())
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        })
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Looks texts up in a table; unknown texts embed to the zero vector.
pub struct TableEmbedder {
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            table: HashMap::new(),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.dimensions]))
    }
}

pub struct FailingEmbedder {
    dimensions: usize,
}

impl FailingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Err(RetrievalError::EmbeddingFailed("model offline".into()))
    }
}

pub struct SlowEmbedder {
    dimensions: usize,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimensions: usize, delay: Duration) -> Self {
        Self { dimensions, delay }
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn name(&self) -> &str {
        "slow"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![0.0; self.dimensions])
    }
}

/// A controller whose state tests can rewrite between syncs.
pub struct ScriptedTelemetry {
    payloads: Mutex<HashMap<ResourceKind, Value>>,
    down: Mutex<bool>,
}

impl ScriptedTelemetry {
    pub fn new() -> Self {
        let payloads = ResourceKind::ALL
            .iter()
            .map(|k| (*k, json!({ k.as_str(): [] })))
            .collect();
        Self {
            payloads: Mutex::new(payloads),
            down: Mutex::new(false),
        }
    }

    pub fn set(&self, kind: ResourceKind, records: Value) {
        self.payloads
            .lock()
            .unwrap()
            .insert(kind, json!({ kind.as_str(): records }));
    }

    pub fn set_down(&self, down: bool) {
        *self.down.lock().unwrap() = down;
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, kind: ResourceKind) -> Result<Value, TelemetryError> {
        if *self.down.lock().unwrap() && kind == ResourceKind::Flows {
            return Err(TelemetryError::Unavailable {
                resource: kind.as_str().into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self
            .payloads
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

pub fn host(mac: &str, ip: &str) -> Value {
    json!({
        "id": format!("{mac}/None"),
        "mac": mac,
        "ipAddresses": [ip],
        "locations": [{"elementId": "of:0000000000000001", "port": "1"}]
    })
}

pub fn switch(id: &str) -> Value {
    json!({"id": id, "type": "SWITCH", "available": true})
}
