//! Telemetry source trait and topology snapshots.

use crate::error::TelemetryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A resource the controller exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Devices,
    Links,
    Hosts,
    Flows,
    Intents,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        Self::Devices,
        Self::Links,
        Self::Hosts,
        Self::Flows,
        Self::Intents,
    ];

    /// Path segment relative to the controller API root. Also the key of
    /// the record array inside the payload.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Links => "links",
            Self::Hosts => "hosts",
            Self::Flows => "flows",
            Self::Intents => "intents",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to the controller's live state.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch one resource. Returns the payload as sent by the controller,
    /// e.g. `{"devices": [...]}`.
    async fn fetch(&self, kind: ResourceKind) -> std::result::Result<Value, TelemetryError>;
}

/// Network state handed to the prompt assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub devices: Value,
    pub links: Value,
    pub hosts: Value,
    pub intents: Value,
    pub flows: Value,

    /// True when this was rebuilt from stored state instead of a live fetch
    #[serde(default)]
    pub stale: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    pub captured_at: DateTime<Utc>,
}

impl TopologySnapshot {
    pub fn empty() -> Self {
        Self {
            devices: json!({ "devices": [] }),
            links: json!({ "links": [] }),
            hosts: json!({ "hosts": [] }),
            intents: json!({ "intents": [] }),
            flows: json!({ "flows": [] }),
            stale: false,
            note: None,
            captured_at: Utc::now(),
        }
    }

    pub fn resource(&self, kind: ResourceKind) -> &Value {
        match kind {
            ResourceKind::Devices => &self.devices,
            ResourceKind::Links => &self.links,
            ResourceKind::Hosts => &self.hosts,
            ResourceKind::Flows => &self.flows,
            ResourceKind::Intents => &self.intents,
        }
    }

    pub fn resource_mut(&mut self, kind: ResourceKind) -> &mut Value {
        match kind {
            ResourceKind::Devices => &mut self.devices,
            ResourceKind::Links => &mut self.links,
            ResourceKind::Hosts => &mut self.hosts,
            ResourceKind::Flows => &mut self.flows,
            ResourceKind::Intents => &mut self.intents,
        }
    }

    /// The record array of a resource; empty when the payload lacks it.
    pub fn records(&self, kind: ResourceKind) -> &[Value] {
        self.resource(kind)
            .get(kind.as_str())
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The combined state document embedded in grounded prompts.
    pub fn state_json(&self) -> Value {
        json!({
            "devices": self.devices,
            "links": self.links,
            "hosts": self.hosts,
            "intents": self.intents,
            "flows": self.flows,
        })
    }
}
