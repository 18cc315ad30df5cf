//! Managed entities and the IdentityStore trait.
//!
//! A managed entity is the durable record of a topology element. Its key is
//! a *stable* identifier derived from the telemetry record, not the
//! controller's own id, so operator-assigned names survive controller resets.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of topology element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Switch,
    Host,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Host => "host",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "switch" => Self::Switch,
            "host" => Self::Host,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable record for a topology element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedEntity {
    /// Derived key; immutable once persisted
    pub stable_id: String,

    pub entity_type: EntityType,

    /// Operator-assigned name. Sync never writes it except for the one-time
    /// migration copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Most recent telemetry record, replaced wholesale on each sync
    pub last_metadata: Value,

    /// Addresses carried by the last record (secondary index source)
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Sync pass that last observed this entity
    pub last_seen_seq: u64,

    pub updated_at: DateTime<Utc>,
}

/// One record parsed out of a telemetry payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_type: EntityType,

    /// The controller's own identifier. Not stable across resets for hosts.
    pub native_id: String,

    /// Network addresses, in controller order. The first one is primary.
    pub addresses: Vec<String>,

    /// The record exactly as received
    pub raw: Value,
}

impl EntityRecord {
    /// Parse an ONOS device record (`{"id": "of:...", "type": "SWITCH", ...}`).
    pub fn from_device(raw: &Value) -> Option<Self> {
        let native_id = raw.get("id")?.as_str()?.trim();
        if native_id.is_empty() {
            return None;
        }
        let entity_type = match raw.get("type").and_then(Value::as_str) {
            Some(t) if t.eq_ignore_ascii_case("switch") => EntityType::Switch,
            _ => EntityType::Other,
        };
        Some(Self {
            entity_type,
            native_id: native_id.to_string(),
            addresses: Vec::new(),
            raw: raw.clone(),
        })
    }

    /// Parse an ONOS host record (`{"id": "mac/vlan", "ipAddresses": [...], ...}`).
    ///
    /// A host without an id is still accepted when it carries an address.
    pub fn from_host(raw: &Value) -> Option<Self> {
        let addresses: Vec<String> = raw
            .get("ipAddresses")
            .and_then(Value::as_array)
            .map(|ips| {
                ips.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let native_id = raw
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .or_else(|| addresses.first().cloned())?;

        Some(Self {
            entity_type: EntityType::Host,
            native_id,
            addresses,
            raw: raw.clone(),
        })
    }

    /// The primary network address, if any.
    pub fn primary_address(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }
}

/// What a sync pass writes for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub stable_id: String,
    pub entity_type: EntityType,
    pub addresses: Vec<String>,
    pub metadata: Value,
    pub seen_seq: u64,
}

/// Result of an optimistic upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// A newer sync pass already wrote this row; nothing changed.
    Superseded,
}

/// Persisted mapping from stable keys to entity records.
///
/// Every mutating method is a single atomic operation, and every write to
/// an entity updates the `address -> stable_id` index in the same step.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    fn name(&self) -> &str;

    /// Allocate the next sync sequence number. Strictly increasing.
    async fn next_sync_seq(&self) -> std::result::Result<u64, StoreError>;

    async fn get(&self, stable_id: &str) -> std::result::Result<Option<ManagedEntity>, StoreError>;

    /// Bulk lookup. Unknown keys are skipped.
    async fn get_many(
        &self,
        stable_ids: &[String],
    ) -> std::result::Result<Vec<ManagedEntity>, StoreError>;

    /// All entities whose address list contains `address` exactly.
    async fn find_by_address(
        &self,
        address: &str,
    ) -> std::result::Result<Vec<ManagedEntity>, StoreError>;

    /// All entities, ordered by stable id.
    async fn list(&self) -> std::result::Result<Vec<ManagedEntity>, StoreError>;

    /// Insert or update by `stable_id`. Never touches `friendly_name`, and
    /// never applies an observation older than the stored `last_seen_seq`.
    async fn upsert_observation(
        &self,
        observation: &Observation,
    ) -> std::result::Result<UpsertOutcome, StoreError>;

    /// Create `observation`'s row carrying the friendly name of `orphan_id`,
    /// then delete the orphan, as one atomic write. Returns the target's
    /// resulting friendly name.
    ///
    /// If the target row already has a name it is kept.
    async fn migrate(
        &self,
        orphan_id: &str,
        observation: &Observation,
    ) -> std::result::Result<Option<String>, StoreError>;

    /// Set or clear a name. Returns `false` when the entity does not exist.
    async fn set_friendly_name(
        &self,
        stable_id: &str,
        name: Option<&str>,
    ) -> std::result::Result<bool, StoreError>;

    /// Delete an entity and its address index entries.
    async fn delete(&self, stable_id: &str) -> std::result::Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_switch_device() {
        let rec = EntityRecord::from_device(&json!({"id": "of:0001", "type": "SWITCH"})).unwrap();
        assert_eq!(rec.entity_type, EntityType::Switch);
        assert_eq!(rec.native_id, "of:0001");
        assert!(rec.addresses.is_empty());
    }

    #[test]
    fn non_switch_device_is_other() {
        let rec = EntityRecord::from_device(&json!({"id": "rt1", "type": "ROUTER"})).unwrap();
        assert_eq!(rec.entity_type, EntityType::Other);
    }

    #[test]
    fn device_without_id_is_skipped() {
        assert!(EntityRecord::from_device(&json!({"type": "SWITCH"})).is_none());
    }

    #[test]
    fn parses_host_addresses_in_order() {
        let rec = EntityRecord::from_host(&json!({
            "id": "00:00:00:00:00:01/None",
            "ipAddresses": ["10.0.0.1", "fe80::1"]
        }))
        .unwrap();
        assert_eq!(rec.entity_type, EntityType::Host);
        assert_eq!(rec.primary_address(), Some("10.0.0.1"));
        assert_eq!(rec.addresses.len(), 2);
    }

    #[test]
    fn host_without_id_or_address_is_skipped() {
        assert!(EntityRecord::from_host(&json!({"ipAddresses": []})).is_none());
        let rec = EntityRecord::from_host(&json!({"ipAddresses": ["10.0.0.9"]})).unwrap();
        assert_eq!(rec.native_id, "10.0.0.9");
    }

    #[test]
    fn entity_type_round_trips_names() {
        for t in [EntityType::Switch, EntityType::Host, EntityType::Other] {
            assert_eq!(EntityType::parse(t.as_str()), t);
        }
    }
}
