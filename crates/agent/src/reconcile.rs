//! Identity reconciliation.
//!
//! The controller assigns hosts ids that change across resets, so entities
//! are keyed by a stable key derived from the record instead. When a host
//! shows up under a new key, its address is used to find the row it used to
//! live under and carry the operator's name across.
//!
//! # Sync pass
//!
//! 1. Allocate a sync sequence number.
//! 2. Per record: compute the stable key. New key with an address → look for
//!    exactly one other row holding that address and migrate it; two or more
//!    is a conflict and nothing is migrated. Otherwise upsert.
//! 3. Collect confirmed duplicates: non-live host rows sharing an address
//!    with a live host row.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use netintent_core::error::{ReconciliationConflict, StoreError, TelemetryError};
use netintent_core::identity::{
    EntityRecord, EntityType, IdentityStore, ManagedEntity, Observation, UpsertOutcome,
};
use netintent_core::topology::{ResourceKind, TelemetrySource, TopologySnapshot};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Stable key of a record: `host:<primary address>` when it has one,
/// otherwise the controller's own id.
pub fn stable_key_of(record: &EntityRecord) -> String {
    match record.primary_address() {
        Some(address) => format!("host:{address}"),
        None => record.native_id.clone(),
    }
}

/// A name carried from an orphaned row to its new stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Migration {
    pub from: String,
    pub to: String,
    pub friendly_name: Option<String>,
}

/// What one sync pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SnapshotResult {
    pub seq: u64,
    /// Every stable key observed in this pass
    pub live_keys: BTreeSet<String>,
    pub created: usize,
    pub updated: usize,
    /// Rows already written by a newer pass
    pub superseded: usize,
    pub migrated: Vec<Migration>,
    /// Duplicates deleted by garbage collection
    pub collected: Vec<String>,
    pub conflicts: Vec<ReconciliationConflict>,
}

/// A managed entity with its liveness.
#[derive(Debug, Clone, Serialize)]
pub struct EntityView {
    #[serde(flatten)]
    pub entity: ManagedEntity,
    pub active: bool,
}

/// A fresh snapshot and, if the identity store was reachable, the sync that
/// produced its names.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub snapshot: TopologySnapshot,
    pub reconciliation: Option<SnapshotResult>,
}

pub struct Reconciler {
    store: Arc<dyn IdentityStore>,
    fetch_timeout: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn IdentityStore>, fetch_timeout: Duration) -> Self {
        Self {
            store,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// Reconcile one telemetry pass against the identity store.
    pub async fn sync(
        &self,
        records: &[EntityRecord],
    ) -> std::result::Result<SnapshotResult, StoreError> {
        let seq = self.store.next_sync_seq().await?;
        let mut result = SnapshotResult {
            seq,
            ..Default::default()
        };

        let mut pass: Vec<(String, &EntityRecord)> = Vec::with_capacity(records.len());
        for record in records {
            let key = stable_key_of(record);
            if result.live_keys.insert(key.clone()) {
                pass.push((key, record));
            } else {
                debug!(stable_id = %key, "Duplicate record in sync pass, keeping the first");
            }
        }

        let mut conflicted: HashSet<String> = HashSet::new();

        for (key, record) in &pass {
            let observation = Observation {
                stable_id: key.clone(),
                entity_type: record.entity_type,
                addresses: record.addresses.clone(),
                metadata: record.raw.clone(),
                seen_seq: seq,
            };

            let Some(address) = record.primary_address() else {
                self.upsert(&observation, &mut result).await?;
                continue;
            };
            if self.store.get(key).await?.is_some() {
                self.upsert(&observation, &mut result).await?;
                continue;
            }

            let candidates: Vec<String> = self
                .store
                .find_by_address(address)
                .await?
                .into_iter()
                .map(|e| e.stable_id)
                .filter(|id| !result.live_keys.contains(id))
                .collect();

            match candidates.len() {
                0 => self.upsert(&observation, &mut result).await?,
                1 => {
                    let orphan = &candidates[0];
                    let friendly_name = self.store.migrate(orphan, &observation).await?;
                    info!(
                        from = %orphan,
                        to = %key,
                        friendly_name = ?friendly_name,
                        "Migrated entity to stable key"
                    );
                    result.migrated.push(Migration {
                        from: orphan.clone(),
                        to: key.clone(),
                        friendly_name,
                    });
                }
                _ => {
                    let conflict = ReconciliationConflict {
                        stable_id: key.clone(),
                        address: address.to_string(),
                        candidates,
                    };
                    warn!(
                        stable_id = %conflict.stable_id,
                        address = %conflict.address,
                        candidates = ?conflict.candidates,
                        "Ambiguous migration, leaving existing rows untouched"
                    );
                    conflicted.insert(conflict.address.clone());
                    result.conflicts.push(conflict);
                    self.upsert(&observation, &mut result).await?;
                }
            }
        }

        for (key, record) in &pass {
            if record.entity_type != EntityType::Host {
                continue;
            }
            for address in &record.addresses {
                if conflicted.contains(address) {
                    continue;
                }
                self.collect_duplicates(key, address, &mut result).await?;
            }
        }

        Ok(result)
    }

    async fn upsert(
        &self,
        observation: &Observation,
        result: &mut SnapshotResult,
    ) -> std::result::Result<(), StoreError> {
        match self.store.upsert_observation(observation).await? {
            UpsertOutcome::Created => result.created += 1,
            UpsertOutcome::Updated => result.updated += 1,
            UpsertOutcome::Superseded => {
                debug!(
                    stable_id = %observation.stable_id,
                    seq = observation.seen_seq,
                    "Skipped write, a newer pass already observed this entity"
                );
                result.superseded += 1;
            }
        }
        Ok(())
    }

    /// Delete the single non-live host row sharing `address` with the live
    /// row `live_key`. Ambiguous holders, and names the live row would lose,
    /// are left alone.
    async fn collect_duplicates(
        &self,
        live_key: &str,
        address: &str,
        result: &mut SnapshotResult,
    ) -> std::result::Result<(), StoreError> {
        let holders = self.store.find_by_address(address).await?;
        let live_named = holders
            .iter()
            .any(|e| e.stable_id == live_key && e.friendly_name.is_some());
        let stale: Vec<&ManagedEntity> = holders
            .iter()
            .filter(|e| e.entity_type == EntityType::Host && !result.live_keys.contains(&e.stable_id))
            .collect();

        match stale.as_slice() {
            [] => {}
            [dup] if dup.friendly_name.is_none() || live_named => {
                if self.store.delete(&dup.stable_id).await? {
                    info!(
                        stable_id = %dup.stable_id,
                        superseded_by = %live_key,
                        address,
                        "Collected duplicate entity"
                    );
                    result.collected.push(dup.stable_id.clone());
                }
            }
            _ => debug!(
                address,
                stale = stale.len(),
                "Retaining stale rows that share a live address"
            ),
        }
        Ok(())
    }

    /// Fetch every resource, sync identities, and name the records.
    ///
    /// The identity store is only written after every fetch succeeded. If
    /// the store itself fails, the snapshot is returned without names.
    pub async fn refresh(
        &self,
        source: &dyn TelemetrySource,
    ) -> std::result::Result<RefreshOutcome, TelemetryError> {
        let fetches = ResourceKind::ALL.iter().map(|kind| source.fetch(*kind));
        let payloads = tokio::time::timeout(
            self.fetch_timeout,
            futures::future::try_join_all(fetches),
        )
        .await
        .map_err(|_| TelemetryError::Timeout {
            resource: "topology".into(),
            timeout_secs: self.fetch_timeout.as_secs(),
        })??;

        let mut snapshot = TopologySnapshot::empty();
        for (kind, payload) in ResourceKind::ALL.into_iter().zip(payloads) {
            *snapshot.resource_mut(kind) = payload;
        }

        let records = records_of(&snapshot);
        let reconciliation = match self.sync(&records).await {
            Ok(result) => {
                info!(
                    source = source.name(),
                    seq = result.seq,
                    live = result.live_keys.len(),
                    created = result.created,
                    updated = result.updated,
                    migrated = result.migrated.len(),
                    collected = result.collected.len(),
                    conflicts = result.conflicts.len(),
                    "Identity sync complete"
                );
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, "Identity sync failed, names omitted this turn");
                snapshot.note = Some(format!("Identity store unavailable ({e}); names omitted."));
                None
            }
        };

        if reconciliation.is_some() {
            if let Err(e) = self.enrich(&mut snapshot).await {
                warn!(error = %e, "Name lookup failed, names omitted this turn");
                snapshot.note = Some(format!("Identity store unavailable ({e}); names omitted."));
            }
        }

        Ok(RefreshOutcome {
            snapshot,
            reconciliation,
        })
    }

    async fn enrich(&self, snapshot: &mut TopologySnapshot) -> std::result::Result<(), StoreError> {
        let keys: Vec<String> = records_of(snapshot).iter().map(stable_key_of).collect();
        let names: HashMap<String, Option<String>> = self
            .store
            .get_many(&keys)
            .await?
            .into_iter()
            .map(|e| (e.stable_id, e.friendly_name))
            .collect();

        for kind in [ResourceKind::Devices, ResourceKind::Hosts] {
            let Some(items) = snapshot
                .resource_mut(kind)
                .get_mut(kind.as_str())
                .and_then(Value::as_array_mut)
            else {
                continue;
            };
            for item in items.iter_mut() {
                let Some(record) = parse_record(kind, item) else {
                    continue;
                };
                let key = stable_key_of(&record);
                let name = names.get(&key).cloned().flatten();
                annotate(item, key, name);
            }
        }
        Ok(())
    }

    /// Snapshot rebuilt from the entities seen in the latest sync pass.
    /// Links, flows and intents are not stored and come back empty.
    pub async fn last_known_good(&self) -> std::result::Result<TopologySnapshot, StoreError> {
        let entities = self.store.list().await?;
        let latest = entities.iter().map(|e| e.last_seen_seq).max().unwrap_or(0);

        let mut devices = Vec::new();
        let mut hosts = Vec::new();
        for entity in entities.iter().filter(|e| e.last_seen_seq == latest) {
            let mut item = entity.last_metadata.clone();
            annotate(
                &mut item,
                entity.stable_id.clone(),
                entity.friendly_name.clone(),
            );
            match entity.entity_type {
                EntityType::Host => hosts.push(item),
                EntityType::Switch | EntityType::Other => devices.push(item),
            }
        }

        let mut snapshot = TopologySnapshot::empty();
        let count = devices.len() + hosts.len();
        snapshot.devices = json!({ "devices": devices });
        snapshot.hosts = json!({ "hosts": hosts });
        snapshot.stale = true;
        snapshot.note = Some(format!(
            "Live telemetry unavailable; showing the last known state of {count} entities \
             (sync pass {latest}). Links, flows and intents are omitted."
        ));
        Ok(snapshot)
    }

    /// Set or clear an operator name. Blank names clear. Returns `false`
    /// for unknown entities; no row is ever created here.
    pub async fn set_friendly_name(
        &self,
        stable_id: &str,
        name: Option<&str>,
    ) -> std::result::Result<bool, StoreError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let found = self.store.set_friendly_name(stable_id, name).await?;
        if found {
            info!(stable_id, friendly_name = ?name, "Updated friendly name");
        } else {
            debug!(stable_id, "Friendly name target not found");
        }
        Ok(found)
    }

    /// Delete an entity outright.
    pub async fn forget(&self, stable_id: &str) -> std::result::Result<bool, StoreError> {
        let deleted = self.store.delete(stable_id).await?;
        if deleted {
            info!(stable_id, "Forgot entity");
        }
        Ok(deleted)
    }

    /// All stored entities. Active means present in `live_keys`, or when no
    /// live set is known, seen in the latest pass.
    pub async fn managed_entities(
        &self,
        live_keys: Option<&BTreeSet<String>>,
    ) -> std::result::Result<Vec<EntityView>, StoreError> {
        let entities = self.store.list().await?;
        let latest = entities.iter().map(|e| e.last_seen_seq).max().unwrap_or(0);
        Ok(entities
            .into_iter()
            .map(|entity| {
                let active = match live_keys {
                    Some(live) => live.contains(&entity.stable_id),
                    None => entity.last_seen_seq == latest,
                };
                EntityView { entity, active }
            })
            .collect())
    }
}

fn parse_record(kind: ResourceKind, item: &Value) -> Option<EntityRecord> {
    match kind {
        ResourceKind::Devices => EntityRecord::from_device(item),
        ResourceKind::Hosts => EntityRecord::from_host(item),
        _ => None,
    }
}

/// Entity records in a snapshot: devices first, then hosts.
pub fn records_of(snapshot: &TopologySnapshot) -> Vec<EntityRecord> {
    let mut records = Vec::new();
    for kind in [ResourceKind::Devices, ResourceKind::Hosts] {
        let items = snapshot.records(kind);
        let before = records.len();
        records.extend(items.iter().filter_map(|item| parse_record(kind, item)));
        let skipped = items.len() - (records.len() - before);
        if skipped > 0 {
            debug!(resource = %kind, skipped, "Skipped records without an id or address");
        }
    }
    records
}

fn annotate(item: &mut Value, managed_id: String, friendly_name: Option<String>) {
    if let Some(obj) = item.as_object_mut() {
        obj.insert("managed_id".into(), Value::String(managed_id));
        obj.insert(
            "friendly_name".into(),
            friendly_name.map(Value::String).unwrap_or(Value::Null),
        );
    }
}
