//! SQLite store for entities, samples, and conversations.
//!
//! One database file, six tables:
//! - `managed_entities` - one row per stable id
//! - `entity_addresses` - secondary index `address -> stable_id`
//! - `sync_sequence` - single-row counter for sync passes
//! - `config_samples` - samples with their embedding blob
//! - `conversations` / `messages` - append-only chat log
//!
//! Entity writes and their index rows always go through one transaction.

use crate::vector;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use netintent_core::conversation::ConversationStore;
use netintent_core::error::StoreError;
use netintent_core::identity::{
    EntityType, IdentityStore, ManagedEntity, Observation, UpsertOutcome,
};
use netintent_core::message::{Conversation, ConversationId, Message, Role};
use netintent_core::sample::{
    ConfigSample, NewConfigSample, SampleFilter, SampleStore, SampleUpdate, ScoredSample,
};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite store implementing all three persistence traits.
pub struct SqliteStore {
    pool: SqlitePool,
    dimensions: usize,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database; it is pinned to a
    /// single connection so every query sees the same data.
    pub async fn new(path: &str, dimensions: usize) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool, dimensions };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Open a database file on disk.
    pub async fn open(path: &std::path::Path, dimensions: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        Self::new(&format!("sqlite://{}", path.display()), dimensions).await
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 9] = [
            (
                "managed_entities table",
                r#"
                CREATE TABLE IF NOT EXISTS managed_entities (
                    stable_id      TEXT PRIMARY KEY NOT NULL,
                    entity_type    TEXT NOT NULL,
                    friendly_name  TEXT,
                    last_metadata  TEXT NOT NULL,
                    addresses      TEXT NOT NULL DEFAULT '[]',
                    first_seen_seq INTEGER NOT NULL,
                    last_seen_seq  INTEGER NOT NULL,
                    updated_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "entity_addresses table",
                r#"
                CREATE TABLE IF NOT EXISTS entity_addresses (
                    address   TEXT NOT NULL,
                    stable_id TEXT NOT NULL
                        REFERENCES managed_entities(stable_id) ON DELETE CASCADE,
                    PRIMARY KEY (address, stable_id)
                )
                "#,
            ),
            (
                "entity_addresses index",
                "CREATE INDEX IF NOT EXISTS idx_entity_addresses_stable ON entity_addresses(stable_id)",
            ),
            (
                "sync_sequence table",
                r#"
                CREATE TABLE IF NOT EXISTS sync_sequence (
                    id    INTEGER PRIMARY KEY CHECK (id = 1),
                    value INTEGER NOT NULL
                )
                "#,
            ),
            (
                "sync_sequence seed",
                "INSERT OR IGNORE INTO sync_sequence (id, value) VALUES (1, 0)",
            ),
            (
                "config_samples table",
                r#"
                CREATE TABLE IF NOT EXISTS config_samples (
                    sample_id      INTEGER PRIMARY KEY AUTOINCREMENT,
                    category       TEXT NOT NULL,
                    intent_text    TEXT NOT NULL,
                    config_json    TEXT NOT NULL,
                    extra_metadata TEXT,
                    embedding      BLOB NOT NULL,
                    created_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id         TEXT PRIMARY KEY NOT NULL,
                    title      TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    message_id      INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL
                        REFERENCES conversations(id) ON DELETE CASCADE,
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    created_at      TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, message_id)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
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

    async fn begin(&self) -> Result<Transaction<'_, Sqlite>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))
    }

    /// Replace the index rows of one entity.
    async fn reindex(
        tx: &mut Transaction<'_, Sqlite>,
        stable_id: &str,
        addresses: &[String],
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM entity_addresses WHERE stable_id = ?1")
            .bind(stable_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Index clear failed: {e}")))?;

        for address in addresses {
            sqlx::query(
                "INSERT OR IGNORE INTO entity_addresses (address, stable_id) VALUES (?1, ?2)",
            )
            .bind(address)
            .bind(stable_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Index insert failed: {e}")))?;
        }
        Ok(())
    }

    fn row_to_entity(row: &SqliteRow) -> Result<ManagedEntity, StoreError> {
        let stable_id: String = row
            .try_get("stable_id")
            .map_err(|e| StoreError::QueryFailed(format!("stable_id column: {e}")))?;
        let entity_type: String = row
            .try_get("entity_type")
            .map_err(|e| StoreError::QueryFailed(format!("entity_type column: {e}")))?;
        let friendly_name: Option<String> = row
            .try_get("friendly_name")
            .map_err(|e| StoreError::QueryFailed(format!("friendly_name column: {e}")))?;
        let metadata: String = row
            .try_get("last_metadata")
            .map_err(|e| StoreError::QueryFailed(format!("last_metadata column: {e}")))?;
        let addresses: String = row
            .try_get("addresses")
            .map_err(|e| StoreError::QueryFailed(format!("addresses column: {e}")))?;
        let last_seen_seq: i64 = row
            .try_get("last_seen_seq")
            .map_err(|e| StoreError::QueryFailed(format!("last_seen_seq column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(ManagedEntity {
            stable_id,
            entity_type: EntityType::parse(&entity_type),
            friendly_name,
            last_metadata: parse_json(&metadata)?,
            addresses: serde_json::from_str(&addresses)
                .map_err(|e| StoreError::QueryFailed(format!("addresses decode: {e}")))?,
            last_seen_seq: last_seen_seq.max(0) as u64,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_sample(row: &SqliteRow) -> Result<ConfigSample, StoreError> {
        let sample_id: i64 = row
            .try_get("sample_id")
            .map_err(|e| StoreError::QueryFailed(format!("sample_id column: {e}")))?;
        let category: String = row
            .try_get("category")
            .map_err(|e| StoreError::QueryFailed(format!("category column: {e}")))?;
        let intent_text: String = row
            .try_get("intent_text")
            .map_err(|e| StoreError::QueryFailed(format!("intent_text column: {e}")))?;
        let config_json: String = row
            .try_get("config_json")
            .map_err(|e| StoreError::QueryFailed(format!("config_json column: {e}")))?;
        let extra: Option<String> = row
            .try_get("extra_metadata")
            .map_err(|e| StoreError::QueryFailed(format!("extra_metadata column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| StoreError::QueryFailed(format!("embedding column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(ConfigSample {
            sample_id,
            category,
            intent_text,
            config_payload: parse_json(&config_json)?,
            extra_metadata: extra.as_deref().map(parse_json).transpose()?,
            embedding: blob_to_embedding(&blob),
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(Conversation {
            id: ConversationId(id),
            title,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("timestamp {s:?}: {e}")))
}

fn to_json(value: &Value) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("JSON encode: {e}")))
}

fn parse_json(s: &str) -> Result<Value, StoreError> {
    serde_json::from_str(s).map_err(|e| StoreError::QueryFailed(format!("JSON decode: {e}")))
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Trimmed, non-empty filter value.
fn filter_value(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl IdentityStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn next_sync_seq(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("UPDATE sync_sequence SET value = value + 1 WHERE id = 1 RETURNING value")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Sequence bump failed: {e}")))?;
        let value: i64 = row
            .try_get("value")
            .map_err(|e| StoreError::QueryFailed(format!("value column: {e}")))?;
        Ok(value.max(0) as u64)
    }

    async fn get(&self, stable_id: &str) -> Result<Option<ManagedEntity>, StoreError> {
        let row = sqlx::query("SELECT * FROM managed_entities WHERE stable_id = ?1")
            .bind(stable_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Entity lookup: {e}")))?;
        row.as_ref().map(Self::row_to_entity).transpose()
    }

    async fn get_many(&self, stable_ids: &[String]) -> Result<Vec<ManagedEntity>, StoreError> {
        if stable_ids.is_empty() {
            return Ok(vec![]);
        }
        let placeholders: Vec<String> = (1..=stable_ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT * FROM managed_entities WHERE stable_id IN ({}) ORDER BY stable_id",
            placeholders.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for id in stable_ids {
            query = query.bind(id);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Bulk entity lookup: {e}")))?;
        rows.iter().map(Self::row_to_entity).collect()
    }

    async fn find_by_address(&self, address: &str) -> Result<Vec<ManagedEntity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.* FROM managed_entities e
            JOIN entity_addresses a ON a.stable_id = e.stable_id
            WHERE a.address = ?1
            ORDER BY e.stable_id
            "#,
        )
        .bind(address)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Address lookup: {e}")))?;
        rows.iter().map(Self::row_to_entity).collect()
    }

    async fn list(&self) -> Result<Vec<ManagedEntity>, StoreError> {
        let rows = sqlx::query("SELECT * FROM managed_entities ORDER BY stable_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Entity list: {e}")))?;
        rows.iter().map(Self::row_to_entity).collect()
    }

    async fn upsert_observation(&self, obs: &Observation) -> Result<UpsertOutcome, StoreError> {
        let metadata = to_json(&obs.metadata)?;
        let addresses = to_json(&Value::from(obs.addresses.clone()))?;
        let seq = obs.seen_seq as i64;

        let mut tx = self.begin().await?;
        // The first statement writes, so the transaction holds the write lock
        // before anything is read.
        let row = sqlx::query(
            r#"
            INSERT INTO managed_entities
                (stable_id, entity_type, friendly_name, last_metadata, addresses,
                 first_seen_seq, last_seen_seq, updated_at)
            VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?5, ?6)
            ON CONFLICT(stable_id) DO UPDATE SET
                entity_type = excluded.entity_type,
                last_metadata = excluded.last_metadata,
                addresses = excluded.addresses,
                last_seen_seq = excluded.last_seen_seq,
                updated_at = excluded.updated_at
            WHERE excluded.last_seen_seq >= managed_entities.last_seen_seq
            RETURNING first_seen_seq
            "#,
        )
        .bind(&obs.stable_id)
        .bind(obs.entity_type.as_str())
        .bind(&metadata)
        .bind(&addresses)
        .bind(seq)
        .bind(timestamp(Utc::now()))
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Entity upsert failed: {e}")))?;

        let Some(row) = row else {
            debug!(stable_id = %obs.stable_id, seq, "Skipped superseded observation");
            return Ok(UpsertOutcome::Superseded);
        };
        let first_seen: i64 = row
            .try_get("first_seen_seq")
            .map_err(|e| StoreError::QueryFailed(format!("first_seen_seq column: {e}")))?;

        Self::reindex(&mut tx, &obs.stable_id, &obs.addresses).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(stable_id = %obs.stable_id, seq, "Upserted entity");
        if first_seen == seq {
            Ok(UpsertOutcome::Created)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    async fn migrate(
        &self,
        orphan_id: &str,
        obs: &Observation,
    ) -> Result<Option<String>, StoreError> {
        let metadata = to_json(&obs.metadata)?;
        let addresses = to_json(&Value::from(obs.addresses.clone()))?;
        let seq = obs.seen_seq as i64;

        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO managed_entities
                (stable_id, entity_type, friendly_name, last_metadata, addresses,
                 first_seen_seq, last_seen_seq, updated_at)
            VALUES (
                ?1, ?2,
                (SELECT friendly_name FROM managed_entities WHERE stable_id = ?7),
                ?3, ?4, ?5, ?5, ?6
            )
            ON CONFLICT(stable_id) DO UPDATE SET
                entity_type = CASE WHEN excluded.last_seen_seq >= managed_entities.last_seen_seq
                    THEN excluded.entity_type ELSE managed_entities.entity_type END,
                last_metadata = CASE WHEN excluded.last_seen_seq >= managed_entities.last_seen_seq
                    THEN excluded.last_metadata ELSE managed_entities.last_metadata END,
                addresses = CASE WHEN excluded.last_seen_seq >= managed_entities.last_seen_seq
                    THEN excluded.addresses ELSE managed_entities.addresses END,
                last_seen_seq = MAX(managed_entities.last_seen_seq, excluded.last_seen_seq),
                friendly_name = COALESCE(managed_entities.friendly_name, excluded.friendly_name),
                updated_at = excluded.updated_at
            RETURNING friendly_name, last_seen_seq
            "#,
        )
        .bind(&obs.stable_id)
        .bind(obs.entity_type.as_str())
        .bind(&metadata)
        .bind(&addresses)
        .bind(seq)
        .bind(timestamp(Utc::now()))
        .bind(orphan_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Migration insert failed: {e}")))?;

        let name: Option<String> = row
            .try_get("friendly_name")
            .map_err(|e| StoreError::QueryFailed(format!("friendly_name column: {e}")))?;
        let stored_seq: i64 = row
            .try_get("last_seen_seq")
            .map_err(|e| StoreError::QueryFailed(format!("last_seen_seq column: {e}")))?;

        if orphan_id != obs.stable_id {
            sqlx::query("DELETE FROM entity_addresses WHERE stable_id = ?1")
                .bind(orphan_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("Orphan index delete failed: {e}")))?;
            sqlx::query("DELETE FROM managed_entities WHERE stable_id = ?1")
                .bind(orphan_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Storage(format!("Orphan delete failed: {e}")))?;
        }

        // Leave the index alone when a newer pass already wrote the target.
        if stored_seq == seq {
            Self::reindex(&mut tx, &obs.stable_id, &obs.addresses).await?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(from = %orphan_id, to = %obs.stable_id, "Migrated entity");
        Ok(name)
    }

    async fn set_friendly_name(
        &self,
        stable_id: &str,
        name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE managed_entities SET friendly_name = ?1, updated_at = ?2 WHERE stable_id = ?3",
        )
        .bind(name)
        .bind(timestamp(Utc::now()))
        .bind(stable_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Rename failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, stable_id: &str) -> Result<bool, StoreError> {
        let mut tx = self.begin().await?;
        let result = sqlx::query("DELETE FROM managed_entities WHERE stable_id = ?1")
            .bind(stable_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Entity delete failed: {e}")))?;
        sqlx::query("DELETE FROM entity_addresses WHERE stable_id = ?1")
            .bind(stable_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Index delete failed: {e}")))?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SampleStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
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
        let config_json = to_json(&sample.config_payload)?;
        let extra = sample.extra_metadata.as_ref().map(to_json).transpose()?;

        let row = sqlx::query(
            r#"
            INSERT INTO config_samples
                (category, intent_text, config_json, extra_metadata, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(&sample.category)
        .bind(&sample.intent_text)
        .bind(&config_json)
        .bind(extra.as_deref())
        .bind(embedding_to_blob(&embedding))
        .bind(timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Sample insert failed: {e}")))?;

        let stored = Self::row_to_sample(&row)?;
        debug!(sample_id = stored.sample_id, "Stored config sample");
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
        let config_json = update.config_payload.as_ref().map(to_json).transpose()?;
        let extra = update.extra_metadata.as_ref().map(to_json).transpose()?;
        let blob = embedding.as_deref().map(embedding_to_blob);

        let row = sqlx::query(
            r#"
            UPDATE config_samples SET
                category = COALESCE(?1, category),
                intent_text = COALESCE(?2, intent_text),
                config_json = COALESCE(?3, config_json),
                extra_metadata = COALESCE(?4, extra_metadata),
                embedding = COALESCE(?5, embedding)
            WHERE sample_id = ?6
            RETURNING *
            "#,
        )
        .bind(update.category.as_deref())
        .bind(update.intent_text.as_deref())
        .bind(config_json.as_deref())
        .bind(extra.as_deref())
        .bind(blob.as_deref())
        .bind(sample_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Sample update failed: {e}")))?;

        row.as_ref().map(Self::row_to_sample).transpose()
    }

    async fn delete(&self, sample_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM config_samples WHERE sample_id = ?1")
            .bind(sample_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Sample delete failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, sample_id: i64) -> Result<Option<ConfigSample>, StoreError> {
        let row = sqlx::query("SELECT * FROM config_samples WHERE sample_id = ?1")
            .bind(sample_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Sample lookup: {e}")))?;
        row.as_ref().map(Self::row_to_sample).transpose()
    }

    async fn list(&self, filter: &SampleFilter) -> Result<Vec<ConfigSample>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM config_samples
            WHERE (?1 IS NULL OR lower(category) = ?1)
              AND (?2 IS NULL
                   OR instr(lower(intent_text), ?2) > 0
                   OR instr(lower(category), ?2) > 0)
            ORDER BY sample_id DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(filter_value(&filter.category))
        .bind(filter_value(&filter.query))
        .bind(filter.limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Sample list: {e}")))?;
        rows.iter().map(Self::row_to_sample).collect()
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredSample>, StoreError> {
        self.check_dimensions(query)?;
        let rows = sqlx::query("SELECT * FROM config_samples")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Sample scan: {e}")))?;
        let samples: Vec<ConfigSample> = rows
            .iter()
            .map(Self::row_to_sample)
            .collect::<Result<_, _>>()?;
        Ok(vector::rank_nearest(&samples, query, limit))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM config_samples")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Count: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, title: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(conversation.id.as_str())
        .bind(conversation.title.as_deref())
        .bind(timestamp(conversation.created_at))
        .bind(timestamp(conversation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Conversation insert failed: {e}")))?;
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Conversation lookup: {e}")))?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn list(&self) -> Result<Vec<Conversation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversations ORDER BY updated_at DESC, created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Conversation list: {e}")))?;
        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn history(&self, id: &ConversationId) -> Result<Vec<Message>, StoreError> {
        if ConversationStore::get(self, id).await?.is_none() {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }
        let rows = sqlx::query(
            "SELECT role, content, created_at FROM messages WHERE conversation_id = ?1 ORDER BY message_id",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("History: {e}")))?;

        rows.iter()
            .map(|row| {
                let role: String = row
                    .try_get("role")
                    .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
                let content: String = row
                    .try_get("content")
                    .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
                let created_at: String = row
                    .try_get("created_at")
                    .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
                Ok(Message {
                    role: Role::parse_lenient(&role),
                    content,
                    timestamp: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn append(
        &self,
        id: &ConversationId,
        messages: &[Message],
        title: Option<&str>,
    ) -> Result<Conversation, StoreError> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE conversations
            SET updated_at = ?1, title = COALESCE(title, ?2)
            WHERE id = ?3
            RETURNING *
            "#,
        )
        .bind(timestamp(Utc::now()))
        .bind(title)
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Conversation touch failed: {e}")))?;

        let Some(row) = row else {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        };
        let conversation = Self::row_to_conversation(&row)?;

        for message in messages {
            sqlx::query(
                "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(id.as_str())
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(timestamp(message.timestamp))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Message insert failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(conversation = %id, count = messages.len(), "Appended messages");
        Ok(conversation)
    }
}
