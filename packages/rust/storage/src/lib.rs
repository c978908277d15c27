//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding three things:
//! - persisted enrichment results (`message_enrichments`, upsert by `message_id`)
//! - TTL'd key/value cache entries (`cache_entries`)
//! - a durable FIFO work queue (`queue_messages`)
//!
//! Values are stored as JSON text; callers own the shapes.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use enrichment_shared::{EnrichmentError, EnrichmentResult, Result};
use libsql::{Connection, Database, params};
use uuid::Uuid;

fn db_err(e: libsql::Error) -> EnrichmentError {
    EnrichmentError::Storage(e.to_string())
}

/// A message claimed from the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: String,
    pub payload_json: String,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EnrichmentError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;
        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        let purged = storage.purge_expired().await?;
        if purged > 0 {
            tracing::debug!(purged, "purged expired cache entries");
        }
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        EnrichmentError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Enrichment results
    // -----------------------------------------------------------------------

    /// Insert or replace the persisted enrichment for `result.message_id`.
    pub async fn upsert_enrichment(&self, result: &EnrichmentResult) -> Result<()> {
        let result_json = serde_json::to_string(result)?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO message_enrichments (
                    message_id, user_id, organization_id, is_work, primary_topic, primary_intent,
                    quality_score, has_pii, overall_confidence, model_used, result_json,
                    enriched_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(message_id) DO UPDATE SET
                   user_id = excluded.user_id,
                   organization_id = excluded.organization_id,
                   is_work = excluded.is_work,
                   primary_topic = excluded.primary_topic,
                   primary_intent = excluded.primary_intent,
                   quality_score = excluded.quality_score,
                   has_pii = excluded.has_pii,
                   overall_confidence = excluded.overall_confidence,
                   model_used = excluded.model_used,
                   result_json = excluded.result_json,
                   enriched_at = excluded.enriched_at,
                   updated_at = excluded.updated_at",
                params![
                    result.message_id.as_str(),
                    result.user_id.as_str(),
                    result.organization_id.as_str(),
                    result.work_classification.as_ref().map(|w| w.is_work as i64),
                    result.topic_classification.as_ref().map(|t| t.primary.clone()),
                    result.intent_classification.as_ref().map(|i| i.primary.clone()),
                    result.quality_analysis.as_ref().map(|q| q.overall_score),
                    result.pii_detection.as_ref().map(|p| p.has_pii as i64),
                    result.overall_confidence,
                    result.model_used.as_str(),
                    result_json,
                    result.enriched_at.to_rfc3339(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Upsert several results; returns how many rows were written.
    pub async fn upsert_enrichments(&self, results: &[EnrichmentResult]) -> Result<usize> {
        let mut written = 0;
        for result in results {
            self.upsert_enrichment(result).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Load the persisted enrichment for a message.
    pub async fn get_enrichment(&self, message_id: &str) -> Result<Option<EnrichmentResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT result_json FROM message_enrichments WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => {
                let json: String = row.get(0).map_err(db_err)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Number of persisted enrichments for an organization.
    #[cfg(test)]
    pub async fn count_enrichments(&self, organization_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM message_enrichments WHERE organization_id = ?1",
                params![organization_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }

    // -----------------------------------------------------------------------
    // Cache entries
    // -----------------------------------------------------------------------

    /// Read a live cache entry. Expired entries read as absent and are
    /// removed on the way out.
    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_json, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(db_err)?;

        let Some(row) = rows.next().await.map_err(db_err)? else {
            return Ok(None);
        };
        let value: String = row.get(0).map_err(db_err)?;
        let expires_at: i64 = row.get(1).map_err(db_err)?;

        if expires_at <= Utc::now().timestamp_millis() {
            self.conn
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
                .await
                .map_err(db_err)?;
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Write a cache entry that expires `ttl` from now. Expired entries are
    /// swept on every write, since most keys are never read back.
    pub async fn cache_set(&self, key: &str, value_json: &str, ttl: Duration) -> Result<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        self.conn
            .execute(
                "INSERT INTO cache_entries (key, value_json, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value_json = excluded.value_json,
                   expires_at = excluded.expires_at",
                params![key, value_json, expires_at],
            )
            .await
            .map_err(db_err)?;
        self.purge_expired().await?;
        Ok(())
    }

    /// Delete every expired cache entry; returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![Utc::now().timestamp_millis()],
            )
            .await
            .map_err(db_err)?;
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Work queue
    // -----------------------------------------------------------------------

    /// Append a message to the queue; returns its id.
    pub async fn queue_publish(&self, payload_json: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO queue_messages (id, payload_json, published_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), payload_json, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Claim and acknowledge the oldest message in one statement, so two
    /// workers never receive the same message.
    pub async fn queue_pull(&self) -> Result<Option<QueuedMessage>> {
        let mut rows = self
            .conn
            .query(
                "DELETE FROM queue_messages
                 WHERE seq = (SELECT seq FROM queue_messages ORDER BY seq LIMIT 1)
                 RETURNING id, payload_json",
                params![],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(QueuedMessage {
                id: row.get(0).map_err(db_err)?,
                payload_json: row.get(1).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    /// Messages waiting in the queue.
    pub async fn queue_len(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM queue_messages", params![])
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }
}
