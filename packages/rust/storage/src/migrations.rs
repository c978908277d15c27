//! SQL migration definitions for the enrichment database.
//!
//! Migrations are applied in order on database open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: message_enrichments, cache_entries, queue_messages",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per enriched message; the full result lives in result_json,
-- the remaining columns are denormalised for querying.
CREATE TABLE IF NOT EXISTS message_enrichments (
    message_id         TEXT PRIMARY KEY,
    user_id            TEXT NOT NULL,
    organization_id    TEXT NOT NULL,
    is_work            INTEGER,
    primary_topic      TEXT,
    primary_intent     TEXT,
    quality_score      REAL,
    has_pii            INTEGER,
    overall_confidence REAL NOT NULL,
    model_used         TEXT NOT NULL,
    result_json        TEXT NOT NULL,
    enriched_at        TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_enrichments_org ON message_enrichments(organization_id);
CREATE INDEX IF NOT EXISTS idx_enrichments_user ON message_enrichments(user_id);

-- Key/value cache with absolute expiry (unix millis).
CREATE TABLE IF NOT EXISTS cache_entries (
    key        TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);

-- Durable FIFO work queue.
CREATE TABLE IF NOT EXISTS queue_messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    id           TEXT NOT NULL UNIQUE,
    payload_json TEXT NOT NULL,
    published_at TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
