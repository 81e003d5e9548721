//! Database schema definitions.
//!
//! Timestamps are stored as INTEGER (Unix milliseconds). Vectors are stored
//! as TEXT in the bracketed 12-decimal grammar of [`crate::vector::codec`],
//! since SQLite has no native vector column.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The base SQL schema for the reqmatch database.
///
/// Indexes over the embedding columns live in the migrations, because
/// databases created before those columns existed must be altered first.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Core Tables
-- ====================

-- Owners: submitters of requests
CREATE TABLE IF NOT EXISTS owners (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    display_name TEXT NOT NULL,
    city TEXT,
    country TEXT,
    created_at INTEGER NOT NULL
);

-- Requests: the matchable items, one vector each
CREATE TABLE IF NOT EXISTS requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    category TEXT,
    city TEXT,
    country TEXT,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
    embedding TEXT,
    embedding_model TEXT,
    embedding_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (embedding_status IN ('pending', 'ready', 'error')),
    embedding_updated_at INTEGER,
    embedding_error TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES owners(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_requests_owner ON requests(owner_id, status);

-- Legacy owner-level vectors (one per owner, upserted)
CREATE TABLE IF NOT EXISTS owner_embeddings (
    owner_id INTEGER PRIMARY KEY,
    embedding TEXT NOT NULL,
    embedding_model TEXT NOT NULL,
    source TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (owner_id) REFERENCES owners(id) ON DELETE CASCADE
);

-- ====================
-- Audit
-- ====================

CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    actor TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    comment TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
";

/// Apply pragmas, the base schema and pending migrations.
///
/// Idempotent; called on every open.
///
/// # Errors
///
/// Returns an error if a pragma, the schema or a migration fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    // Bring older databases up to date
    super::migrations::run_migrations(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}
