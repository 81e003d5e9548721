//! Database migrations.
//!
//! Each migration is applied once and recorded in `schema_migrations`.
//! Statements run one at a time. The base schema already contains every
//! column, so a column that exists is skipped on its own and the rest of
//! the migration still runs.

use rusqlite::{Connection, Result};
use tracing::{info, warn};

/// A single migration with version identifier and its statements.
struct Migration {
    version: &'static str,
    statements: &'static [&'static str],
}

/// All migrations in order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_request_embedding_columns",
        statements: &[
            "ALTER TABLE requests ADD COLUMN embedding TEXT",
            "ALTER TABLE requests ADD COLUMN embedding_model TEXT",
            "ALTER TABLE requests ADD COLUMN embedding_status TEXT NOT NULL DEFAULT 'pending'",
            "ALTER TABLE requests ADD COLUMN embedding_updated_at INTEGER",
            "ALTER TABLE requests ADD COLUMN embedding_error TEXT",
        ],
    },
    Migration {
        version: "002_request_location_columns",
        statements: &[
            "ALTER TABLE requests ADD COLUMN city TEXT",
            "ALTER TABLE requests ADD COLUMN country TEXT",
        ],
    },
    Migration {
        version: "003_embedding_indexes",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_requests_backfill ON requests(embedding_status, id)",
            "CREATE INDEX IF NOT EXISTS idx_requests_match ON requests(status, embedding_status)",
        ],
    },
];

/// Run all pending migrations on the database.
///
/// Already-applied migrations are skipped, so this is safe to call on
/// every open.
///
/// # Errors
///
/// Returns an error if a migration fails for any reason other than a
/// column that already exists.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    for migration in MIGRATIONS {
        if applied.contains(migration.version) {
            continue;
        }

        info!(version = migration.version, "Applying migration");

        for statement in migration.statements {
            if let Err(e) = conn.execute_batch(statement) {
                if e.to_string().contains("duplicate column name") {
                    warn!(
                        version = migration.version,
                        statement = *statement,
                        "Column already exists, skipping statement"
                    );
                } else {
                    return Err(e);
                }
            }
        }

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.version, chrono::Utc::now().timestamp_millis()],
        )?;

        info!(version = migration.version, "Migration complete");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{apply_schema, SCHEMA_SQL};

    fn migration_count(conn: &Connection) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version LIKE '0%'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_run_migrations_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        run_migrations(&conn).expect("Migrations should apply to fresh database");
        assert_eq!(migration_count(&conn), 3);
    }

    #[test]
    fn test_run_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_SQL).unwrap();
        run_migrations(&conn).expect("First run should succeed");
        run_migrations(&conn).expect("Second run should succeed (idempotent)");
        assert_eq!(migration_count(&conn), 3);
    }

    #[test]
    fn test_legacy_requests_table_gains_embedding_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY AUTOINCREMENT, display_name TEXT NOT NULL, city TEXT, country TEXT, created_at INTEGER NOT NULL);
             CREATE TABLE requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                category TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL
             );
             INSERT INTO owners (display_name, created_at) VALUES ('legacy', 0);
             INSERT INTO requests (owner_id, text, created_at) VALUES (1, 'old request', 0);",
        )
        .unwrap();

        apply_schema(&conn).expect("Schema should upgrade a legacy database");

        let (status, country): (String, Option<String>) = conn
            .query_row(
                "SELECT embedding_status, country FROM requests WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "pending");
        assert!(country.is_none());
    }

    #[test]
    fn test_partially_upgraded_table_gets_remaining_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY AUTOINCREMENT, display_name TEXT NOT NULL, city TEXT, country TEXT, created_at INTEGER NOT NULL);
             CREATE TABLE requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                category TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                embedding TEXT,
                city TEXT,
                created_at INTEGER NOT NULL
             );
             INSERT INTO owners (display_name, created_at) VALUES ('legacy', 0);
             INSERT INTO requests (owner_id, text, city, created_at) VALUES (1, 'old request', 'Berlin', 0);",
        )
        .unwrap();

        apply_schema(&conn).expect("Schema should upgrade a half-migrated database");

        let columns: Vec<String> = conn
            .prepare("SELECT name FROM pragma_table_info('requests')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        for column in [
            "embedding_model",
            "embedding_status",
            "embedding_updated_at",
            "embedding_error",
            "country",
        ] {
            assert!(columns.iter().any(|c| c == column), "missing column {column}");
        }

        let (status, city): (String, String) = conn
            .query_row(
                "SELECT embedding_status, city FROM requests WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(status, "pending");
        assert_eq!(city, "Berlin");

        apply_schema(&conn).expect("Reopening should succeed");
    }
}
