//! Command implementations.

pub mod embeddings;
pub mod matches;
pub mod owner;
pub mod request;

use std::path::PathBuf;

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;

/// Actor recorded when `--actor` is not given.
pub const DEFAULT_ACTOR: &str = "cli";

/// Open the database, creating it on first use.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path))
        .ok_or_else(|| Error::Config("Could not determine database path; pass --db".into()))?;
    SqliteStorage::open(&db_path)
}

/// Tokio runtime for commands that call an embedding provider.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Format Unix milliseconds for human output.
pub(crate) fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
