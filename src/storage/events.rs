//! Audit event storage and retrieval.
//!
//! Every mutation records events so the history of a request's embedding
//! lifecycle can be inspected after the fact.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Request events
    RequestCreated,
    RequestStatusChanged,
    RequestDeleted,

    // Embedding lifecycle events
    EmbeddingReady,
    EmbeddingFailed,
    EmbeddingReset,

    // Owner events
    OwnerCreated,
    OwnerEmbeddingUpserted,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequestCreated => "request_created",
            Self::RequestStatusChanged => "request_status_changed",
            Self::RequestDeleted => "request_deleted",
            Self::EmbeddingReady => "embedding_ready",
            Self::EmbeddingFailed => "embedding_failed",
            Self::EmbeddingReset => "embedding_reset",
            Self::OwnerCreated => "owner_created",
            Self::OwnerEmbeddingUpserted => "owner_embedding_upserted",
        }
    }

    /// Parse a stored event type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request_created" => Some(Self::RequestCreated),
            "request_status_changed" => Some(Self::RequestStatusChanged),
            "request_deleted" => Some(Self::RequestDeleted),
            "embedding_ready" => Some(Self::EmbeddingReady),
            "embedding_failed" => Some(Self::EmbeddingFailed),
            "embedding_reset" => Some(Self::EmbeddingReset),
            "owner_created" => Some(Self::OwnerCreated),
            "owner_embedding_upserted" => Some(Self::OwnerEmbeddingUpserted),
            _ => None,
        }
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub comment: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            comment: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }

    /// Add a comment to the event.
    #[must_use]
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.comment,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// Rows with an unknown event type are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, comment, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let Some(event_type) = EventType::parse(&row.get::<_, String>(3)?) else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            comment: row.get(7)?,
            created_at: row.get(8)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("request", "7", EventType::EmbeddingFailed, "backfill")
            .with_comment("timed out");

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "request", "7", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::EmbeddingFailed);
        assert_eq!(events[0].actor, "backfill");
        assert_eq!(events[0].comment, Some("timed out".to_string()));
    }

    #[test]
    fn test_event_type_names_roundtrip() {
        for kind in [
            EventType::RequestCreated,
            EventType::RequestStatusChanged,
            EventType::RequestDeleted,
            EventType::EmbeddingReady,
            EventType::EmbeddingFailed,
            EventType::EmbeddingReset,
            EventType::OwnerCreated,
            EventType::OwnerEmbeddingUpserted,
        ] {
            assert_eq!(EventType::parse(kind.as_str()), Some(kind));
        }
    }
}
