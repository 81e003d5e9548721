//! SQLite storage implementation.
//!
//! This module provides the main storage backend for reqmatch using SQLite.
//! It follows the `MutationContext` pattern for transaction discipline and
//! audit logging.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::matching::{rank_candidates, CandidateFilter, GeoScope, Neighbor, VectorStore};
use crate::model::{
    EmbeddingState, EmbeddingStatus, ItemStatus, Location, MatchableItem, NewItem, NewOwner, Owner,
};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::repository::ItemRepository;
use crate::storage::schema::apply_schema;
use crate::vector::{format_vector, parse_vector};

/// Column list shared by every request query.
const REQUEST_COLUMNS: &str = "id, owner_id, text, category, city, country, status, embedding, \
     embedding_model, embedding_status, embedding_updated_at, embedding_error, created_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, collecting audit events.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (cli, backfill, ...).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }

    /// Record an event carrying a free-form comment.
    pub fn record_comment(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }
}

/// Number of requests per embedding status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingStatusCounts {
    pub pending: usize,
    pub ready: usize,
    pub error: usize,
    /// Stored vectors per model (including vectors preserved in `error`)
    pub models: BTreeMap<String, usize>,
}

impl EmbeddingStatusCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.ready + self.error
    }
}

/// Which requests an embedding reset applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    /// One request
    Item(i64),
    /// Requests whose stored vector came from a model other than this one
    StaleModel(String),
    /// Every request
    All,
}

/// Legacy owner-level vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerEmbedding {
    pub owner_id: i64,
    #[serde(skip)]
    pub vector: Vec<f64>,
    pub model: String,
    /// `request` or `profile`
    pub source: String,
    pub updated_at: i64,
}

/// Raw request row before lifecycle validation.
struct RequestRow {
    id: i64,
    owner_id: i64,
    text: String,
    category: Option<String>,
    city: Option<String>,
    country: Option<String>,
    status: String,
    embedding: Option<String>,
    embedding_model: Option<String>,
    embedding_status: String,
    embedding_updated_at: Option<i64>,
    embedding_error: Option<String>,
    created_at: i64,
}

impl RequestRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            text: row.get(2)?,
            category: row.get(3)?,
            city: row.get(4)?,
            country: row.get(5)?,
            status: row.get(6)?,
            embedding: row.get(7)?,
            embedding_model: row.get(8)?,
            embedding_status: row.get(9)?,
            embedding_updated_at: row.get(10)?,
            embedding_error: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_item(self) -> Result<MatchableItem> {
        let embedding = self.restore_embedding()?;
        self.assemble(embedding)
    }

    /// Like [`Self::into_item`], but a row whose stored embedding cannot be
    /// restored comes back `pending` so backfill can re-embed it.
    fn into_backfill_candidate(self) -> Result<MatchableItem> {
        let embedding = match self.restore_embedding() {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(item_id = self.id, error = %e, "Unreadable stored embedding, retrying as pending");
                EmbeddingState::pending(self.embedding_updated_at.unwrap_or(self.created_at))
            }
        };
        self.assemble(embedding)
    }

    fn restore_embedding(&self) -> Result<EmbeddingState> {
        let corrupt = |e: Error| match e {
            Error::Corrupt(message) => Error::Corrupt(format!("request {}: {message}", self.id)),
            other => other,
        };
        let status = EmbeddingStatus::parse(&self.embedding_status).ok_or_else(|| {
            Error::Corrupt(format!(
                "request {} has unknown embedding status '{}'",
                self.id, self.embedding_status
            ))
        })?;
        let vector = self
            .embedding
            .as_deref()
            .map(parse_vector)
            .transpose()
            .map_err(corrupt)?;
        EmbeddingState::restore(
            status,
            vector,
            self.embedding_model.clone(),
            self.embedding_updated_at,
            self.embedding_error.clone(),
        )
        .map_err(corrupt)
    }

    fn assemble(self, embedding: EmbeddingState) -> Result<MatchableItem> {
        let status = ItemStatus::parse(&self.status).ok_or_else(|| {
            Error::Corrupt(format!("request {} has unknown status '{}'", self.id, self.status))
        })?;

        Ok(MatchableItem {
            id: self.id,
            owner_id: self.owner_id,
            text: self.text,
            category: self.category,
            location: Location {
                city: self.city,
                country: self.country,
            },
            status,
            embedding,
            created_at: self.created_at,
        })
    }
}

fn map_owner(row: &Row<'_>) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get(0)?,
        display_name: row.get(1)?,
        city: row.get(2)?,
        country: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Write one embedding state inside a transaction. Returns rows changed.
fn write_embedding_state(tx: &Transaction, id: i64, state: &EmbeddingState) -> Result<usize> {
    let changed = tx.execute(
        "UPDATE requests
         SET embedding = ?1, embedding_model = ?2, embedding_status = ?3,
             embedding_updated_at = ?4, embedding_error = ?5
         WHERE id = ?6",
        rusqlite::params![
            state.vector().map(format_vector),
            state.model(),
            state.status().as_str(),
            state.updated_at(),
            state.error(),
            id,
        ],
    )?;
    Ok(changed)
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5_000)))?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;
        debug!(op = ctx.op_name, events = ctx.events.len(), "Mutation committed");

        Ok(result)
    }

    // ==================
    // Owner Operations
    // ==================

    /// Register an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_owner(&mut self, owner: &NewOwner, now: i64, actor: &str) -> Result<Owner> {
        let id = self.mutate("create_owner", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO owners (display_name, city, country, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![owner.display_name, owner.city, owner.country, now],
            )?;
            let id = tx.last_insert_rowid();
            ctx.record_event("owner", &id.to_string(), EventType::OwnerCreated);
            Ok(id)
        })?;

        Ok(Owner {
            id,
            display_name: owner.display_name.clone(),
            city: owner.city.clone(),
            country: owner.country.clone(),
            created_at: now,
        })
    }

    /// Get an owner by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_owner(&self, id: i64) -> Result<Option<Owner>> {
        let owner = self
            .conn
            .query_row(
                "SELECT id, display_name, city, country, created_at FROM owners WHERE id = ?1",
                [id],
                map_owner,
            )
            .optional()?;
        Ok(owner)
    }

    /// List all owners in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_owners(&self) -> Result<Vec<Owner>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, display_name, city, country, created_at FROM owners ORDER BY id")?;
        let owners = stmt
            .query_map([], map_owner)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(owners)
    }

    // ==================
    // Request Operations
    // ==================

    fn query_rows(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<RequestRow>> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests {where_clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, RequestRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn query_requests(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<MatchableItem>> {
        self.query_rows(where_clause, params)?
            .into_iter()
            .map(RequestRow::into_item)
            .collect()
    }

    /// Get a request by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn get_request(&self, id: i64) -> Result<Option<MatchableItem>> {
        Ok(self
            .query_requests("WHERE id = ?1", &[&id])?
            .into_iter()
            .next())
    }

    /// List an owner's requests with the given status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn list_requests_by_owner(
        &self,
        owner_id: i64,
        status: ItemStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MatchableItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        self.query_requests(
            "WHERE owner_id = ?1 AND status = ?2 ORDER BY created_at DESC, id DESC LIMIT ?3 OFFSET ?4",
            &[&owner_id, &status.as_str(), &limit, &offset],
        )
    }

    /// Change a request's status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ItemNotFound`] if the request does not exist.
    pub fn set_request_status(&mut self, id: i64, status: ItemStatus, actor: &str) -> Result<()> {
        self.mutate("set_request_status", actor, |tx, ctx| {
            let old: Option<String> = tx
                .query_row("SELECT status FROM requests WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(old) = old else {
                return Err(Error::ItemNotFound { id });
            };

            if old != status.as_str() {
                tx.execute(
                    "UPDATE requests SET status = ?1 WHERE id = ?2",
                    rusqlite::params![status.as_str(), id],
                )?;
                ctx.record_change(
                    "request",
                    &id.to_string(),
                    EventType::RequestStatusChanged,
                    Some(old),
                    Some(status.as_str().to_string()),
                );
            }
            Ok(())
        })
    }

    /// Delete a request and its vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ItemNotFound`] if the request does not exist.
    pub fn delete_request(&mut self, id: i64, actor: &str) -> Result<()> {
        self.mutate("delete_request", actor, |tx, ctx| {
            let deleted = tx.execute("DELETE FROM requests WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(Error::ItemNotFound { id });
            }
            ctx.record_event("request", &id.to_string(), EventType::RequestDeleted);
            Ok(())
        })
    }

    /// Text of the owner's most recent active request.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_active_request_text(&self, owner_id: i64) -> Result<Option<String>> {
        let text = self
            .conn
            .query_row(
                "SELECT text FROM requests
                 WHERE owner_id = ?1 AND status = 'active' AND TRIM(text) != ''
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                [owner_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    // ==================
    // Embedding Operations
    // ==================

    /// Count requests per embedding status and stored vectors per model.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_embedding_status(&self) -> Result<EmbeddingStatusCounts> {
        let mut counts = EmbeddingStatusCounts::default();

        let mut stmt = self
            .conn
            .prepare("SELECT embedding_status, COUNT(*) FROM requests GROUP BY embedding_status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, n) = row?;
            let n = usize::try_from(n).unwrap_or_default();
            match EmbeddingStatus::parse(&status) {
                Some(EmbeddingStatus::Pending) => counts.pending += n,
                Some(EmbeddingStatus::Ready) => counts.ready += n,
                Some(EmbeddingStatus::Error) => counts.error += n,
                None => warn!(status, count = n, "Unknown embedding status in requests"),
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT embedding_model, COUNT(*) FROM requests
             WHERE embedding IS NOT NULL AND embedding_model IS NOT NULL
             GROUP BY embedding_model ORDER BY embedding_model",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (model, n) = row?;
            counts.models.insert(model, usize::try_from(n).unwrap_or_default());
        }

        Ok(counts)
    }

    /// Mark requests `pending`, clearing vector, model and error, so a later
    /// backfill re-embeds them. Returns the number of requests reset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ItemNotFound`] for a missing single-item scope.
    pub fn reset_embeddings(&mut self, scope: &ResetScope, now: i64, actor: &str) -> Result<usize> {
        let rows = match scope {
            ResetScope::Item(id) => {
                let rows = self.query_rows("WHERE id = ?1", &[id])?;
                if rows.is_empty() {
                    return Err(Error::ItemNotFound { id: *id });
                }
                rows
            }
            ResetScope::StaleModel(model) => self.query_rows(
                "WHERE embedding_model IS NOT NULL AND embedding_model != ?1 ORDER BY id",
                &[model],
            )?,
            ResetScope::All => self.query_rows("ORDER BY id", &[])?,
        };
        let items = rows
            .into_iter()
            .map(RequestRow::into_backfill_candidate)
            .collect::<Result<Vec<_>>>()?;

        let count = items.len();
        self.mutate("reset_embeddings", actor, |tx, ctx| {
            for mut item in items {
                item.embedding.mark_pending(now);
                write_embedding_state(tx, item.id, &item.embedding)?;
                ctx.record_event("request", &item.id.to_string(), EventType::EmbeddingReset);
            }
            Ok(count)
        })
    }

    // ==================
    // Legacy Owner Vectors
    // ==================

    /// Insert or replace the owner's aggregate vector.
    ///
    /// Uses `ON CONFLICT` so concurrent writers for the same owner never
    /// race on the primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_owner_embedding(
        &mut self,
        owner_id: i64,
        vector: &[f64],
        model: &str,
        source: &str,
        now: i64,
        actor: &str,
    ) -> Result<()> {
        self.mutate("upsert_owner_embedding", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO owner_embeddings (owner_id, embedding, embedding_model, source, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(owner_id) DO UPDATE SET
                    embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model,
                    source = excluded.source,
                    updated_at = excluded.updated_at",
                rusqlite::params![owner_id, format_vector(vector), model, source, now],
            )?;
            ctx.record_comment(
                "owner",
                &owner_id.to_string(),
                EventType::OwnerEmbeddingUpserted,
                source,
            );
            Ok(())
        })
    }

    /// Get the owner's aggregate vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored vector is corrupt.
    pub fn get_owner_embedding(&self, owner_id: i64) -> Result<Option<OwnerEmbedding>> {
        let row = self
            .conn
            .query_row(
                "SELECT owner_id, embedding, embedding_model, source, updated_at
                 FROM owner_embeddings WHERE owner_id = ?1",
                [owner_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(owner_id, text, model, source, updated_at)| {
            Ok(OwnerEmbedding {
                owner_id,
                vector: parse_vector(&text)?,
                model,
                source,
                updated_at,
            })
        })
        .transpose()
    }
}

impl ItemRepository for SqliteStorage {
    fn get_item(&self, id: i64) -> Result<Option<MatchableItem>> {
        self.get_request(id)
    }

    fn owner_exists(&self, owner_id: i64) -> Result<bool> {
        Ok(self.get_owner(owner_id)?.is_some())
    }

    fn insert_item(
        &mut self,
        item: &NewItem,
        embedding: &EmbeddingState,
        now: i64,
        actor: &str,
    ) -> Result<MatchableItem> {
        let id = self.mutate("create_request", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO requests (owner_id, text, category, city, country, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6)",
                rusqlite::params![
                    item.owner_id(),
                    item.text(),
                    item.category(),
                    item.location().city,
                    item.location().country,
                    now,
                ],
            )?;
            let id = tx.last_insert_rowid();
            write_embedding_state(tx, id, embedding)?;
            ctx.record_event("request", &id.to_string(), EventType::RequestCreated);
            Ok(id)
        })?;

        Ok(MatchableItem {
            id,
            owner_id: item.owner_id(),
            text: item.text().to_string(),
            category: item.category().map(str::to_string),
            location: item.location().clone(),
            status: ItemStatus::Active,
            embedding: embedding.clone(),
            created_at: now,
        })
    }

    fn find_backfill_batch(
        &self,
        after_id: Option<i64>,
        to_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<MatchableItem>> {
        let after = after_id.unwrap_or(i64::MIN);
        let to = to_id.unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_rows(
            "WHERE (embedding IS NULL OR embedding_status != 'ready')
               AND id > ?1 AND id <= ?2
             ORDER BY id ASC
             LIMIT ?3",
            &[&after, &to, &limit],
        )?
        .into_iter()
        .map(RequestRow::into_backfill_candidate)
        .collect()
    }

    fn save_embedding_states(&mut self, updates: &[(i64, EmbeddingState)], actor: &str) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        self.mutate("save_embedding_states", actor, |tx, ctx| {
            for (id, state) in updates {
                if write_embedding_state(tx, *id, state)? == 0 {
                    debug!(item_id = id, "Request vanished before its embedding was saved");
                    continue;
                }
                let entity_id = id.to_string();
                match state.status() {
                    EmbeddingStatus::Ready => {
                        ctx.record_change(
                            "request",
                            &entity_id,
                            EventType::EmbeddingReady,
                            None,
                            state.model().map(str::to_string),
                        );
                    }
                    EmbeddingStatus::Error => ctx.record_comment(
                        "request",
                        &entity_id,
                        EventType::EmbeddingFailed,
                        state.error().unwrap_or_default(),
                    ),
                    EmbeddingStatus::Pending => {
                        ctx.record_event("request", &entity_id, EventType::EmbeddingReset);
                    }
                }
            }
            Ok(())
        })
    }
}

impl VectorStore for SqliteStorage {
    fn find_nearest(
        &self,
        query: &[f64],
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            "SELECT id, embedding FROM requests
             WHERE status = 'active'
               AND embedding_status = 'ready'
               AND embedding IS NOT NULL
               AND embedding_model IS NOT NULL
               AND id != ?
               AND owner_id != ?",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(filter.exclude_item_id),
            Box::new(filter.exclude_owner_id),
        ];

        if let Some(category) = &filter.category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(category.clone()));
        }

        match &filter.geo {
            GeoScope::City(city) => {
                sql.push_str(" AND city = ?");
                params.push(Box::new(city.clone()));
            }
            GeoScope::Country(country) => {
                sql.push_str(" AND country = ?");
                params.push(Box::new(country.clone()));
            }
            GeoScope::Anywhere => {}
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id, text) = row?;
            match parse_vector(&text) {
                Ok(vector) => candidates.push((id, vector)),
                Err(e) => warn!(item_id = id, error = %e, "Skipping candidate with unreadable embedding"),
            }
        }

        debug!(candidates = candidates.len(), limit, "Ranking match candidates");
        Ok(rank_candidates(query, candidates, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewItemInput;
    use crate::storage::events::get_events;

    const ACTOR: &str = "test";

    fn owner(storage: &mut SqliteStorage, name: &str) -> i64 {
        storage
            .create_owner(&NewOwner::parse(name, None, None).unwrap(), 1, ACTOR)
            .unwrap()
            .id
    }

    fn new_item(owner_id: i64, text: &str) -> NewItem {
        NewItem::parse(NewItemInput {
            owner_id,
            text: text.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn ready(vector: Vec<f64>) -> EmbeddingState {
        let mut state = EmbeddingState::pending(0);
        let dims = vector.len();
        state.mark_ready(vector, "m1", 1, dims).unwrap();
        state
    }

    fn insert(storage: &mut SqliteStorage, input: NewItemInput, state: &EmbeddingState) -> i64 {
        storage
            .insert_item(&NewItem::parse(input).unwrap(), state, 10, ACTOR)
            .unwrap()
            .id
    }

    fn filter_for(storage: &SqliteStorage, id: i64, category_filter: bool) -> CandidateFilter {
        CandidateFilter::for_source(&storage.get_request(id).unwrap().unwrap(), category_filter)
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let owner_id = owner(&mut storage, "Ada");

        let state = ready(vec![0.25, -0.5, 1.0]);
        let created = storage
            .insert_item(&new_item(owner_id, "Looking for a plumber in Berlin"), &state, 42, ACTOR)
            .unwrap();

        let loaded = storage.get_request(created.id).unwrap().unwrap();
        assert_eq!(loaded.text, "Looking for a plumber in Berlin");
        assert_eq!(loaded.created_at, 42);
        assert_eq!(loaded.embedding, state);

        let events = get_events(storage.conn(), "request", &created.id.to_string(), None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::RequestCreated);
    }

    #[test]
    fn test_corrupt_vector_is_reported() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let owner_id = owner(&mut storage, "Ada");
        let id = storage
            .insert_item(&new_item(owner_id, "x"), &ready(vec![1.0]), 1, ACTOR)
            .unwrap()
            .id;
        storage
            .conn()
            .execute("UPDATE requests SET embedding = 'not a vector' WHERE id = ?1", [id])
            .unwrap();

        let err = storage.get_request(id).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        let message = err.to_string();
        assert_eq!(message.matches("Corrupt record").count(), 1, "{message}");
        assert!(message.starts_with(&format!("Corrupt record: request {id}: ")), "{message}");

        // Still resettable, which makes it readable again
        assert_eq!(storage.reset_embeddings(&ResetScope::Item(id), 5, ACTOR).unwrap(), 1);
        let reset = storage.get_request(id).unwrap().unwrap();
        assert_eq!(reset.embedding.status(), EmbeddingStatus::Pending);
        assert!(reset.embedding.vector().is_none());
    }

    #[test]
    fn test_find_nearest_applies_candidate_predicate() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let me = owner(&mut storage, "me");
        let other = owner(&mut storage, "other");

        let input = |owner_id: i64, text: &str| NewItemInput {
            owner_id,
            text: text.to_string(),
            ..Default::default()
        };

        let source = insert(&mut storage, input(me, "source"), &ready(vec![1.0, 0.0, 0.0]));
        let same_owner = insert(&mut storage, input(me, "mine"), &ready(vec![1.0, 0.0, 0.0]));
        let good = insert(&mut storage, input(other, "good"), &ready(vec![0.0, 1.0, 0.0]));
        let closer = insert(&mut storage, input(other, "closer"), &ready(vec![0.9, 0.1, 0.0]));
        let closed = insert(&mut storage, input(other, "closed"), &ready(vec![1.0, 0.0, 0.0]));
        let pending = insert(&mut storage, input(other, "pending"), &EmbeddingState::pending(0));
        storage.set_request_status(closed, ItemStatus::Inactive, ACTOR).unwrap();

        let query = storage.get_request(source).unwrap().unwrap();
        let hits = storage
            .find_nearest(
                query.embedding.ready_vector().unwrap(),
                &filter_for(&storage, source, true),
                10,
            )
            .unwrap();

        let ids: Vec<i64> = hits.iter().map(|n| n.item_id).collect();
        assert_eq!(ids, vec![closer, good]);
        for excluded in [source, same_owner, closed, pending] {
            assert!(!ids.contains(&excluded));
        }
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!((hits[1].distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_nearest_narrows_by_city_country_and_category() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let me = owner(&mut storage, "me");
        let other = owner(&mut storage, "other");
        let v = || ready(vec![1.0, 0.0]);

        let located = |owner_id: i64, category: Option<&str>, city: Option<&str>, country: Option<&str>| {
            NewItemInput {
                owner_id,
                text: "t".to_string(),
                category: category.map(str::to_string),
                city: city.map(str::to_string),
                country: country.map(str::to_string),
            }
        };

        let source = insert(&mut storage, located(me, Some("bikes"), Some("Lyon"), Some("FR")), &v());
        let same_city = insert(&mut storage, located(other, Some("bikes"), Some("Lyon"), Some("FR")), &v());
        let _other_city = insert(&mut storage, located(other, Some("bikes"), Some("Paris"), Some("FR")), &v());
        let other_category = insert(&mut storage, located(other, Some("cars"), Some("Lyon"), Some("FR")), &v());

        let query = [1.0, 0.0];
        let with_category = storage
            .find_nearest(&query, &filter_for(&storage, source, true), 10)
            .unwrap();
        assert_eq!(with_category.iter().map(|n| n.item_id).collect::<Vec<_>>(), vec![same_city]);

        let without_category = storage
            .find_nearest(&query, &filter_for(&storage, source, false), 10)
            .unwrap();
        assert_eq!(
            without_category.iter().map(|n| n.item_id).collect::<Vec<_>>(),
            vec![same_city, other_category]
        );

        let country_only = CandidateFilter {
            geo: GeoScope::Country("FR".into()),
            category: None,
            ..filter_for(&storage, source, false)
        };
        assert_eq!(storage.find_nearest(&query, &country_only, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_find_nearest_respects_limit() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let me = owner(&mut storage, "me");
        let other = owner(&mut storage, "other");
        let source = storage
            .insert_item(&new_item(me, "s"), &ready(vec![1.0, 0.0]), 1, ACTOR)
            .unwrap()
            .id;
        for i in 0..5 {
            storage
                .insert_item(&new_item(other, &format!("c{i}")), &ready(vec![1.0, f64::from(i)]), 1, ACTOR)
                .unwrap();
        }

        let hits = storage
            .find_nearest(&[1.0, 0.0], &filter_for(&storage, source, true), 3)
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_backfill_batch_selects_non_ready_in_id_order() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");

        let mut failed = EmbeddingState::pending(0);
        failed.mark_error("boom", "m1", 1);

        let a = storage.insert_item(&new_item(o, "a"), &EmbeddingState::pending(0), 1, ACTOR).unwrap().id;
        let _b = storage.insert_item(&new_item(o, "b"), &ready(vec![1.0]), 1, ACTOR).unwrap().id;
        let c = storage.insert_item(&new_item(o, "c"), &failed, 1, ACTOR).unwrap().id;
        let d = storage.insert_item(&new_item(o, "d"), &EmbeddingState::pending(0), 1, ACTOR).unwrap().id;

        let ids = |items: Vec<MatchableItem>| items.into_iter().map(|i| i.id).collect::<Vec<_>>();

        assert_eq!(ids(storage.find_backfill_batch(None, None, 10).unwrap()), vec![a, c, d]);
        assert_eq!(ids(storage.find_backfill_batch(Some(a), None, 10).unwrap()), vec![c, d]);
        assert_eq!(ids(storage.find_backfill_batch(None, Some(c), 10).unwrap()), vec![a, c]);
        assert_eq!(ids(storage.find_backfill_batch(None, None, 1).unwrap()), vec![a]);
    }

    #[test]
    fn test_save_embedding_states_records_events() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");
        let id = storage.insert_item(&new_item(o, "a"), &EmbeddingState::pending(0), 1, ACTOR).unwrap().id;

        let mut state = EmbeddingState::pending(0);
        state.mark_error("timeout", "m1", 5);
        storage.save_embedding_states(&[(id, state.clone()), (9_999, state)], "backfill").unwrap();

        let loaded = storage.get_request(id).unwrap().unwrap();
        assert_eq!(loaded.embedding.status(), EmbeddingStatus::Error);
        assert_eq!(loaded.embedding.error(), Some("timeout"));

        let events = get_events(storage.conn(), "request", &id.to_string(), None).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::EmbeddingFailed
            && e.comment.as_deref() == Some("timeout")));
    }

    #[test]
    fn test_status_delete_and_missing() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");
        let id = storage.insert_item(&new_item(o, "a"), &EmbeddingState::pending(0), 1, ACTOR).unwrap().id;

        storage.set_request_status(id, ItemStatus::Inactive, ACTOR).unwrap();
        assert!(storage.list_requests_by_owner(o, ItemStatus::Active, 10, 0).unwrap().is_empty());
        assert_eq!(storage.list_requests_by_owner(o, ItemStatus::Inactive, 10, 0).unwrap().len(), 1);

        storage.delete_request(id, ACTOR).unwrap();
        assert!(storage.get_request(id).unwrap().is_none());
        assert!(matches!(storage.delete_request(id, ACTOR), Err(Error::ItemNotFound { .. })));
        assert!(matches!(
            storage.set_request_status(id, ItemStatus::Active, ACTOR),
            Err(Error::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_counts_and_stale_model_reset() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");

        let old = ready(vec![1.0, 0.0]);
        let mut current = EmbeddingState::pending(0);
        current.mark_ready(vec![0.0, 1.0], "m2", 1, 2).unwrap();

        let stale_id = storage.insert_item(&new_item(o, "a"), &old, 1, ACTOR).unwrap().id;
        let fresh_id = storage.insert_item(&new_item(o, "b"), &current, 1, ACTOR).unwrap().id;
        storage.insert_item(&new_item(o, "c"), &EmbeddingState::pending(0), 1, ACTOR).unwrap();

        let counts = storage.count_embedding_status().unwrap();
        assert_eq!((counts.pending, counts.ready, counts.error, counts.total()), (1, 2, 0, 3));
        assert_eq!(counts.models.get("m1"), Some(&1));

        let reset = storage
            .reset_embeddings(&ResetScope::StaleModel("m2".into()), 50, ACTOR)
            .unwrap();
        assert_eq!(reset, 1);
        assert_eq!(
            storage.get_request(stale_id).unwrap().unwrap().embedding,
            EmbeddingState::pending(50)
        );
        assert!(storage.get_request(fresh_id).unwrap().unwrap().embedding.is_ready());

        assert!(matches!(
            storage.reset_embeddings(&ResetScope::Item(12_345), 50, ACTOR),
            Err(Error::ItemNotFound { id: 12_345 })
        ));
        assert_eq!(storage.reset_embeddings(&ResetScope::All, 60, ACTOR).unwrap(), 3);
    }

    #[test]
    fn test_owner_embedding_upsert_replaces() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");

        storage.upsert_owner_embedding(o, &[1.0, 0.0], "m1", "profile", 1, ACTOR).unwrap();
        storage.upsert_owner_embedding(o, &[0.0, 1.0], "m2", "request", 2, ACTOR).unwrap();

        let stored = storage.get_owner_embedding(o).unwrap().unwrap();
        assert_eq!(stored.vector, vec![0.0, 1.0]);
        assert_eq!(stored.model, "m2");
        assert_eq!(stored.source, "request");

        let rows: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM owner_embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_latest_active_request_text() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let o = owner(&mut storage, "o");
        assert!(storage.latest_active_request_text(o).unwrap().is_none());

        storage.insert_item(&new_item(o, "older"), &EmbeddingState::pending(0), 1, ACTOR).unwrap();
        let newer = storage.insert_item(&new_item(o, "newer"), &EmbeddingState::pending(0), 2, ACTOR).unwrap().id;
        assert_eq!(storage.latest_active_request_text(o).unwrap().as_deref(), Some("newer"));

        storage.set_request_status(newer, ItemStatus::Inactive, ACTOR).unwrap();
        assert_eq!(storage.latest_active_request_text(o).unwrap().as_deref(), Some("older"));
    }
}
