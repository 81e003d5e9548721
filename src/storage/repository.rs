//! Item persistence contract shared by intake, matching and backfill.

use crate::error::Result;
use crate::model::{EmbeddingState, MatchableItem, NewItem};

/// Persistence operations the core workflows depend on.
///
/// [`SqliteStorage`](super::SqliteStorage) is the production implementation.
pub trait ItemRepository {
    /// Load one request.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored row is corrupt.
    fn get_item(&self, id: i64) -> Result<Option<MatchableItem>>;

    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn owner_exists(&self, owner_id: i64) -> Result<bool>;

    /// Persist a validated request with its initial embedding state.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn insert_item(
        &mut self,
        item: &NewItem,
        embedding: &EmbeddingState,
        now: i64,
        actor: &str,
    ) -> Result<MatchableItem>;

    /// Next requests needing an embedding: `id > after_id`, `id <= to_id`,
    /// and no vector or a status other than `ready`, ascending by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    fn find_backfill_batch(
        &self,
        after_id: Option<i64>,
        to_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<MatchableItem>>;

    /// Write embedding states in one transaction. Ids that no longer exist
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    fn save_embedding_states(&mut self, updates: &[(i64, EmbeddingState)], actor: &str) -> Result<()>;
}
