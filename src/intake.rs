//! Write path: create a request and embed it right away.
//!
//! The request is stored `pending` first, then one embed attempt runs.
//! A provider failure is recorded as `error` state on the stored request;
//! the create itself still succeeds and a later backfill retries it.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::embeddings::config::DEFAULT_TIMEOUT_SECS;
use crate::embeddings::{embed_with_timeout, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::model::{AttemptOutcome, EmbeddingState, MatchableItem, NewItem, NewItemInput};
use crate::storage::ItemRepository;

/// Creates requests, attaching an embedding when a provider is configured.
pub struct Intake<'a, R, P, C> {
    items: &'a mut R,
    provider: Option<&'a P>,
    clock: &'a C,
    timeout: Duration,
    actor: &'a str,
}

impl<'a, R, P, C> Intake<'a, R, P, C>
where
    R: ItemRepository,
    P: EmbeddingProvider,
    C: Clock,
{
    /// Intake without a provider; created requests stay `pending`.
    #[must_use]
    pub const fn new(items: &'a mut R, clock: &'a C, actor: &'a str) -> Self {
        Self {
            items,
            provider: None,
            clock,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            actor,
        }
    }

    #[must_use]
    pub const fn with_provider(mut self, provider: Option<&'a P>, timeout: Duration) -> Self {
        self.provider = provider;
        self.timeout = timeout;
        self
    }

    /// Validate, store and embed a new request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed input and
    /// [`Error::OwnerNotFound`] for an unknown owner; both before anything
    /// is written or embedded. Provider failures are never returned.
    pub async fn create(&mut self, input: NewItemInput) -> Result<MatchableItem> {
        let new_item = NewItem::parse(input)?;
        if !self.items.owner_exists(new_item.owner_id())? {
            return Err(Error::OwnerNotFound {
                id: new_item.owner_id(),
            });
        }

        let mut item = self.items.insert_item(
            &new_item,
            &EmbeddingState::pending(self.clock.now()),
            self.clock.now(),
            self.actor,
        )?;

        let Some(provider) = self.provider else {
            debug!(item_id = item.id, "No embedding provider, request left pending");
            return Ok(item);
        };

        let info = provider.info();
        let attempt = embed_with_timeout(provider, new_item.text(), self.timeout).await;
        match item
            .embedding
            .apply_attempt(attempt, &info.model, self.clock.now(), info.dimensions)
        {
            AttemptOutcome::Ready => {
                info!(item_id = item.id, model = %info.model, "Request embedded");
            }
            AttemptOutcome::Failed(message) => {
                warn!(
                    item_id = item.id,
                    model = %info.model,
                    error = %message,
                    "Embedding deferred; request stored in error state"
                );
            }
        }

        self.items
            .save_embedding_states(&[(item.id, item.embedding.clone())], self.actor)?;
        Ok(item)
    }
}
