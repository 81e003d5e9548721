//! Batch reconciliation of requests without a `ready` embedding.
//!
//! Walks candidates in ascending id order with a cursor, re-embeds each
//! one and records the outcome. A failing item is logged and counted; it
//! never stops the run. Because every item is handled independently,
//! disjoint `[from_id, to_id]` ranges can be run by separate processes.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::embeddings::{embed_with_timeout, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::model::{AttemptOutcome, EmbeddingState};
use crate::storage::ItemRepository;

/// Default number of candidates fetched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Actor name recorded on audit events.
pub const BACKFILL_ACTOR: &str = "backfill";

/// Backfill parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Cap on candidates processed in total
    pub limit: Option<usize>,
    /// Inclusive lower id bound
    pub from_id: Option<i64>,
    /// Inclusive upper id bound
    pub to_id: Option<i64>,
    pub batch_size: usize,
    /// Embed and count, but write nothing
    pub dry_run: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            limit: None,
            from_id: None,
            to_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
        }
    }
}

impl BackfillOptions {
    /// Reject an inverted id range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `from_id > to_id`.
    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from_id, self.to_id) {
            if from > to {
                return Err(Error::Config(format!(
                    "from-id must be less than or equal to to-id (got {from} > {to})"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dry_run: bool,
}

impl BackfillReport {
    /// `false` if any item failed. Informational only; nothing is rolled back.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Processed {} requests: {} updated, {} skipped, {} failed.",
            self.processed, self.updated, self.skipped, self.failed
        )
    }
}

/// Retries the embedding of every request that is not `ready`.
pub struct BackfillOrchestrator<'a, R, P, C> {
    items: &'a mut R,
    provider: &'a P,
    clock: &'a C,
    timeout: Duration,
}

impl<'a, R, P, C> BackfillOrchestrator<'a, R, P, C>
where
    R: ItemRepository,
    P: EmbeddingProvider,
    C: Clock,
{
    #[must_use]
    pub const fn new(items: &'a mut R, provider: &'a P, clock: &'a C, timeout: Duration) -> Self {
        Self {
            items,
            provider,
            clock,
            timeout,
        }
    }

    /// Run the backfill.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an inverted id range, before any item
    /// is read. Storage errors abort the run; batches already saved stay
    /// saved, and a rerun resumes with whatever is still not `ready`.
    pub async fn run(&mut self, options: &BackfillOptions) -> Result<BackfillReport> {
        options.validate()?;

        let info = self.provider.info();
        let batch_size = options.effective_batch_size();
        let mut report = BackfillReport {
            dry_run: options.dry_run,
            ..BackfillReport::default()
        };
        let mut cursor = options.from_id.map(|id| id.saturating_sub(1));

        info!(
            provider = %info.name,
            model = %info.model,
            dimensions = info.dimensions,
            batch_size,
            dry_run = options.dry_run,
            "Starting embedding backfill"
        );

        loop {
            let remaining = options
                .limit
                .map_or(usize::MAX, |limit| limit.saturating_sub(report.processed));
            let batch_limit = batch_size.min(remaining);
            if batch_limit == 0 {
                break;
            }

            let batch = self
                .items
                .find_backfill_batch(cursor, options.to_id, batch_limit)?;
            if batch.is_empty() {
                break;
            }
            debug!(size = batch.len(), after_id = ?cursor, "Processing backfill batch");

            let mut updates: Vec<(i64, EmbeddingState)> = Vec::with_capacity(batch.len());
            for item in batch {
                report.processed += 1;
                cursor = Some(item.id);

                let Some(text) = item.embeddable_text() else {
                    report.skipped += 1;
                    debug!(item_id = item.id, "Skipping request with blank text");
                    continue;
                };

                let attempt = embed_with_timeout(self.provider, text, self.timeout).await;
                let mut state = item.embedding.clone();
                match state.apply_attempt(attempt, &info.model, self.clock.now(), info.dimensions) {
                    AttemptOutcome::Ready => report.updated += 1,
                    AttemptOutcome::Failed(message) => {
                        report.failed += 1;
                        error!(item_id = item.id, error = %message, "Failed to backfill request embedding");
                    }
                }

                if !options.dry_run {
                    updates.push((item.id, state));
                }
            }

            if !options.dry_run {
                self.items.save_embedding_states(&updates, BACKFILL_ACTOR)?;
            }
        }

        if report.is_success() {
            info!(
                processed = report.processed,
                updated = report.updated,
                skipped = report.skipped,
                "Embedding backfill finished"
            );
        } else {
            warn!(
                processed = report.processed,
                updated = report.updated,
                skipped = report.skipped,
                failed = report.failed,
                "Embedding backfill finished with failures"
            );
        }

        Ok(report)
    }
}
