//! Owner-level aggregate vectors.
//!
//! Older deployments kept one vector per owner instead of per request.
//! These are still rebuilt on demand for consumers that read
//! `owner_embeddings`, but they take no part in request matching.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::embeddings::{embed_with_timeout, EmbeddingProvider};
use crate::error::Result;
use crate::model::Owner;
use crate::storage::SqliteStorage;

const ACTOR: &str = "rebuild-owners";

/// Where an owner vector's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerTextSource {
    /// Latest active request
    Request,
    /// Display name, city and country
    Profile,
}

impl OwnerTextSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Profile => "profile",
        }
    }
}

/// Counters for one rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OwnerRebuildReport {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Pick the text to embed for `owner`: the latest active request, else the
/// profile. `None` when both are blank.
///
/// # Errors
///
/// Returns an error if the request lookup fails.
pub fn owner_source_text(
    storage: &SqliteStorage,
    owner: &Owner,
) -> Result<Option<(String, OwnerTextSource)>> {
    if let Some(text) = storage.latest_active_request_text(owner.id)? {
        let text = text.trim();
        if !text.is_empty() {
            return Ok(Some((text.to_string(), OwnerTextSource::Request)));
        }
    }

    let profile = owner.profile_text();
    Ok((!profile.is_empty()).then_some((profile, OwnerTextSource::Profile)))
}

/// Re-embed every owner and upsert their aggregate vector.
///
/// Provider failures are logged and counted; the rebuild moves on to the
/// next owner.
///
/// # Errors
///
/// Returns an error only for storage failures.
pub async fn rebuild_owner_embeddings<P, C>(
    storage: &mut SqliteStorage,
    provider: &P,
    clock: &C,
    timeout: Duration,
) -> Result<OwnerRebuildReport>
where
    P: EmbeddingProvider,
    C: Clock,
{
    let owners = storage.list_owners()?;
    let model = provider.info().model;
    let mut report = OwnerRebuildReport {
        total: owners.len(),
        ..OwnerRebuildReport::default()
    };

    for owner in &owners {
        let Some((text, source)) = owner_source_text(storage, owner)? else {
            report.skipped += 1;
            continue;
        };

        match embed_with_timeout(provider, &text, timeout).await {
            Ok(vector) => {
                storage.upsert_owner_embedding(
                    owner.id,
                    &vector,
                    &model,
                    source.as_str(),
                    clock.now(),
                    ACTOR,
                )?;
                report.updated += 1;
            }
            Err(e) => {
                report.failed += 1;
                error!(owner_id = owner.id, error = %e, "Failed to rebuild owner embedding");
            }
        }
    }

    if report.failed > 0 {
        warn!(
            total = report.total,
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "Owner embedding rebuild finished with failures"
        );
    } else {
        info!(updated = report.updated, skipped = report.skipped, "Owner embeddings rebuilt");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;
    use crate::clock::FixedClock;
    use crate::error::ProviderError;
    use crate::model::{EmbeddingState, NewItem, NewItemInput, NewOwner};
    use crate::storage::ItemRepository;

    fn add_owner(storage: &mut SqliteStorage, name: &str, city: Option<&str>) -> Owner {
        storage
            .create_owner(&NewOwner::parse(name, city, None).unwrap(), 1, "test")
            .unwrap()
    }

    #[tokio::test]
    async fn test_rebuild_prefers_request_text_and_continues_on_failure() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let with_request = add_owner(&mut storage, "Ada", None);
        let profile_only = add_owner(&mut storage, "Grace", Some("Paris"));
        let failing = add_owner(&mut storage, "Linus", None);

        let item = NewItem::parse(NewItemInput {
            owner_id: with_request.id,
            text: "need a bike".into(),
            ..Default::default()
        })
        .unwrap();
        storage
            .insert_item(&item, &EmbeddingState::pending(1), 1, "test")
            .unwrap();

        let provider = MockProvider::new(2)
            .with_response("need a bike", vec![1.0, 0.0])
            .with_response("Grace, Paris", vec![0.0, 1.0])
            .with_failure("Linus", ProviderError::Transport("reset".into()));
        let clock = FixedClock::new(10);

        let report = rebuild_owner_embeddings(&mut storage, &provider, &clock, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            report,
            OwnerRebuildReport {
                total: 3,
                updated: 2,
                skipped: 0,
                failed: 1
            }
        );

        let stored = storage.get_owner_embedding(with_request.id).unwrap().unwrap();
        assert_eq!(stored.source, "request");
        assert_eq!(stored.vector, vec![1.0, 0.0]);

        let stored = storage.get_owner_embedding(profile_only.id).unwrap().unwrap();
        assert_eq!(stored.source, "profile");

        assert!(storage.get_owner_embedding(failing.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_twice_keeps_one_row_per_owner() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        add_owner(&mut storage, "Ada", None);
        let provider = MockProvider::new(2).with_fallback(Ok(vec![1.0, 1.0]));
        let clock = FixedClock::new(10);

        for _ in 0..2 {
            rebuild_owner_embeddings(&mut storage, &provider, &clock, Duration::from_secs(5))
                .await
                .unwrap();
        }

        let rows: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM owner_embeddings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
