//! Query path: readiness check, nearest-neighbour lookup, hydration.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::MatchableItem;
use crate::storage::ItemRepository;
use crate::validate;
use crate::vector::similarity_from_distance;

use super::filter::CandidateFilter;
use super::store::VectorStore;

/// One hydrated match.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub item: MatchableItem,
    pub distance: f64,
    /// `1 - distance`, not clamped; may be negative
    pub similarity: f64,
}

/// Finds requests similar to a given one.
///
/// Read-only. Both collaborators are injected; with SQLite the same
/// storage serves as repository and vector store.
pub struct MatchingEngine<'a, R, V> {
    items: &'a R,
    store: &'a V,
    category_filter: bool,
}

impl<'a, R: ItemRepository, V: VectorStore> MatchingEngine<'a, R, V> {
    #[must_use]
    pub const fn new(items: &'a R, store: &'a V) -> Self {
        Self {
            items,
            store,
            category_filter: true,
        }
    }

    /// Require candidates to share the source's category (when it has one).
    #[must_use]
    pub const fn with_category_filter(mut self, enabled: bool) -> Self {
        self.category_filter = enabled;
        self
    }

    /// Ranked matches for `item_id`.
    ///
    /// `limit` is clamped to `[1, 100]` and defaults to 20. A source whose
    /// embedding is not `ready` yields an empty list without touching the
    /// vector store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ItemNotFound`] if the source does not exist, or a
    /// storage error.
    pub fn find_matches(&self, item_id: i64, limit: Option<i64>) -> Result<Vec<Match>> {
        let limit = validate::normalize_limit(limit);

        let source = self
            .items
            .get_item(item_id)?
            .ok_or(Error::ItemNotFound { id: item_id })?;

        let Some(query) = source.embedding.ready_vector() else {
            debug!(
                item_id,
                status = %source.embedding.status(),
                "Source embedding not ready, no matches"
            );
            return Ok(Vec::new());
        };

        let filter = CandidateFilter::for_source(&source, self.category_filter);
        let neighbors = self.store.find_nearest(query, &filter, limit)?;

        let mut matches = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            // One lookup per hit; fine at these limits
            match self.items.get_item(neighbor.item_id) {
                Ok(Some(item)) => matches.push(Match {
                    item,
                    distance: neighbor.distance,
                    similarity: similarity_from_distance(neighbor.distance),
                }),
                Ok(None) => warn!(item_id = neighbor.item_id, "Matched request vanished before hydration"),
                Err(Error::Corrupt(reason)) => {
                    warn!(item_id = neighbor.item_id, %reason, "Skipping corrupt matched request");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(item_id, limit, matches = matches.len(), "Matches found");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::matching::Neighbor;
    use crate::model::{EmbeddingState, NewItem, NewItemInput, NewOwner};
    use crate::storage::SqliteStorage;

    /// Wraps a store and counts `find_nearest` calls.
    struct CountingStore<'a> {
        inner: &'a SqliteStorage,
        calls: Cell<usize>,
        last_limit: Cell<usize>,
    }

    impl<'a> CountingStore<'a> {
        fn new(inner: &'a SqliteStorage) -> Self {
            Self {
                inner,
                calls: Cell::new(0),
                last_limit: Cell::new(0),
            }
        }
    }

    impl VectorStore for CountingStore<'_> {
        fn find_nearest(
            &self,
            query: &[f64],
            filter: &CandidateFilter,
            limit: usize,
        ) -> Result<Vec<Neighbor>> {
            self.calls.set(self.calls.get() + 1);
            self.last_limit.set(limit);
            self.inner.find_nearest(query, filter, limit)
        }
    }

    /// Returns the same neighbours for every query.
    struct FixedStore(Vec<Neighbor>);

    impl VectorStore for FixedStore {
        fn find_nearest(&self, _: &[f64], _: &CandidateFilter, _: usize) -> Result<Vec<Neighbor>> {
            Ok(self.0.clone())
        }
    }

    fn setup() -> (SqliteStorage, i64, i64) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let a = storage
            .create_owner(&NewOwner::parse("a", None, None).unwrap(), 1, "test")
            .unwrap()
            .id;
        let b = storage
            .create_owner(&NewOwner::parse("b", None, None).unwrap(), 1, "test")
            .unwrap()
            .id;
        (storage, a, b)
    }

    fn add(storage: &mut SqliteStorage, owner_id: i64, text: &str, vector: Option<Vec<f64>>) -> i64 {
        let mut state = EmbeddingState::pending(1);
        if let Some(vector) = vector {
            let dims = vector.len();
            state.mark_ready(vector, "m", 2, dims).unwrap();
        }
        let item = NewItem::parse(NewItemInput {
            owner_id,
            text: text.to_string(),
            ..Default::default()
        })
        .unwrap();
        storage.insert_item(&item, &state, 1, "test").unwrap().id
    }

    #[test]
    fn test_orthogonal_match_has_zero_similarity() {
        let (mut storage, a, b) = setup();
        let first = add(&mut storage, a, "first", Some(vec![1.0, 0.0, 0.0]));
        let second = add(&mut storage, b, "second", Some(vec![0.0, 1.0, 0.0]));

        let engine = MatchingEngine::new(&storage, &storage);
        let matches = engine.find_matches(first, None).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item.id, second);
        assert!(matches[0].similarity.abs() < 1e-12);
    }

    #[test]
    fn test_pending_source_never_queries_store() {
        let (mut storage, a, b) = setup();
        let pending = add(&mut storage, a, "pending", None);
        add(&mut storage, b, "other", Some(vec![1.0, 0.0]));

        let store = CountingStore::new(&storage);
        let engine = MatchingEngine::new(&storage, &store);

        assert!(engine.find_matches(pending, Some(5)).unwrap().is_empty());
        assert_eq!(store.calls.get(), 0);
    }

    #[test]
    fn test_limit_is_clamped() {
        let (mut storage, a, b) = setup();
        let source = add(&mut storage, a, "source", Some(vec![1.0, 0.0]));
        for i in 0..3 {
            add(&mut storage, b, &format!("c{i}"), Some(vec![1.0, f64::from(i)]));
        }

        let store = CountingStore::new(&storage);
        let engine = MatchingEngine::new(&storage, &store);

        assert_eq!(engine.find_matches(source, Some(0)).unwrap().len(), 1);
        assert_eq!(store.last_limit.get(), 1);

        engine.find_matches(source, Some(10_000)).unwrap();
        assert_eq!(store.last_limit.get(), 100);

        engine.find_matches(source, None).unwrap();
        assert_eq!(store.last_limit.get(), 20);
    }

    #[test]
    fn test_results_exclude_source_and_same_owner_in_distance_order() {
        let (mut storage, a, b) = setup();
        let source = add(&mut storage, a, "source", Some(vec![1.0, 0.0]));
        add(&mut storage, a, "sibling", Some(vec![1.0, 0.0]));
        let far = add(&mut storage, b, "far", Some(vec![-1.0, 0.0]));
        let near = add(&mut storage, b, "near", Some(vec![1.0, 0.1]));

        let engine = MatchingEngine::new(&storage, &storage);
        let matches = engine.find_matches(source, Some(10)).unwrap();

        let ids: Vec<i64> = matches.iter().map(|m| m.item.id).collect();
        assert_eq!(ids, vec![near, far]);
        assert!(matches[0].distance <= matches[1].distance);
        // Opposite vectors: distance 2, similarity stays unclamped
        assert!((matches[1].similarity + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ready_candidate_without_model_is_not_matched() {
        let (mut storage, a, b) = setup();
        let source = add(&mut storage, a, "source", Some(vec![1.0, 0.0]));
        let broken = add(&mut storage, b, "broken", Some(vec![1.0, 0.0]));
        let good = add(&mut storage, b, "good", Some(vec![1.0, 0.5]));
        storage
            .conn()
            .execute("UPDATE requests SET embedding_model = NULL WHERE id = ?1", [broken])
            .unwrap();

        let engine = MatchingEngine::new(&storage, &storage);
        let ids: Vec<i64> = engine
            .find_matches(source, None)
            .unwrap()
            .iter()
            .map(|m| m.item.id)
            .collect();
        assert_eq!(ids, vec![good]);
    }

    #[test]
    fn test_corrupt_hit_is_skipped_during_hydration() {
        let (mut storage, a, b) = setup();
        let source = add(&mut storage, a, "source", Some(vec![1.0, 0.0]));
        let broken = add(&mut storage, b, "broken", Some(vec![1.0, 0.0]));
        let good = add(&mut storage, b, "good", Some(vec![1.0, 0.5]));
        storage
            .conn()
            .execute("UPDATE requests SET embedding_model = NULL WHERE id = ?1", [broken])
            .unwrap();

        let store = FixedStore(vec![
            Neighbor { item_id: broken, distance: 0.0 },
            Neighbor { item_id: good, distance: 0.1 },
        ]);
        let engine = MatchingEngine::new(&storage, &store);
        let matches = engine.find_matches(source, None).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].item.id, good);
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let (storage, _, _) = setup();
        let engine = MatchingEngine::new(&storage, &storage);
        assert!(matches!(
            engine.find_matches(404, None),
            Err(Error::ItemNotFound { id: 404 })
        ));
    }
}
