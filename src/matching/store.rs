//! Nearest-neighbour contract.

use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::vector::cosine_distance;

use super::filter::CandidateFilter;

/// One ranked hit from a [`VectorStore`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub item_id: i64,
    /// Cosine distance to the query, in `[0, 2]`
    pub distance: f64,
}

/// Answers nearest-neighbour queries over stored item vectors.
pub trait VectorStore {
    /// Up to `limit` candidates passing `filter`, ordered by ascending
    /// cosine distance, equal distances by ascending item id.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage fails.
    fn find_nearest(
        &self,
        query: &[f64],
        filter: &CandidateFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>>;
}

/// Rank `(id, vector)` candidates against `query`.
///
/// Candidates whose dimension differs from the query are skipped.
pub fn rank_candidates<I>(query: &[f64], candidates: I, limit: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (i64, Vec<f64>)>,
{
    let mut ranked: Vec<Neighbor> = candidates
        .into_iter()
        .filter_map(|(item_id, vector)| match cosine_distance(query, &vector) {
            Some(distance) => Some(Neighbor { item_id, distance }),
            None => {
                warn!(
                    item_id,
                    expected = query.len(),
                    actual = vector.len(),
                    "Skipping candidate with mismatched embedding dimension"
                );
                None
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.item_id.cmp(&b.item_id))
    });
    ranked.truncate(limit);
    ranked
}
