//! Candidate filter derived from a source request.

use crate::model::MatchableItem;

/// Geographic narrowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoScope {
    Anywhere,
    City(String),
    Country(String),
}

/// Predicate set applied on top of "active and ready".
///
/// Candidates must be `active`, have a `ready` embedding, and satisfy
/// every field here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFilter {
    pub exclude_item_id: i64,
    pub exclude_owner_id: i64,
    /// Exact category to require, if any
    pub category: Option<String>,
    pub geo: GeoScope,
}

impl CandidateFilter {
    /// Build the filter for matching `source`.
    ///
    /// City narrows before country; a source with neither matches anywhere.
    /// The category is only required when `category_filter` is on and the
    /// source has one.
    #[must_use]
    pub fn for_source(source: &MatchableItem, category_filter: bool) -> Self {
        let geo = match (&source.location.city, &source.location.country) {
            (Some(city), _) => GeoScope::City(city.clone()),
            (None, Some(country)) => GeoScope::Country(country.clone()),
            (None, None) => GeoScope::Anywhere,
        };

        Self {
            exclude_item_id: source.id,
            exclude_owner_id: source.owner_id,
            category: if category_filter {
                source.category.clone()
            } else {
                None
            },
            geo,
        }
    }
}
