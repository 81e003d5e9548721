//! Nearest-neighbour matching of requests.
//!
//! - [`filter`] - Candidate predicate derived from the source request
//! - [`store`] - The [`VectorStore`] contract and in-memory ranking
//! - [`engine`] - [`MatchingEngine`], which turns "matches for X" into a
//!   ranked, hydrated list

pub mod engine;
pub mod filter;
pub mod store;

pub use engine::{Match, MatchingEngine};
pub use filter::{CandidateFilter, GeoScope};
pub use store::{rank_candidates, Neighbor, VectorStore};
