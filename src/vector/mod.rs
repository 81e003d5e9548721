//! Vector primitives shared by storage and matching.
//!
//! - [`codec`] - Bracketed text representation used for persisted vectors
//! - [`distance`] - Cosine distance and the distance→similarity mapping

pub mod codec;
pub mod distance;

pub use codec::{format_vector, parse_vector};
pub use distance::{cosine_distance, similarity_from_distance};
