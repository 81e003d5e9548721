//! Data models for reqmatch.
//!
//! This module contains the domain models:
//! - MatchableItem (a submitted request)
//! - EmbeddingState (per-item embedding lifecycle)
//! - Owner

pub mod embedding;
pub mod item;
pub mod owner;

pub use embedding::{AttemptOutcome, EmbeddingState, EmbeddingStatus};
pub use item::{ItemStatus, Location, MatchableItem, NewItem, NewItemInput};
pub use owner::{NewOwner, Owner};
