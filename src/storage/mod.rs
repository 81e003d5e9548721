//! SQLite storage layer for reqmatch.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`migrations`] - Versioned upgrades for older databases
//! - [`repository`] - The [`ItemRepository`] contract
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use repository::ItemRepository;
pub use sqlite::{EmbeddingStatusCounts, MutationContext, OwnerEmbedding, ResetScope, SqliteStorage};
