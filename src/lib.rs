//! reqmatch - semantic matching of free-text requests
//!
//! This crate provides the core functionality for the `reqmatch` CLI tool.
//!
//! # Architecture
//!
//! - [`model`] - Requests, owners and the embedding lifecycle
//! - [`vector`] - Vector text codec and cosine distance
//! - [`embeddings`] - Embedding providers (OpenAI, Ollama, mock)
//! - [`storage`] - SQLite database layer
//! - [`matching`] - Candidate filter, vector store and matching engine
//! - [`intake`] - Create-with-embedding write path
//! - [`backfill`] - Batch reconciliation of non-ready embeddings
//! - [`legacy`] - Owner-level aggregate vectors
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backfill;
pub mod cli;
pub mod clock;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod intake;
pub mod legacy;
pub mod matching;
pub mod model;
pub mod storage;
pub mod validate;
pub mod vector;

pub use error::{Error, Result};
