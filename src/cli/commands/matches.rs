//! Matches command implementation.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::config::is_category_filter_enabled;
use crate::error::{Error, Result};
use crate::matching::MatchingEngine;
use crate::model::EmbeddingStatus;

use super::open_storage;

/// Output for the matches command.
#[derive(Serialize)]
struct MatchesOutput {
    source_id: i64,
    embedding_status: EmbeddingStatus,
    /// True until a backfill gives the source a ready embedding
    needs_backfill: bool,
    matches: Vec<MatchEntry>,
    count: usize,
}

#[derive(Serialize)]
struct MatchEntry {
    id: i64,
    owner_id: i64,
    similarity: f64,
    distance: f64,
    preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<String>,
}

/// Execute the matches command.
pub fn execute(id: i64, limit: Option<i64>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let source = storage.get_request(id)?.ok_or(Error::ItemNotFound { id })?;

    let engine = MatchingEngine::new(&storage, &storage)
        .with_category_filter(is_category_filter_enabled());
    let matches = engine.find_matches(id, limit)?;
    let needs_backfill = source.embedding.is_retry_eligible();

    let entries: Vec<MatchEntry> = matches
        .into_iter()
        .map(|m| MatchEntry {
            id: m.item.id,
            owner_id: m.item.owner_id,
            similarity: m.similarity,
            distance: m.distance,
            preview: m.item.preview(),
            category: m.item.category,
            city: m.item.location.city,
            country: m.item.location.country,
        })
        .collect();

    if json {
        let output = MatchesOutput {
            source_id: id,
            embedding_status: source.embedding.status(),
            needs_backfill,
            count: entries.len(),
            matches: entries,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if needs_backfill {
        println!(
            "Request {id} has no ready embedding ({}); no matches yet.",
            source.embedding.status()
        );
        println!("Run `reqmatch embeddings backfill` to retry it.");
        return Ok(());
    }

    if entries.is_empty() {
        println!("No matches for request {id}.");
        return Ok(());
    }

    println!("{} for request {id}:", "Matches".bold());
    for entry in &entries {
        println!(
            "  {:>5}  {}  {}",
            entry.id,
            format!("{:.3}", entry.similarity).cyan(),
            entry.preview
        );
    }
    Ok(())
}
