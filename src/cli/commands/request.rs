//! Request command implementations.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{CreateRequestArgs, RequestCommands};
use crate::clock::SystemClock;
use crate::embeddings::{build_provider, resolve_embedding_config};
use crate::error::{Error, Result};
use crate::intake::Intake;
use crate::model::{EmbeddingStatus, ItemStatus, MatchableItem, NewItemInput};
use crate::storage::events::get_events;
use crate::validate;

use super::{format_timestamp, open_storage, runtime, DEFAULT_ACTOR};

/// Output for request show.
#[derive(Serialize)]
struct RequestShowOutput {
    #[serde(flatten)]
    request: MatchableItem,
    history: Vec<HistoryEntry>,
}

#[derive(Serialize)]
struct HistoryEntry {
    event: &'static str,
    actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    at: i64,
}

/// Output for request list.
#[derive(Serialize)]
struct RequestListOutput {
    requests: Vec<MatchableItem>,
    count: usize,
}

#[derive(Serialize)]
struct MutationOutput {
    id: i64,
    action: &'static str,
}

/// Execute request commands.
pub fn execute(
    command: &RequestCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let actor = actor.unwrap_or(DEFAULT_ACTOR);
    match command {
        RequestCommands::Create(args) => create(args, db_path, actor, json),
        RequestCommands::Show { id } => show(*id, db_path, json),
        RequestCommands::List {
            owner,
            status,
            limit,
            offset,
        } => list(*owner, status, *limit, *offset, db_path, json),
        RequestCommands::Close { id } => close(*id, db_path, actor, json),
        RequestCommands::Delete { id } => delete(*id, db_path, actor, json),
    }
}

fn create(args: &CreateRequestArgs, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let config = resolve_embedding_config()?;
    let provider = build_provider(&config);
    let mut storage = open_storage(db_path)?;
    let clock = SystemClock;

    let input = NewItemInput {
        owner_id: args.owner,
        text: args.text.clone(),
        category: args.category.clone(),
        city: args.city.clone(),
        country: args.country.clone(),
    };

    let rt = runtime()?;
    let item = rt.block_on(async {
        Intake::new(&mut storage, &clock, actor)
            .with_provider(provider.as_ref(), config.timeout)
            .create(input)
            .await
    })?;

    if json {
        println!("{}", serde_json::to_string(&item)?);
        return Ok(());
    }

    println!("Created request {}", item.id.to_string().bold());
    match item.embedding.status() {
        EmbeddingStatus::Ready => println!("  Embedding: {}", "ready".green()),
        EmbeddingStatus::Pending => println!(
            "  Embedding: {} (no provider configured; run `reqmatch embeddings backfill` later)",
            "pending".yellow()
        ),
        EmbeddingStatus::Error => println!(
            "  Embedding: {} ({})\n  It will be retried by `reqmatch embeddings backfill`.",
            "error".red(),
            item.embedding.error().unwrap_or_default()
        ),
    }
    Ok(())
}

fn show(id: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let request = storage.get_request(id)?.ok_or(Error::ItemNotFound { id })?;
    let history: Vec<HistoryEntry> = get_events(storage.conn(), "request", &id.to_string(), Some(20))?
        .into_iter()
        .map(|e| HistoryEntry {
            event: e.event_type.as_str(),
            actor: e.actor,
            detail: e.comment.or(e.new_value),
            at: e.created_at,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string(&RequestShowOutput { request, history })?);
        return Ok(());
    }

    println!("{} {}", "Request".bold(), request.id);
    println!("  Owner:     {}", request.owner_id);
    println!("  Status:    {}", request.status);
    if let Some(category) = &request.category {
        println!("  Category:  {category}");
    }
    if let Some(city) = &request.location.city {
        println!("  City:      {city}");
    }
    if let Some(country) = &request.location.country {
        println!("  Country:   {country}");
    }
    println!("  Created:   {}", format_timestamp(request.created_at));
    println!("  Text:      {}", request.text);
    println!();
    println!("{}", "Embedding".bold());
    println!("  Status:    {}", request.embedding.status());
    if let Some(model) = request.embedding.model() {
        println!("  Model:     {model}");
    }
    if let Some(vector) = request.embedding.vector() {
        println!("  Dims:      {}", vector.len());
    }
    if let Some(updated) = request.embedding.updated_at() {
        println!("  Updated:   {}", format_timestamp(updated));
    }
    if let Some(error) = request.embedding.error() {
        println!("  Error:     {}", error.red());
    }

    if !history.is_empty() {
        println!();
        println!("{}", "History".bold());
        for entry in &history {
            let detail = entry.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default();
            println!(
                "  {}  {}{} {}",
                format_timestamp(entry.at).dimmed(),
                entry.event,
                detail,
                format!("by {}", entry.actor).dimmed()
            );
        }
    }
    Ok(())
}

fn list(
    owner_id: i64,
    status: &str,
    limit: usize,
    offset: usize,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let status: ItemStatus = validate::item_status(status)?;
    let storage = open_storage(db_path)?;
    if storage.get_owner(owner_id)?.is_none() {
        return Err(Error::OwnerNotFound { id: owner_id });
    }
    let requests = storage.list_requests_by_owner(owner_id, status, limit, offset)?;

    if json {
        let count = requests.len();
        println!("{}", serde_json::to_string(&RequestListOutput { requests, count })?);
        return Ok(());
    }

    if requests.is_empty() {
        println!("No {status} requests for owner {owner_id}.");
        return Ok(());
    }
    for request in &requests {
        println!(
            "  {:>5}  {:<8} {}",
            request.id,
            request.embedding.status().to_string(),
            request.preview()
        );
    }
    Ok(())
}

fn close(id: i64, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    storage.set_request_status(id, ItemStatus::Inactive, actor)?;

    if json {
        println!("{}", serde_json::to_string(&MutationOutput { id, action: "closed" })?);
    } else {
        println!("Closed request {id}");
    }
    Ok(())
}

fn delete(id: i64, db_path: Option<&PathBuf>, actor: &str, json: bool) -> Result<()> {
    let mut storage = open_storage(db_path)?;
    storage.delete_request(id, actor)?;

    if json {
        println!("{}", serde_json::to_string(&MutationOutput { id, action: "deleted" })?);
    } else {
        println!("Deleted request {id}");
    }
    Ok(())
}
