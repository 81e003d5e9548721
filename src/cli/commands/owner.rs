//! Owner command implementations.

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::cli::OwnerCommands;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::model::{NewOwner, Owner};

use super::{format_timestamp, open_storage, DEFAULT_ACTOR};

/// Output for owner list.
#[derive(Serialize)]
struct OwnerListOutput {
    owners: Vec<Owner>,
    count: usize,
}

/// Execute owner commands.
pub fn execute(
    command: &OwnerCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    match command {
        OwnerCommands::Add {
            name,
            city,
            country,
        } => add(name, city.as_deref(), country.as_deref(), db_path, actor, json),
        OwnerCommands::List => list(db_path, json),
        OwnerCommands::Show { id } => show(*id, db_path, json),
    }
}

fn add(
    name: &str,
    city: Option<&str>,
    country: Option<&str>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let new_owner = NewOwner::parse(name, city, country)?;
    let mut storage = open_storage(db_path)?;
    let owner = storage.create_owner(
        &new_owner,
        SystemClock.now(),
        actor.unwrap_or(DEFAULT_ACTOR),
    )?;

    if json {
        println!("{}", serde_json::to_string(&owner)?);
    } else {
        println!("Registered owner {} ({})", owner.id.to_string().bold(), owner.display_name);
    }
    Ok(())
}

fn list(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let owners = storage.list_owners()?;

    if json {
        let count = owners.len();
        println!("{}", serde_json::to_string(&OwnerListOutput { owners, count })?);
        return Ok(());
    }

    if owners.is_empty() {
        println!("No owners registered.");
        return Ok(());
    }
    for owner in &owners {
        let place = [owner.city.as_deref(), owner.country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {:>5}  {}  {}", owner.id, owner.display_name, place.dimmed());
    }
    Ok(())
}

fn show(id: i64, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(db_path)?;
    let owner = storage.get_owner(id)?.ok_or(Error::OwnerNotFound { id })?;
    let owner_vector = storage.get_owner_embedding(id)?;

    if json {
        let mut value = serde_json::to_value(&owner)?;
        value["owner_embedding"] = serde_json::to_value(&owner_vector)?;
        println!("{value}");
        return Ok(());
    }

    println!("{}", owner.display_name.bold());
    println!("  ID:       {}", owner.id);
    if let Some(city) = &owner.city {
        println!("  City:     {city}");
    }
    if let Some(country) = &owner.country {
        println!("  Country:  {country}");
    }
    println!("  Created:  {}", format_timestamp(owner.created_at));
    if let Some(vector) = owner_vector {
        println!(
            "  Owner vector: {} ({} dims, from {}, {})",
            vector.model,
            vector.vector.len(),
            vector.source,
            format_timestamp(vector.updated_at)
        );
    }
    Ok(())
}
