//! Embeddings command implementation.
//!
//! Provides CLI commands for managing request embeddings:
//! - `status` - Provider configuration and per-status counts
//! - `test` - One live embed call
//! - `backfill` - Retry requests that are not `ready`
//! - `configure` - Persist provider settings
//! - `reset` - Mark requests `pending` for re-embedding
//! - `rebuild-owners` - Rebuild the legacy per-owner vectors

use std::path::PathBuf;

use colored::Colorize;
use serde::Serialize;

use crate::backfill::{BackfillOptions, BackfillOrchestrator, BackfillReport};
use crate::cli::EmbeddingsCommands;
use crate::clock::{Clock, SystemClock};
use crate::embeddings::{
    build_provider, detect_available_providers, embed_with_timeout, reset_embedding_settings,
    resolve_embedding_config, save_embedding_settings, BoxedProvider, EmbeddingProvider,
    EmbeddingProviderType, EmbeddingSettings, ResolvedEmbeddingConfig,
};
use crate::error::{Error, ProviderError, Result};
use crate::legacy::{rebuild_owner_embeddings, OwnerRebuildReport};
use crate::storage::{EmbeddingStatusCounts, ResetScope};

use super::{open_storage, runtime, DEFAULT_ACTOR};

/// Output for embeddings status command.
#[derive(Serialize)]
struct StatusOutput {
    enabled: bool,
    provider: String,
    model: String,
    dimensions: usize,
    timeout_secs: u64,
    available_providers: Vec<String>,
    counts: EmbeddingStatusCounts,
    total: usize,
}

/// Output for embeddings test command.
#[derive(Serialize)]
struct TestOutput {
    success: bool,
    provider: String,
    model: String,
    dimensions: usize,
    input_text: String,
    embedding_sample: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Output for configure command.
#[derive(Serialize)]
struct ConfigureOutput {
    success: bool,
    message: String,
}

/// Output for backfill command.
#[derive(Serialize)]
struct BackfillOutput {
    #[serde(flatten)]
    report: BackfillReport,
    provider: String,
    model: String,
}

#[derive(Serialize)]
struct ResetOutput {
    reset: usize,
}

/// Execute embeddings command.
pub fn execute(
    command: &EmbeddingsCommands,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let actor = actor.unwrap_or(DEFAULT_ACTOR);
    match command {
        EmbeddingsCommands::Status => execute_status(db_path, json),
        EmbeddingsCommands::Test { text } => execute_test(text, json),
        EmbeddingsCommands::Backfill {
            limit,
            from_id,
            to_id,
            batch_size,
            dry_run,
        } => {
            // Non-positive values mean "no bound", as if omitted
            let options = BackfillOptions {
                limit: limit.filter(|n| *n > 0),
                from_id: from_id.filter(|n| *n > 0),
                to_id: to_id.filter(|n| *n > 0),
                batch_size: *batch_size,
                dry_run: *dry_run,
            };
            execute_backfill(db_path, &options, json)
        }
        EmbeddingsCommands::Configure {
            provider,
            enable,
            disable,
            model,
            endpoint,
            dimensions,
            timeout_secs,
            reset,
        } => {
            if *reset {
                return execute_configure_reset(json);
            }
            let enabled = match (*enable, *disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            execute_configure(
                *provider,
                enabled,
                model.clone(),
                endpoint.clone(),
                *dimensions,
                *timeout_secs,
                json,
            )
        }
        EmbeddingsCommands::Reset {
            id,
            stale_model,
            all,
        } => execute_reset(*id, *stale_model, *all, db_path, actor, json),
        EmbeddingsCommands::RebuildOwners => execute_rebuild_owners(db_path, json),
    }
}

/// Build the configured provider or explain why there is none.
fn require_provider(config: &ResolvedEmbeddingConfig) -> Result<BoxedProvider> {
    if !config.enabled {
        return Err(Error::Config(
            "Embeddings are disabled (REQMATCH_EMBEDDINGS_ENABLED or `embeddings configure --enable`)"
                .into(),
        ));
    }
    build_provider(config).ok_or_else(|| {
        Error::Provider(ProviderError::Unavailable(format!(
            "{} is selected but not configured",
            config.provider
        )))
    })
}

/// Show provider configuration and embedding counts.
fn execute_status(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = resolve_embedding_config()?;
    let storage = open_storage(db_path)?;
    let counts = storage.count_embedding_status()?;

    let available_providers = if config.enabled {
        runtime()?.block_on(detect_available_providers(&config)).available
    } else {
        Vec::new()
    };

    let output = StatusOutput {
        enabled: config.enabled,
        provider: config.provider.to_string(),
        model: config.model().to_string(),
        dimensions: config.dimensions(),
        timeout_secs: config.timeout.as_secs(),
        available_providers,
        total: counts.total(),
        counts,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "Embeddings Status".bold());
    println!();
    println!("Enabled:    {}", if output.enabled { "yes" } else { "no" });
    println!("Provider:   {}", output.provider);
    println!("Model:      {}", output.model);
    println!("Dimensions: {}", output.dimensions);
    println!("Timeout:    {}s", output.timeout_secs);
    if output.enabled {
        let reachable = if output.available_providers.is_empty() {
            "none".to_string()
        } else {
            output.available_providers.join(", ")
        };
        println!("Reachable:  {reachable}");
    }
    println!();
    println!("{}", "Requests".bold());
    println!("  Ready:   {}", output.counts.ready.to_string().green());
    println!("  Pending: {}", output.counts.pending.to_string().yellow());
    println!("  Error:   {}", output.counts.error.to_string().red());
    println!("  Total:   {}", output.total);
    if !output.counts.models.is_empty() {
        println!();
        println!("{}", "Stored vectors by model".bold());
        for (model, n) in &output.counts.models {
            let marker = if model == &output.model { "" } else { "  (stale)" };
            println!("  {model}: {n}{marker}");
        }
    }
    if output.counts.pending + output.counts.error > 0 {
        println!();
        println!("Run 'reqmatch embeddings backfill' to embed the remaining requests.");
    }
    Ok(())
}

/// Test embedding provider connectivity.
fn execute_test(text: &str, json: bool) -> Result<()> {
    let config = resolve_embedding_config()?;
    let provider = require_provider(&config)?;
    let info = provider.info();

    let result = runtime()?.block_on(embed_with_timeout(&provider, text, config.timeout));

    match result {
        Ok(embedding) => {
            let sample: Vec<f64> = embedding.iter().take(5).copied().collect();
            if json {
                let output = TestOutput {
                    success: true,
                    provider: info.name,
                    model: info.model,
                    dimensions: embedding.len(),
                    input_text: text.to_string(),
                    embedding_sample: sample,
                    error: None,
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("Embedding Test: {}", "SUCCESS".green());
                println!();
                println!("Provider:   {}", info.name);
                println!("Model:      {}", info.model);
                println!("Dimensions: {}", embedding.len());
                println!("Input:      \"{text}\"");
                println!();
                println!("Sample (first 5 values):");
                for (i, v) in sample.iter().enumerate() {
                    println!("  [{i}] {v:.6}");
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                let output = TestOutput {
                    success: false,
                    provider: info.name,
                    model: info.model,
                    dimensions: 0,
                    input_text: text.to_string(),
                    embedding_sample: vec![],
                    error: Some(e.to_string()),
                };
                println!("{}", serde_json::to_string(&output)?);
            } else {
                println!("Embedding Test: {}", "FAILED".red());
                println!();
                println!("Provider: {}", info.name);
                println!("Model:    {}", info.model);
                println!("Error:    {e}");
            }
            Err(Error::Provider(e))
        }
    }
}

/// Backfill embeddings for requests that are not ready.
fn execute_backfill(db_path: Option<&PathBuf>, options: &BackfillOptions, json: bool) -> Result<()> {
    // Reject a bad range before touching provider or database
    options.validate()?;

    let config = resolve_embedding_config()?;
    let provider = require_provider(&config)?;
    let info = provider.info();
    let mut storage = open_storage(db_path)?;
    let clock = SystemClock;

    if !json {
        println!(
            "Backfilling embeddings with {} ({}){}...",
            info.name,
            info.model,
            if options.dry_run { " [dry run]" } else { "" }
        );
    }

    let report = runtime()?.block_on(async {
        BackfillOrchestrator::new(&mut storage, &provider, &clock, config.timeout)
            .run(options)
            .await
    })?;

    if json {
        let output = BackfillOutput {
            report,
            provider: info.name,
            model: info.model,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if report.is_success() {
        println!("{}", report.summary().green());
    } else {
        println!("{}", report.summary().yellow());
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(Error::BackfillIncomplete {
            failed: report.failed,
        })
    }
}

/// Configure embedding settings.
fn execute_configure(
    provider: Option<EmbeddingProviderType>,
    enabled: Option<bool>,
    model: Option<String>,
    endpoint: Option<String>,
    dimensions: Option<usize>,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    if dimensions == Some(0) || timeout_secs == Some(0) {
        return Err(Error::Validation(
            "--dimensions and --timeout-secs must be positive".into(),
        ));
    }

    // Model and endpoint apply to the provider being configured, or to
    // the one currently in effect
    let target = match provider {
        Some(p) => p,
        None => resolve_embedding_config()?.provider,
    };

    let mut settings = EmbeddingSettings {
        enabled,
        provider,
        dimensions,
        timeout_secs,
        ..EmbeddingSettings::default()
    };
    match target {
        EmbeddingProviderType::Openai => {
            settings.OPENAI_EMBEDDING_MODEL = model;
            settings.OPENAI_ENDPOINT = endpoint;
        }
        EmbeddingProviderType::Ollama => {
            settings.OLLAMA_MODEL = model;
            settings.OLLAMA_ENDPOINT = endpoint;
        }
    }

    if settings == EmbeddingSettings::default() {
        return Err(Error::Validation(
            "Nothing to configure; pass --provider, --model, --endpoint, --dimensions, --timeout-secs, --enable or --disable".into(),
        ));
    }

    save_embedding_settings(&settings)?;
    let message = format!("Embedding settings saved for {target}");

    if json {
        println!(
            "{}",
            serde_json::to_string(&ConfigureOutput {
                success: true,
                message,
            })?
        );
    } else {
        println!("{message}");
        println!("Requests embedded with a different model can be re-embedded with:");
        println!("  reqmatch embeddings reset --stale-model && reqmatch embeddings backfill");
    }
    Ok(())
}

fn execute_configure_reset(json: bool) -> Result<()> {
    reset_embedding_settings()?;
    let message = "Embedding settings reset to defaults".to_string();
    if json {
        println!(
            "{}",
            serde_json::to_string(&ConfigureOutput {
                success: true,
                message,
            })?
        );
    } else {
        println!("{message}");
    }
    Ok(())
}

/// Mark requests pending so a later backfill re-embeds them.
fn execute_reset(
    id: Option<i64>,
    stale_model: bool,
    all: bool,
    db_path: Option<&PathBuf>,
    actor: &str,
    json: bool,
) -> Result<()> {
    let scope = match (id, stale_model, all) {
        (Some(id), _, _) => ResetScope::Item(id),
        (None, true, _) => ResetScope::StaleModel(resolve_embedding_config()?.model().to_string()),
        (None, false, true) => ResetScope::All,
        (None, false, false) => {
            return Err(Error::Validation(
                "Choose what to reset: --id <ID>, --stale-model or --all".into(),
            ));
        }
    };

    let mut storage = open_storage(db_path)?;
    let reset = storage.reset_embeddings(&scope, SystemClock.now(), actor)?;

    if json {
        println!("{}", serde_json::to_string(&ResetOutput { reset })?);
    } else {
        println!("Reset {reset} request(s) to pending.");
        if reset > 0 {
            println!("Run 'reqmatch embeddings backfill' to re-embed them.");
        }
    }
    Ok(())
}

/// Rebuild the legacy per-owner vectors.
fn execute_rebuild_owners(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let config = resolve_embedding_config()?;
    let provider = require_provider(&config)?;
    let mut storage = open_storage(db_path)?;
    let clock = SystemClock;

    let report: OwnerRebuildReport = runtime()?.block_on(rebuild_owner_embeddings(
        &mut storage,
        &provider,
        &clock,
        config.timeout,
    ))?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "Processed {} owners: {} updated, {} skipped, {} failed.",
            report.total, report.updated, report.skipped, report.failed
        );
    }

    if report.failed > 0 {
        Err(Error::BackfillIncomplete {
            failed: report.failed,
        })
    } else {
        Ok(())
    }
}
