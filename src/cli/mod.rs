//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::embeddings::EmbeddingProviderType;

pub mod commands;

/// reqmatch - match free-text requests by meaning
#[derive(Parser, Debug)]
#[command(name = "reqmatch", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.reqmatch/data/reqmatch.db)
    #[arg(long, global = true, env = "REQMATCH_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "REQMATCH_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Owner management
    Owner {
        #[command(subcommand)]
        command: OwnerCommands,
    },

    /// Request management
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },

    /// Find requests similar to a given one
    Matches {
        /// Source request ID
        id: i64,

        /// Maximum matches to return (1-100)
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Embedding management
    Embeddings {
        #[command(subcommand)]
        command: EmbeddingsCommands,
    },
}

// ============================================================================
// Owner Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum OwnerCommands {
    /// Register an owner
    Add {
        /// Display name
        name: String,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        country: Option<String>,
    },

    /// List owners
    List,

    /// Show an owner
    Show {
        /// Owner ID
        id: i64,
    },
}

// ============================================================================
// Request Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RequestCommands {
    /// Submit a request and embed it
    Create(CreateRequestArgs),

    /// Show a request with its embedding history
    Show {
        /// Request ID
        id: i64,
    },

    /// List an owner's requests, newest first
    List {
        /// Owner ID
        #[arg(long)]
        owner: i64,

        /// Status filter (active, inactive)
        #[arg(short, long, default_value = "active")]
        status: String,

        /// Maximum requests to return
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Requests to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Mark a request inactive
    Close {
        /// Request ID
        id: i64,
    },

    /// Delete a request and its vector
    Delete {
        /// Request ID
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct CreateRequestArgs {
    /// Request text
    pub text: String,

    /// Submitting owner ID
    #[arg(long)]
    pub owner: i64,

    /// Category (lowercased)
    #[arg(short, long)]
    pub category: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    #[arg(long)]
    pub country: Option<String>,
}

// ============================================================================
// Embeddings Commands
// ============================================================================

#[derive(Subcommand, Debug, Clone)]
pub enum EmbeddingsCommands {
    /// Show provider configuration and embedding counts
    Status,

    /// Embed a text once with the configured provider
    Test {
        /// Text to embed
        text: String,
    },

    /// Retry embeddings for requests that are not ready
    Backfill {
        /// Maximum requests to process
        #[arg(short, long)]
        limit: Option<usize>,

        /// First request ID (inclusive)
        #[arg(long)]
        from_id: Option<i64>,

        /// Last request ID (inclusive)
        #[arg(long)]
        to_id: Option<i64>,

        /// Requests fetched per batch
        #[arg(long, default_value = "200")]
        batch_size: usize,

        /// Embed and count without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Configure the embedding provider
    Configure {
        /// Provider (openai, ollama)
        #[arg(short, long)]
        provider: Option<EmbeddingProviderType>,

        /// Enable embeddings
        #[arg(long)]
        enable: bool,

        /// Disable embeddings
        #[arg(long, conflicts_with = "enable")]
        disable: bool,

        /// Model to use (provider-specific)
        #[arg(short, long)]
        model: Option<String>,

        /// API endpoint (for custom servers)
        #[arg(long)]
        endpoint: Option<String>,

        /// Override the model's vector length
        #[arg(long)]
        dimensions: Option<usize>,

        /// Bound on a single embed call, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Drop saved settings and return to defaults
        #[arg(long, conflicts_with_all = ["provider", "enable", "disable", "model", "endpoint", "dimensions", "timeout_secs"])]
        reset: bool,
    },

    /// Mark requests pending so the next backfill re-embeds them
    Reset {
        /// Only this request
        #[arg(long, conflicts_with_all = ["stale_model", "all"])]
        id: Option<i64>,

        /// Requests embedded with a model other than the configured one
        #[arg(long, conflicts_with = "all")]
        stale_model: bool,

        /// Every request
        #[arg(long)]
        all: bool,
    },

    /// Rebuild the legacy per-owner vectors
    RebuildOwners,
}
