//! Embedding providers.
//!
//! Turns request text into fixed-length vectors through one of:
//! - **OpenAI** (`/v1/embeddings`) - selected when `OPENAI_API_KEY` is set
//! - **Ollama** (local `/api/embed`)
//! - **Mock** - scripted, in-process, for tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ intake / backfill /  │
//! │ embeddings commands  │
//! └──────────┬───────────┘
//!            │ embed_with_timeout()
//!            ▼
//! ┌─────────────────┐
//! │    Factory      │  ← env > config.json > defaults
//! └────────┬────────┘
//!     ┌────┴────┐
//!     ▼         ▼
//! ┌──────┐  ┌──────┐
//! │OpenAI│  │Ollama│
//! └──────┘  └──────┘
//! ```
//!
//! # Configuration
//!
//! Environment variables take precedence over `~/.reqmatch/config.json`:
//! - `REQMATCH_EMBEDDINGS_ENABLED` - Enable/disable embeddings (default: `true`)
//! - `REQMATCH_EMBEDDING_PROVIDER` - `openai` or `ollama`
//! - `OPENAI_API_KEY`, `OPENAI_EMBEDDING_MODEL`, `OPENAI_ENDPOINT`
//! - `OLLAMA_ENDPOINT`, `OLLAMA_MODEL`
//! - `REQMATCH_EMBEDDING_DIMENSIONS` - Override the model's vector length
//! - `REQMATCH_EMBED_TIMEOUT_SECS` - Bound on a single `embed()` call (default: 30)

pub mod config;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

pub use config::{
    get_embedding_settings, reset_embedding_settings, resolve_embedding_config,
    save_embedding_settings, ResolvedEmbeddingConfig,
};
pub use factory::{build_provider, create_embedding_provider, detect_available_providers, ProviderDetection};
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{check_vector, embed_with_timeout, BoxedProvider, EmbedResult, EmbeddingProvider};
pub use types::{EmbeddingProviderType, EmbeddingSettings, ModelConfig, ProviderInfo};
