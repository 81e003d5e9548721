//! Embedding provider factory.
//!
//! Handles provider detection and creation.

use tracing::debug;

use crate::error::Result;

use super::config::{resolve_embedding_config, ResolvedEmbeddingConfig};
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::provider::{BoxedProvider, EmbeddingProvider};
use super::types::EmbeddingProviderType;

/// Available provider detection result.
#[derive(Debug, Clone)]
pub struct ProviderDetection {
    /// List of available provider names.
    pub available: Vec<String>,
    /// Recommended provider (first available).
    pub recommended: Option<String>,
}

/// Detect which embedding providers are available.
pub async fn detect_available_providers(config: &ResolvedEmbeddingConfig) -> ProviderDetection {
    let mut available = Vec::new();

    if let Some(openai) = OpenAiProvider::from_config(config) {
        if openai.is_available().await {
            available.push("openai".to_string());
        }
    }

    if OllamaProvider::from_config(config).is_available().await {
        available.push("ollama".to_string());
    }

    let recommended = available.first().cloned();

    ProviderDetection {
        available,
        recommended,
    }
}

/// Build the configured provider.
///
/// Returns `None` if embeddings are disabled or the selected provider
/// lacks required settings (an OpenAI key). Reachability is not checked;
/// an unreachable server shows up as a failed `embed()` and is recorded.
#[must_use]
pub fn build_provider(config: &ResolvedEmbeddingConfig) -> Option<BoxedProvider> {
    if !config.enabled {
        debug!("Embeddings disabled");
        return None;
    }

    match config.provider {
        EmbeddingProviderType::Openai => {
            let provider = OpenAiProvider::from_config(config);
            if provider.is_none() {
                debug!("OpenAI selected but OPENAI_API_KEY is not set");
            }
            provider.map(BoxedProvider::new)
        }
        EmbeddingProviderType::Ollama => Some(BoxedProvider::new(OllamaProvider::from_config(config))),
    }
}

/// Resolve configuration and build the provider.
///
/// # Errors
///
/// Returns a configuration error if settings cannot be resolved.
pub fn create_embedding_provider() -> Result<Option<BoxedProvider>> {
    Ok(build_provider(&resolve_embedding_config()?))
}
