//! Embedding types and configuration.
//!
//! Field names in [`EmbeddingSettings`] match the environment variables
//! they stand in for, so the config file reads like an `.env` file.

use serde::{Deserialize, Serialize};

/// Embedding provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    Openai,
    Ollama,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "ollama" => Ok(Self::Ollama),
            _ => Err(format!("Unknown embedding provider: {s} (expected openai or ollama)")),
        }
    }
}

/// Embedding settings stored in `~/.reqmatch/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct EmbeddingSettings {
    pub enabled: Option<bool>,
    pub provider: Option<EmbeddingProviderType>,
    pub OPENAI_API_KEY: Option<String>,
    pub OPENAI_EMBEDDING_MODEL: Option<String>,
    pub OPENAI_ENDPOINT: Option<String>,
    pub OLLAMA_ENDPOINT: Option<String>,
    pub OLLAMA_MODEL: Option<String>,
    /// Overrides the model's known dimension
    pub dimensions: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl EmbeddingSettings {
    /// Overlay `self` on `existing`: fields set here win.
    #[must_use]
    pub fn merged_over(&self, existing: Self) -> Self {
        Self {
            enabled: self.enabled.or(existing.enabled),
            provider: self.provider.or(existing.provider),
            OPENAI_API_KEY: self.OPENAI_API_KEY.clone().or(existing.OPENAI_API_KEY),
            OPENAI_EMBEDDING_MODEL: self
                .OPENAI_EMBEDDING_MODEL
                .clone()
                .or(existing.OPENAI_EMBEDDING_MODEL),
            OPENAI_ENDPOINT: self.OPENAI_ENDPOINT.clone().or(existing.OPENAI_ENDPOINT),
            OLLAMA_ENDPOINT: self.OLLAMA_ENDPOINT.clone().or(existing.OLLAMA_ENDPOINT),
            OLLAMA_MODEL: self.OLLAMA_MODEL.clone().or(existing.OLLAMA_MODEL),
            dimensions: self.dimensions.or(existing.dimensions),
            timeout_secs: self.timeout_secs.or(existing.timeout_secs),
        }
    }
}

/// Provider metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    /// Vector length `D` every successful embedding must have
    pub dimensions: usize,
}

/// Model configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub dimensions: usize,
}

/// OpenAI model configurations.
pub mod openai_models {
    use super::ModelConfig;

    pub const DEFAULT_MODEL: &str = "text-embedding-3-large";

    pub fn get_config(model: &str) -> ModelConfig {
        let dimensions = match model {
            "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
            // text-embedding-3-large and unknown models
            _ => 3072,
        };
        ModelConfig {
            name: model.to_string(),
            dimensions,
        }
    }
}

/// Ollama model configurations.
pub mod ollama_models {
    use super::ModelConfig;

    pub const DEFAULT_MODEL: &str = "nomic-embed-text";

    pub fn get_config(model: &str) -> ModelConfig {
        // Tags like "nomic-embed-text:latest" share the base model's size
        let base = model.split(':').next().unwrap_or(model);
        let dimensions = match base {
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            // nomic-embed-text and unknown models
            _ => 768,
        };
        ModelConfig {
            name: model.to_string(),
            dimensions,
        }
    }
}
