//! Embedding configuration management.
//!
//! Resolves the active embedding setup from environment variables, the
//! `embeddings` section of `~/.reqmatch/config.json`, and defaults, in
//! that order.

use std::time::Duration;

use crate::config::{load_config, parse_env_bool, save_config};
use crate::error::{Error, Result};

use super::types::{
    ollama_models, openai_models, EmbeddingProviderType, EmbeddingSettings,
};

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fully resolved embedding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEmbeddingConfig {
    pub enabled: bool,
    pub provider: EmbeddingProviderType,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_endpoint: String,
    pub ollama_endpoint: String,
    pub ollama_model: String,
    /// Explicit `D` override
    pub dimensions_override: Option<usize>,
    pub timeout: Duration,
}

impl ResolvedEmbeddingConfig {
    /// Resolve from file settings and an environment lookup.
    ///
    /// Empty environment values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown provider name or a
    /// non-numeric dimension/timeout value.
    pub fn resolve_with<F>(settings: &EmbeddingSettings, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let enabled = var("REQMATCH_EMBEDDINGS_ENABLED")
            .map_or_else(|| settings.enabled.unwrap_or(true), |v| parse_env_bool(&v));

        let openai_api_key = var("OPENAI_API_KEY").or_else(|| settings.OPENAI_API_KEY.clone());

        let provider = match var("REQMATCH_EMBEDDING_PROVIDER") {
            Some(name) => name.parse::<EmbeddingProviderType>().map_err(Error::Config)?,
            None => settings.provider.unwrap_or(if openai_api_key.is_some() {
                EmbeddingProviderType::Openai
            } else {
                EmbeddingProviderType::Ollama
            }),
        };

        let dimensions_override = match var("REQMATCH_EMBEDDING_DIMENSIONS") {
            Some(v) => Some(parse_positive("REQMATCH_EMBEDDING_DIMENSIONS", &v)?),
            None => settings.dimensions,
        };
        if dimensions_override == Some(0) {
            return Err(Error::Config("embedding dimensions must be positive".into()));
        }

        let timeout_secs = match var("REQMATCH_EMBED_TIMEOUT_SECS") {
            Some(v) => parse_positive("REQMATCH_EMBED_TIMEOUT_SECS", &v)?,
            None => settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            enabled,
            provider,
            openai_api_key,
            openai_model: var("OPENAI_EMBEDDING_MODEL")
                .or_else(|| settings.OPENAI_EMBEDDING_MODEL.clone())
                .unwrap_or_else(|| openai_models::DEFAULT_MODEL.to_string()),
            openai_endpoint: var("OPENAI_ENDPOINT")
                .or_else(|| settings.OPENAI_ENDPOINT.clone())
                .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string()),
            ollama_endpoint: var("OLLAMA_ENDPOINT")
                .or_else(|| settings.OLLAMA_ENDPOINT.clone())
                .unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.to_string()),
            ollama_model: var("OLLAMA_MODEL")
                .or_else(|| settings.OLLAMA_MODEL.clone())
                .unwrap_or_else(|| ollama_models::DEFAULT_MODEL.to_string()),
            dimensions_override,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    /// Model of the active provider.
    #[must_use]
    pub fn model(&self) -> &str {
        match self.provider {
            EmbeddingProviderType::Openai => &self.openai_model,
            EmbeddingProviderType::Ollama => &self.ollama_model,
        }
    }

    /// Configured `D` for the active model.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions_override.unwrap_or_else(|| match self.provider {
            EmbeddingProviderType::Openai => openai_models::get_config(&self.openai_model).dimensions,
            EmbeddingProviderType::Ollama => ollama_models::get_config(&self.ollama_model).dimensions,
        })
    }
}

fn parse_positive<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a positive integer, got '{value}'")))
}

/// Get embedding settings from the config file.
///
/// # Errors
///
/// Returns [`Error::Config`] if the config file is unreadable.
pub fn get_embedding_settings() -> Result<Option<EmbeddingSettings>> {
    Ok(load_config()?.embeddings)
}

/// Save embedding settings (merges with existing config).
///
/// # Errors
///
/// Returns [`Error::Config`] if the config file cannot be read or written.
pub fn save_embedding_settings(settings: &EmbeddingSettings) -> Result<()> {
    let mut config = load_config()?;
    let existing = config.embeddings.take().unwrap_or_default();
    config.embeddings = Some(settings.merged_over(existing));
    save_config(&config)
}

/// Reset embedding settings (removes them from the config file).
///
/// # Errors
///
/// Returns [`Error::Config`] if the config file cannot be read or written.
pub fn reset_embedding_settings() -> Result<()> {
    let mut config = load_config()?;
    config.embeddings = None;
    save_config(&config)
}

/// Resolve the embedding configuration from the process environment and
/// the config file.
///
/// # Errors
///
/// Returns [`Error::Config`] on unreadable config or invalid values.
pub fn resolve_embedding_config() -> Result<ResolvedEmbeddingConfig> {
    let settings = get_embedding_settings()?.unwrap_or_default();
    ResolvedEmbeddingConfig::resolve_with(&settings, |key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(settings: &EmbeddingSettings, env: &[(&str, &str)]) -> Result<ResolvedEmbeddingConfig> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ResolvedEmbeddingConfig::resolve_with(settings, |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_key_use_ollama() {
        let config = resolve(&EmbeddingSettings::default(), &[]).unwrap();
        assert!(config.enabled);
        assert_eq!(config.provider, EmbeddingProviderType::Ollama);
        assert_eq!(config.model(), "nomic-embed-text");
        assert_eq!(config.dimensions(), 768);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_api_key_selects_openai() {
        let config = resolve(&EmbeddingSettings::default(), &[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.provider, EmbeddingProviderType::Openai);
        assert_eq!(config.model(), "text-embedding-3-large");
        assert_eq!(config.dimensions(), 3072);
        assert_eq!(config.openai_endpoint, DEFAULT_OPENAI_ENDPOINT);
    }

    #[test]
    fn test_env_overrides_file() {
        let settings = EmbeddingSettings {
            enabled: Some(true),
            provider: Some(EmbeddingProviderType::Openai),
            OPENAI_EMBEDDING_MODEL: Some("text-embedding-3-small".into()),
            ..Default::default()
        };
        let config = resolve(
            &settings,
            &[
                ("REQMATCH_EMBEDDINGS_ENABLED", "false"),
                ("REQMATCH_EMBEDDING_DIMENSIONS", "256"),
                ("REQMATCH_EMBED_TIMEOUT_SECS", "5"),
            ],
        )
        .unwrap();
        assert!(!config.enabled);
        assert_eq!(config.model(), "text-embedding-3-small");
        assert_eq!(config.dimensions(), 256);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = resolve(&EmbeddingSettings::default(), &[("OPENAI_API_KEY", "  ")]).unwrap();
        assert!(config.openai_api_key.is_none());
        assert_eq!(config.provider, EmbeddingProviderType::Ollama);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let settings = EmbeddingSettings::default();
        assert!(matches!(
            resolve(&settings, &[("REQMATCH_EMBEDDING_PROVIDER", "bert")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            resolve(&settings, &[("REQMATCH_EMBEDDING_DIMENSIONS", "lots")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            resolve(&settings, &[("REQMATCH_EMBEDDING_DIMENSIONS", "0")]),
            Err(Error::Config(_))
        ));
    }
}
