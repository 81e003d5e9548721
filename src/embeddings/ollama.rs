//! Ollama embedding provider.
//!
//! Uses a local Ollama server for embedding generation.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

use super::config::ResolvedEmbeddingConfig;
use super::provider::{check_vector, EmbedResult, EmbeddingProvider};
use super::types::{ollama_models, ProviderInfo};

/// Ollama embedding provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider.
    ///
    /// `dimensions` defaults to the model's known size.
    #[must_use]
    pub fn new(endpoint: String, model: String, dimensions: Option<usize>) -> Self {
        let dimensions = dimensions.unwrap_or_else(|| ollama_models::get_config(&model).dimensions);
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            dimensions,
        }
    }

    /// Create a provider from resolved configuration.
    #[must_use]
    pub fn from_config(config: &ResolvedEmbeddingConfig) -> Self {
        Self::new(
            config.ollama_endpoint.clone(),
            config.ollama_model.clone(),
            Some(config.dimensions()),
        )
    }
}

/// Ollama API response for listing models.
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

/// Ollama API request for embedding.
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Ollama API response for embedding.
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f64>>,
}

impl EmbeddingProvider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "ollama".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);

        let Ok(response) = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await
        else {
            return false;
        };

        if !response.status().is_success() {
            return false;
        }

        let Ok(data) = response.json::<OllamaTagsResponse>().await else {
            return false;
        };

        // Check if our model is pulled, with or without a tag
        data.models.is_some_and(|models| {
            models
                .iter()
                .any(|m| m.name == self.model || m.name.starts_with(&format!("{}:", self.model)))
        })
    }

    async fn embed(&self, text: &str) -> EmbedResult {
        let url = format!("{}/api/embed", self.endpoint);

        let request = OllamaEmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(format!("Failed to parse Ollama response: {e}")))?;

        let vector = data
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse {
                provider: "ollama".to_string(),
            })?;

        check_vector(vector, self.dimensions, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_defaults() {
        let provider = OllamaProvider::new(
            "http://localhost:11434/".to_string(),
            "nomic-embed-text".to_string(),
            None,
        );
        let info = provider.info();
        assert_eq!(info.name, "ollama");
        assert_eq!(info.dimensions, 768);
        assert_eq!(provider.endpoint, "http://localhost:11434");
    }

    #[test]
    fn test_ollama_provider_dimension_override() {
        let provider = OllamaProvider::new(
            "http://custom:11434".to_string(),
            "mxbai-embed-large".to_string(),
            Some(512),
        );
        assert_eq!(provider.info().dimensions, 512);
    }
}
