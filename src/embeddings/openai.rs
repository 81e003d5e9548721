//! OpenAI embedding provider.
//!
//! Calls `POST /v1/embeddings` with Bearer auth. Error objects in the body
//! are decoded into [`ProviderError::Api`] with the `x-request-id` header
//! attached, so failures recorded on items can be traced on the OpenAI side.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::ProviderError;

use super::config::ResolvedEmbeddingConfig;
use super::provider::{check_vector, EmbedResult, EmbeddingProvider};
use super::types::{openai_models, ProviderInfo};

/// Longest slice of a raw body kept in logs and error messages.
const MAX_BODY_CHARS: usize = 1000;

/// OpenAI embedding provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimensions: usize,
    /// Sent as the `dimensions` request field when it differs from the
    /// model's native size, so the API shortens the vector to match.
    requested_dimensions: Option<usize>,
}

impl OpenAiProvider {
    /// Create a provider from explicit values.
    ///
    /// `dimensions` defaults to the model's known size.
    #[must_use]
    pub fn new(api_key: String, model: String, endpoint: String, dimensions: Option<usize>) -> Self {
        let native = openai_models::get_config(&model).dimensions;
        let dimensions = dimensions.unwrap_or(native);
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            model,
            dimensions,
            requested_dimensions: (dimensions != native).then_some(dimensions),
        }
    }

    fn request_body<'a>(&'a self, text: &'a str) -> OpenAiEmbedRequest<'a> {
        OpenAiEmbedRequest {
            model: &self.model,
            input: text,
            dimensions: self.requested_dimensions,
        }
    }

    /// Create a provider from resolved configuration.
    ///
    /// Returns `None` if no API key is configured.
    #[must_use]
    pub fn from_config(config: &ResolvedEmbeddingConfig) -> Option<Self> {
        let api_key = config.openai_api_key.clone()?;
        Some(Self::new(
            api_key,
            config.openai_model.clone(),
            config.openai_endpoint.clone(),
            Some(config.dimensions()),
        ))
    }
}

/// OpenAI API request for embedding.
#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// OpenAI API response body. Either `data` or `error` is set.
#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    #[serde(default)]
    data: Vec<OpenAiEmbedding>,
    error: Option<OpenAiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<serde_json::Value>,
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_CHARS).collect()
}

/// Turn a raw response into a vector or a classified failure.
fn parse_response(
    status: u16,
    request_id: Option<&str>,
    body: &str,
    model: &str,
    dimensions: usize,
) -> EmbedResult {
    let request_id = request_id.unwrap_or("unknown");

    let data: OpenAiEmbedResponse = match serde_json::from_str(body) {
        Ok(data) => data,
        Err(e) => {
            error!(status, request_id, body = %truncate_body(body), "Failed to decode OpenAI embeddings response");
            if !(200..300).contains(&status) {
                return Err(ProviderError::Status {
                    status,
                    body: truncate_body(body),
                });
            }
            return Err(ProviderError::Decode(e.to_string()));
        }
    };

    if let Some(err) = data.error {
        let code = match err.code {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => "unknown".to_string(),
            Some(other) => other.to_string(),
        };
        let failure = ProviderError::Api {
            message: err.message.unwrap_or_else(|| "Unknown error".to_string()),
            kind: err.kind.unwrap_or_else(|| "unknown".to_string()),
            code,
            request_id: request_id.to_string(),
        };
        error!(status, request_id, error = %failure, "OpenAI embeddings request failed");
        return Err(failure);
    }

    if !(200..300).contains(&status) {
        return Err(ProviderError::Status {
            status,
            body: truncate_body(body),
        });
    }

    let Some(first) = data.data.into_iter().next() else {
        error!(status, request_id, "Unexpected OpenAI embeddings response structure");
        return Err(ProviderError::EmptyResponse {
            provider: "openai".to_string(),
        });
    };

    check_vector(first.embedding, dimensions, model)
}

impl EmbeddingProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        // A key is all we can check without spending quota
        let available = !self.api_key.trim().is_empty();
        async move { available }
    }

    fn embed(&self, text: &str) -> impl Future<Output = EmbedResult> + Send {
        let request = self.request_body(text);
        let pending = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        async move {
            let response = pending
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let request_id = response
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::Transport(e.to_string()))?;

            debug!(status, request_id = request_id.as_deref().unwrap_or("unknown"), "OpenAI embeddings response");
            parse_response(status, request_id.as_deref(), &body, &self.model, self.dimensions)
        }
    }
}
