//! Scripted in-process provider.
//!
//! Answers from a per-text script and records every call, so lifecycle,
//! intake and backfill behavior can be exercised without a network.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::error::ProviderError;

use super::provider::{check_vector, EmbedResult, EmbeddingProvider};
use super::types::ProviderInfo;

pub const MOCK_MODEL: &str = "mock-embedding";

/// Scripted embedding provider.
#[derive(Debug)]
pub struct MockProvider {
    model: String,
    dimensions: usize,
    available: bool,
    delay: Option<Duration>,
    responses: HashMap<String, EmbedResult>,
    fallback: EmbedResult,
    calls: Mutex<Vec<String>>,
}

impl MockProvider {
    /// New provider producing `dimensions`-long vectors. Unscripted texts fail.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: MOCK_MODEL.to_string(),
            dimensions,
            available: true,
            delay: None,
            responses: HashMap::new(),
            fallback: Err(ProviderError::Unavailable("no scripted response".into())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Return `vector` for `text`.
    #[must_use]
    pub fn with_response(mut self, text: &str, vector: Vec<f64>) -> Self {
        self.responses.insert(text.to_string(), Ok(vector));
        self
    }

    /// Fail with `error` for `text`.
    #[must_use]
    pub fn with_failure(mut self, text: &str, error: ProviderError) -> Self {
        self.responses.insert(text.to_string(), Err(error));
        self
    }

    /// Answer for texts that have no scripted response.
    #[must_use]
    pub fn with_fallback(mut self, result: EmbedResult) -> Self {
        self.fallback = result;
        self
    }

    /// Sleep before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report as unavailable from `is_available`.
    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Texts passed to `embed`, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl EmbeddingProvider for MockProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "mock".to_string(),
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        let available = self.available;
        async move { available }
    }

    fn embed(&self, text: &str) -> impl Future<Output = EmbedResult> + Send {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());

        let scripted = self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());
        let delay = self.delay;

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            check_vector(scripted?, self.dimensions, &self.model)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_and_calls() {
        let mock = MockProvider::new(2)
            .with_response("a", vec![1.0, 0.0])
            .with_failure("b", ProviderError::Transport("reset".into()));

        assert_eq!(mock.embed("a").await, Ok(vec![1.0, 0.0]));
        assert_eq!(mock.embed("b").await, Err(ProviderError::Transport("reset".into())));
        assert!(matches!(mock.embed("c").await, Err(ProviderError::Unavailable(_))));
        assert_eq!(mock.calls(), vec!["a", "b", "c"]);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_wrong_length_is_dimension_mismatch() {
        let mock = MockProvider::new(3).with_response("short", vec![1.0]);
        assert!(matches!(
            mock.embed("short").await,
            Err(ProviderError::DimensionMismatch { expected: 3, actual: 1, .. })
        ));
    }
}
