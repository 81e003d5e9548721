//! Embedding provider trait.
//!
//! Defines the interface that all embedding providers must implement.
//! `embed` returns a [`ProviderError`] for every expected failure; callers
//! record it instead of propagating it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::ProviderError;
use super::types::ProviderInfo;

/// Outcome of one embed call.
pub type EmbedResult = std::result::Result<Vec<f64>, ProviderError>;

/// Trait for embedding providers.
///
/// Implemented by the OpenAI, Ollama and mock providers.
pub trait EmbeddingProvider: Send + Sync {
    /// Get provider metadata.
    fn info(&self) -> ProviderInfo;

    /// Check if the provider is reachable and configured.
    fn is_available(&self) -> impl Future<Output = bool> + Send;

    /// Embed a single text into a vector of exactly `info().dimensions`
    /// components.
    fn embed(&self, text: &str) -> impl Future<Output = EmbedResult> + Send;
}

/// Run `embed` with an upper bound on its duration.
///
/// An elapsed deadline is reported as [`ProviderError::Timeout`].
pub async fn embed_with_timeout<P: EmbeddingProvider>(
    provider: &P,
    text: &str,
    timeout: Duration,
) -> EmbedResult {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout {
            seconds: timeout.as_secs().max(1),
        }),
    }
}

/// Check that a returned vector has the configured length and is finite.
///
/// # Errors
///
/// Returns [`ProviderError::DimensionMismatch`] on a length difference and
/// [`ProviderError::Decode`] for NaN or infinite components.
pub fn check_vector(vector: Vec<f64>, expected: usize, model: &str) -> EmbedResult {
    if vector.len() != expected {
        return Err(ProviderError::DimensionMismatch {
            expected,
            actual: vector.len(),
            model: model.to_string(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(ProviderError::Decode("embedding contains non-finite values".into()));
    }
    Ok(vector)
}

/// Boxed provider for dynamic dispatch.
///
/// Since the trait has async methods with `impl Future`, we need this wrapper
/// for runtime polymorphism.
pub struct BoxedProvider {
    inner: Box<dyn EmbeddingProviderBoxed + Send + Sync>,
}

/// Object-safe version of `EmbeddingProvider` for boxing.
pub trait EmbeddingProviderBoxed: Send + Sync {
    fn info(&self) -> ProviderInfo;
    fn is_available_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
    fn embed_boxed(&self, text: &str) -> Pin<Box<dyn Future<Output = EmbedResult> + Send + '_>>;
}

impl BoxedProvider {
    /// Create a new boxed provider.
    pub fn new<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        Self {
            inner: Box::new(BoxedProviderWrapper(provider)),
        }
    }
}

impl EmbeddingProvider for BoxedProvider {
    fn info(&self) -> ProviderInfo {
        self.inner.info()
    }

    fn is_available(&self) -> impl Future<Output = bool> + Send {
        self.inner.is_available_boxed()
    }

    fn embed(&self, text: &str) -> impl Future<Output = EmbedResult> + Send {
        self.inner.embed_boxed(text)
    }
}

/// Wrapper to implement `EmbeddingProviderBoxed` for any `EmbeddingProvider`.
struct BoxedProviderWrapper<P: EmbeddingProvider + 'static>(P);

impl<P: EmbeddingProvider + 'static> EmbeddingProviderBoxed for BoxedProviderWrapper<P> {
    fn info(&self) -> ProviderInfo {
        self.0.info()
    }

    fn is_available_boxed(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(self.0.is_available())
    }

    fn embed_boxed(&self, text: &str) -> Pin<Box<dyn Future<Output = EmbedResult> + Send + '_>> {
        // Own the text so the future only borrows `self`
        let text = text.to_string();
        Box::pin(async move { self.0.embed(&text).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockProvider;

    #[test]
    fn test_check_vector() {
        assert_eq!(check_vector(vec![1.0, 2.0], 2, "m"), Ok(vec![1.0, 2.0]));
        assert_eq!(
            check_vector(vec![1.0], 2, "m"),
            Err(ProviderError::DimensionMismatch {
                expected: 2,
                actual: 1,
                model: "m".into()
            })
        );
        assert!(matches!(
            check_vector(vec![f64::NAN, 1.0], 2, "m"),
            Err(ProviderError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_boxed_provider_delegates() {
        let mock = MockProvider::new(3).with_response("hello", vec![0.0, 1.0, 0.0]);
        let boxed = BoxedProvider::new(mock);

        assert_eq!(boxed.info().dimensions, 3);
        assert!(boxed.is_available().await);
        assert_eq!(boxed.embed("hello").await, Ok(vec![0.0, 1.0, 0.0]));
    }

    #[tokio::test]
    async fn test_embed_with_timeout_classifies_elapsed() {
        let slow = MockProvider::new(3).with_delay(Duration::from_millis(200));
        let result = embed_with_timeout(&slow, "anything", Duration::from_millis(10)).await;
        assert_eq!(result, Err(ProviderError::Timeout { seconds: 1 }));
    }
}
