//! Embedding lifecycle state for a single item.
//!
//! The state owns the invariants that tie `status` to the presence of a
//! vector, model and error message:
//!
//! - `ready`   ⇒ vector present with exactly `D` components, model present
//! - `error`   ⇒ error message present
//! - `pending` ⇒ no vector
//!
//! Fields are private so every change goes through a transition. The
//! state has no side effects; persisting it is the caller's job.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProviderError, Result};

/// Embedding status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    #[default]
    Pending,
    Ready,
    Error,
}

impl EmbeddingStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Parse from the stored string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "ready" => Some(Self::Ready),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EmbeddingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying one embed attempt to a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Ready,
    Failed(String),
}

/// Per-item embedding lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingState {
    status: EmbeddingStatus,
    #[serde(skip)]
    vector: Option<Vec<f64>>,
    model: Option<String>,
    updated_at: Option<i64>,
    error: Option<String>,
}

const UNKNOWN_ERROR: &str = "unknown embedding error";

impl EmbeddingState {
    /// Initial state of a freshly submitted item.
    #[must_use]
    pub fn pending(now: i64) -> Self {
        Self {
            status: EmbeddingStatus::Pending,
            vector: None,
            model: None,
            updated_at: Some(now),
            error: None,
        }
    }

    /// Rebuild a state from stored columns.
    ///
    /// A stored `pending` row that still carries a vector (older versions
    /// wrote failures that way) is normalized by dropping the vector, and an
    /// `error` row without a message gets a placeholder one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if a `ready` row lacks its vector or model.
    pub fn restore(
        status: EmbeddingStatus,
        vector: Option<Vec<f64>>,
        model: Option<String>,
        updated_at: Option<i64>,
        error: Option<String>,
    ) -> Result<Self> {
        match status {
            EmbeddingStatus::Ready => {
                if vector.as_ref().is_none_or(Vec::is_empty) {
                    return Err(Error::Corrupt("ready embedding without a vector".into()));
                }
                if model.is_none() {
                    return Err(Error::Corrupt("ready embedding without a model".into()));
                }
                Ok(Self {
                    status,
                    vector,
                    model,
                    updated_at,
                    error: None,
                })
            }
            EmbeddingStatus::Error => Ok(Self {
                status,
                vector,
                model,
                updated_at,
                error: Some(non_empty_message(error.as_deref().unwrap_or_default())),
            }),
            EmbeddingStatus::Pending => Ok(Self {
                status,
                vector: None,
                model: None,
                updated_at,
                error: None,
            }),
        }
    }

    #[must_use]
    pub const fn status(&self) -> EmbeddingStatus {
        self.status
    }

    /// The stored vector, if any. May be a preserved vector in `error` state.
    #[must_use]
    pub fn vector(&self) -> Option<&[f64]> {
        self.vector.as_deref()
    }

    /// The vector only when the state is `ready`.
    #[must_use]
    pub fn ready_vector(&self) -> Option<&[f64]> {
        match self.status {
            EmbeddingStatus::Ready => self.vector.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    #[must_use]
    pub const fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.status, EmbeddingStatus::Ready)
    }

    /// True for `pending` and `error`: the item still needs an embedding.
    #[must_use]
    pub const fn is_retry_eligible(&self) -> bool {
        !self.is_ready()
    }

    /// Back to `pending`, clearing vector, model and error.
    pub fn mark_pending(&mut self, now: i64) {
        *self = Self::pending(now);
    }

    /// Record a successful embedding.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the vector does not have exactly
    /// `dimensions` finite components. The state is left unchanged.
    pub fn mark_ready(
        &mut self,
        vector: Vec<f64>,
        model: &str,
        now: i64,
        dimensions: usize,
    ) -> Result<()> {
        if dimensions == 0 || vector.len() != dimensions {
            return Err(Error::Validation(format!(
                "embedding has {} components, expected {dimensions}",
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::Validation("embedding contains non-finite values".into()));
        }
        if model.trim().is_empty() {
            return Err(Error::Validation("embedding model must not be empty".into()));
        }

        self.status = EmbeddingStatus::Ready;
        self.vector = Some(vector);
        self.model = Some(model.to_string());
        self.updated_at = Some(now);
        self.error = None;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// The last good vector (and the model that produced it) is preserved;
    /// when there is none, the attempted model is recorded instead.
    pub fn mark_error(&mut self, message: &str, model: &str, now: i64) {
        self.status = EmbeddingStatus::Error;
        self.error = Some(non_empty_message(message));
        self.updated_at = Some(now);
        if self.vector.is_none() {
            self.model = Some(model.to_string());
        }
    }

    /// Apply the result of one `embed()` call.
    ///
    /// A vector the lifecycle rejects (wrong length, non-finite) is recorded
    /// as a failure like any provider error.
    pub fn apply_attempt(
        &mut self,
        attempt: std::result::Result<Vec<f64>, ProviderError>,
        model: &str,
        now: i64,
        dimensions: usize,
    ) -> AttemptOutcome {
        let failure = match attempt {
            Ok(vector) => match self.mark_ready(vector, model, now, dimensions) {
                Ok(()) => return AttemptOutcome::Ready,
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };
        self.mark_error(&failure, model, now);
        AttemptOutcome::Failed(failure)
    }
}

fn non_empty_message(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        trimmed.to_string()
    }
}
