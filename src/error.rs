//! Error types for reqmatch.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Provider failures have their own type, [`ProviderError`], because the
//! write path and the backfill convert them into persisted `error` state
//! instead of propagating them.

use thiserror::Error;

/// Result type alias for reqmatch operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,
    CorruptRecord,

    // Not Found (exit 3)
    ItemNotFound,
    OwnerNotFound,

    // Validation (exit 4)
    ValidationError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Embedding provider (exit 9)
    ProviderError,
    BackfillIncomplete,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CorruptRecord => "CORRUPT_RECORD",
            Self::ItemNotFound => "ITEM_NOT_FOUND",
            Self::OwnerNotFound => "OWNER_NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::BackfillIncomplete => "BACKFILL_INCOMPLETE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::CorruptRecord => 2,
            Self::ItemNotFound | Self::OwnerNotFound => 3,
            Self::ValidationError => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::ProviderError | Self::BackfillIncomplete => 9,
        }
    }

    /// Whether retrying the same command later may succeed.
    ///
    /// Provider failures are transient by nature; a backfill with failures
    /// can simply be run again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderError | Self::BackfillIncomplete | Self::DatabaseError
        )
    }
}

// ── Provider Error ────────────────────────────────────────────

/// Failure of a single `embed()` attempt.
///
/// Every variant is a normal, expected outcome of talking to a remote
/// model; callers record it as `error` state rather than aborting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("embedding request failed: {0}")]
    Transport(String),

    #[error("embedding provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding provider error: {message} (type: {kind}, code: {code}, request_id: {request_id})")]
    Api {
        message: String,
        kind: String,
        code: String,
        request_id: String,
    },

    #[error("failed to decode embedding response: {0}")]
    Decode(String),

    #[error("no embedding returned by {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding dimension mismatch: expected {expected} values for model {model} but received {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        model: String,
    },

    #[error("embedding request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in reqmatch operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Request not found: {id}")]
    ItemNotFound { id: i64 },

    #[error("Owner not found: {id}")]
    OwnerNotFound { id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Backfill finished with {failed} failed item(s)")]
    BackfillIncomplete { failed: usize },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound { .. } => ErrorCode::ItemNotFound,
            Self::OwnerNotFound { .. } => ErrorCode::OwnerNotFound,
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Provider(_) => ErrorCode::ProviderError,
            Self::BackfillIncomplete { .. } => ErrorCode::BackfillIncomplete,
            Self::Corrupt(_) => ErrorCode::CorruptRecord,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::ItemNotFound { .. } => {
                Some("Use `reqmatch request list --owner <id>` to see active requests.".to_string())
            }
            Self::OwnerNotFound { .. } => {
                Some("Register the owner first: reqmatch owner add \"name\"".to_string())
            }
            Self::Provider(ProviderError::Unavailable(_)) => Some(
                "Set OPENAI_API_KEY, or start Ollama and set REQMATCH_EMBEDDING_PROVIDER=ollama"
                    .to_string(),
            ),
            Self::Provider(ProviderError::DimensionMismatch { .. }) => Some(
                "Check REQMATCH_EMBEDDING_DIMENSIONS against the configured model".to_string(),
            ),
            Self::BackfillIncomplete { .. } => Some(
                "Failed items stay in `error` state; rerun `reqmatch embeddings backfill` to retry them."
                    .to_string(),
            ),
            Self::Config(msg) if msg.contains("from-id") => {
                Some("Pass --from-id <= --to-id, or omit one of them.".to_string())
            }
            _ => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_exit_codes() {
        assert_eq!(Error::Validation("x".into()).exit_code(), 4);
        assert_eq!(Error::ItemNotFound { id: 1 }.exit_code(), 3);
        assert_eq!(Error::OwnerNotFound { id: 1 }.exit_code(), 3);
        assert_eq!(Error::Config("x".into()).exit_code(), 7);
        assert_eq!(
            Error::Provider(ProviderError::Timeout { seconds: 5 }).exit_code(),
            9
        );
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = ProviderError::DimensionMismatch {
            expected: 3072,
            actual: 1536,
            model: "text-embedding-3-large".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: expected 3072 values for model text-embedding-3-large but received 1536"
        );
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::Config("from-id must be less than or equal to to-id".into());
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "CONFIG_ERROR");
        assert_eq!(json["error"]["exit_code"], 7);
        assert!(json["error"]["hint"].is_string());
    }
}
