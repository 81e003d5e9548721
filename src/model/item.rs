//! Request model.
//!
//! A request is the unit being matched: free text from one owner, with an
//! optional category and location used to narrow candidates.

use serde::{Deserialize, Serialize};

use super::embedding::EmbeddingState;
use crate::error::{Error, Result};
use crate::validate;

/// Request status. Only active requests take part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Active,
    Inactive,
}

impl ItemStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional geographic data for narrowing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A stored request.
#[derive(Debug, Clone, Serialize)]
pub struct MatchableItem {
    /// Row id, assigned on insert
    pub id: i64,

    /// Submitting owner; requests of the same owner never match each other
    pub owner_id: i64,

    /// Source text for the embedding
    pub text: String,

    pub category: Option<String>,

    #[serde(flatten)]
    pub location: Location,

    pub status: ItemStatus,

    pub embedding: EmbeddingState,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl MatchableItem {
    /// Trimmed text, or `None` when there is nothing to embed.
    #[must_use]
    pub fn embeddable_text(&self) -> Option<&str> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Short single-line preview for listings.
    #[must_use]
    pub fn preview(&self) -> String {
        validate::text_preview(&self.text, validate::PREVIEW_CHARS)
    }
}

/// Raw, unvalidated input for creating a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItemInput {
    pub owner_id: i64,
    pub text: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Validated input for creating a request.
///
/// Can only be built through [`NewItem::parse`], so holding one means the
/// text is non-blank and every field is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    owner_id: i64,
    text: String,
    category: Option<String>,
    location: Location,
}

impl NewItem {
    /// Validate raw input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a non-positive owner id, blank or
    /// oversized text, or oversized optional fields.
    pub fn parse(input: NewItemInput) -> Result<Self> {
        if input.owner_id <= 0 {
            return Err(Error::Validation(format!(
                "owner id must be positive, got {}",
                input.owner_id
            )));
        }

        Ok(Self {
            owner_id: input.owner_id,
            text: validate::request_text(&input.text)?,
            category: validate::optional_field("category", input.category.as_deref())?
                .map(|c| c.to_lowercase()),
            location: Location {
                city: validate::optional_field("city", input.city.as_deref())?,
                country: validate::optional_field("country", input.country.as_deref())?,
            },
        })
    }

    #[must_use]
    pub const fn owner_id(&self) -> i64 {
        self.owner_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    #[must_use]
    pub const fn location(&self) -> &Location {
        &self.location
    }
}
