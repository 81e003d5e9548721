//! Owner model.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::validate;

/// A registered submitter of requests.
#[derive(Debug, Clone, Serialize)]
pub struct Owner {
    pub id: i64,
    pub display_name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub created_at: i64,
}

impl Owner {
    /// Profile text used for the legacy owner-level vector when the owner
    /// has no active request.
    #[must_use]
    pub fn profile_text(&self) -> String {
        [
            Some(self.display_name.as_str()),
            self.city.as_deref(),
            self.country.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Validated input for registering an owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOwner {
    pub display_name: String,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl NewOwner {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the display name is blank or any
    /// field is too long.
    pub fn parse(display_name: &str, city: Option<&str>, country: Option<&str>) -> Result<Self> {
        let display_name = validate::optional_field("display name", Some(display_name))?
            .ok_or_else(|| Error::Validation("display name must not be empty".into()))?;
        Ok(Self {
            display_name,
            city: validate::optional_field("city", city)?,
            country: validate::optional_field("country", country)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_text_skips_missing_parts() {
        let owner = Owner {
            id: 1,
            display_name: "Ada".into(),
            city: None,
            country: Some("DE".into()),
            created_at: 0,
        };
        assert_eq!(owner.profile_text(), "Ada, DE");
    }

    #[test]
    fn test_new_owner_requires_name() {
        assert!(NewOwner::parse("  ", None, None).is_err());
        let owner = NewOwner::parse(" Ada ", Some("Berlin"), None).unwrap();
        assert_eq!(owner.display_name, "Ada");
        assert_eq!(owner.city.as_deref(), Some("Berlin"));
    }
}
