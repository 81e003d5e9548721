//! Boundary validation for request input and query parameters.
//!
//! Everything user-supplied passes through here before any side effect:
//! text and field normalization, match-limit clamping, and status names
//! with synonym resolution. Three-tier resolution for statuses: exact
//! match → synonym lookup → error with suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::model::ItemStatus;

/// Longest accepted request text, in characters.
pub const MAX_TEXT_CHARS: usize = 4_000;

/// Longest accepted short field (category, city, country, name).
pub const MAX_FIELD_CHARS: usize = 200;

/// Characters kept in a listing preview.
pub const PREVIEW_CHARS: usize = 120;

pub const DEFAULT_MATCH_LIMIT: usize = 20;
pub const MAX_MATCH_LIMIT: usize = 100;

// ── Status names ─────────────────────────────────────────────

pub static VALID_ITEM_STATUSES: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["active", "inactive"].into_iter().collect());

pub static ITEM_STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("open", "active"),
        ("live", "active"),
        ("enabled", "active"),
        ("closed", "inactive"),
        ("done", "inactive"),
        ("archived", "inactive"),
        ("disabled", "inactive"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a request status via exact match or synonym lookup.
///
/// Returns the status, or an error with the original input and an
/// optional suggestion.
pub fn normalize_item_status(input: &str) -> std::result::Result<ItemStatus, (String, Option<String>)> {
    let lower = input.trim().to_lowercase();

    let canonical = if VALID_ITEM_STATUSES.contains(lower.as_str()) {
        Some(lower.as_str())
    } else {
        ITEM_STATUS_SYNONYMS.get(lower.as_str()).copied()
    };

    if let Some(status) = canonical.and_then(ItemStatus::parse) {
        return Ok(status);
    }

    let suggestion = find_closest_match(&lower, &VALID_ITEM_STATUSES, &ITEM_STATUS_SYNONYMS);
    Err((input.to_string(), suggestion))
}

/// Like [`normalize_item_status`], folded into a validation error.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the closest valid status.
pub fn item_status(input: &str) -> Result<ItemStatus> {
    normalize_item_status(input).map_err(|(original, suggestion)| {
        let mut msg = format!("unknown request status '{original}'");
        if let Some(s) = suggestion {
            msg.push_str(&format!(" (did you mean '{s}'?)"));
        }
        Error::Validation(msg)
    })
}

// ── Text fields ──────────────────────────────────────────────

/// Trim and check request text.
///
/// # Errors
///
/// Returns [`Error::Validation`] for blank or oversized text.
pub fn request_text(input: &str) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("request text must not be empty".into()));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(Error::Validation(format!(
            "request text is {chars} characters, maximum is {MAX_TEXT_CHARS}"
        )));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional short field; blank becomes `None`.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the field is longer than
/// [`MAX_FIELD_CHARS`].
pub fn optional_field(name: &str, input: Option<&str>) -> Result<Option<String>> {
    let Some(trimmed) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_FIELD_CHARS {
        return Err(Error::Validation(format!(
            "{name} must be at most {MAX_FIELD_CHARS} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Collapse whitespace and cut to `max` characters, appending `…` when cut.
#[must_use]
pub fn text_preview(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let mut cut: String = collapsed.chars().take(max).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

// ── Limits ───────────────────────────────────────────────────

/// Clamp a requested match limit into `[1, MAX_MATCH_LIMIT]`.
#[must_use]
pub fn normalize_limit(requested: Option<i64>) -> usize {
    match requested {
        None => DEFAULT_MATCH_LIMIT,
        Some(n) if n < 1 => 1,
        Some(n) => usize::try_from(n).map_or(MAX_MATCH_LIMIT, |n| n.min(MAX_MATCH_LIMIT)),
    }
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 && best.is_none_or(|(_, d)| dist < d) {
            // For synonyms, show what it maps to
            best = Some((synonyms.get(v).copied().unwrap_or(v), dist));
        }
    }

    best.map(|(v, _)| v.to_string())
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
