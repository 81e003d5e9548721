//! Text codec for persisted vectors.
//!
//! SQLite has no native vector column, so vectors are stored as
//! `"[" + join(",", components) + "]"` with exactly 12 digits after the
//! decimal point per component. The empty vector is `"[]"`.

use crate::error::{Error, Result};

/// Digits after the decimal point for each component.
pub const DECIMAL_PLACES: usize = 12;

/// Serialize a vector into the bracketed 12-decimal grammar.
#[must_use]
pub fn format_vector(vector: &[f64]) -> String {
    let mut out = String::with_capacity(2 + vector.len() * (DECIMAL_PLACES + 4));
    out.push('[');
    for (i, value) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{value:.12}"));
    }
    out.push(']');
    out
}

/// Parse a vector from its bracketed text form.
///
/// Reading is lenient where writing is not: whitespace around the brackets
/// and components is tolerated, and a component may be any finite float
/// literal, including exponents and fewer than 12 decimals.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the brackets are missing or a component
/// is not a finite number.
pub fn parse_vector(text: &str) -> Result<Vec<f64>> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::Corrupt(format!("vector is not bracketed: {}", preview(trimmed))))?
        .trim();

    if inner.is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            let part = part.trim();
            match part.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(Error::Corrupt(format!("invalid vector component: {part:?}"))),
            }
        })
        .collect()
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}
