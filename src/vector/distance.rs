//! Cosine distance.

/// Cosine distance `1 - cos(a, b)`, in `[0, 2]`.
///
/// A zero-magnitude operand has no direction; its distance is defined as
/// `1.0` (similarity 0) instead of NaN so ordering stays total.
///
/// Returns `None` when the operands differ in length.
#[must_use]
pub fn cosine_distance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(1.0);
    }

    Some(1.0 - dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// `similarity = 1 - distance`. Not clamped: opposite vectors yield -1.
#[must_use]
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 - distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthogonal_vectors() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(d, 1.0);
        assert_eq!(similarity_from_distance(d), 0.0);
    }

    #[test]
    fn test_identical_and_opposite() {
        let same = cosine_distance(&[0.3, 0.4], &[0.6, 0.8]).unwrap();
        assert!(same.abs() < 1e-12);

        let opposite = cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]).unwrap();
        assert_eq!(opposite, 2.0);
        assert_eq!(similarity_from_distance(opposite), -1.0);
    }

    #[test]
    fn test_zero_vector_and_length_mismatch() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), None);
    }
}
