//! Vector similarity.

/// Cosine similarity between two vectors.
///
/// Returns `None` when the result is undefined: either vector has zero
/// norm, the lengths differ, or a vector is empty. Callers treat `None` as
/// a non-match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }
    let score = dot / denom;
    score.is_finite().then_some(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    #[test]
    fn test_self_similarity_is_one() {
        let v = [0.3, -1.2, 4.0, 0.01];
        let score = cosine_similarity(&v, &v).unwrap();
        assert!((score - 1.0).abs() < EPS, "got {}", score);
    }

    #[test]
    fn test_magnitude_independent() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < EPS);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]).unwrap() + 1.0).abs() < EPS);
    }

    #[test]
    fn test_zero_norm_is_undefined() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), None);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[0.0, 0.0]), None);
    }

    #[test]
    fn test_dimension_mismatch_is_undefined() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }

    #[test]
    fn test_identical_documents_score_identically() {
        let q = [0.2, 0.7, -0.1];
        let d = [0.5, 0.5, 0.5];
        let d_copy = d;
        assert_eq!(cosine_similarity(&q, &d), cosine_similarity(&q, &d_copy));
    }
}
