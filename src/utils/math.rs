//! Math utility functions

/// Compute cosine similarity between two vectors.
///
/// Returns `dot(a, b) / (|a| * |b|)`, in [-1, 1]. Zero vectors and
/// mismatched lengths yield 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Element-wise decaying average: `(old + incoming) / 2`.
///
/// Weights recent updates more heavily than a true running mean. Length
/// mismatches resolve in favor of the incoming vector wholesale.
pub fn decaying_average(old: &[f32], incoming: &[f32]) -> Vec<f32> {
    if old.len() != incoming.len() {
        return incoming.to_vec();
    }
    old.iter()
        .zip(incoming.iter())
        .map(|(a, b)| (a + b) / 2.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_decaying_average() {
        let old = vec![1.0, 2.0, 3.0];
        let incoming = vec![3.0, 4.0, 5.0];
        assert_eq!(decaying_average(&old, &incoming), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_decaying_average_length_mismatch() {
        let old = vec![1.0];
        let incoming = vec![3.0, 4.0];
        assert_eq!(decaying_average(&old, &incoming), incoming);
    }
}
