//! ============================================================================
//! Profile Vector Builder
//! ============================================================================
//! Folds weighted positive and negative example vectors into one unit-length
//! interest vector. Pure; the caller decides where the examples come from.
//! The profile stays in f64 so its magnitude is 1 to within 1e-9.
//! ============================================================================

use tracing::warn;

use super::similarity::magnitude;

/// An example vector with its contribution weight
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedVector {
    pub vector: Vec<f32>,
    pub weight: f64,
}

impl WeightedVector {
    pub fn new(vector: Vec<f32>, weight: f64) -> Self {
        Self { vector, weight }
    }
}

/// Build a profile: `sum(positive * w) - sum(negative * w)`, normalised.
///
/// The dimension is taken from the first vector seen (positives first).
/// Vectors of any other dimension are skipped with a warning. A zero-magnitude
/// sum is returned as-is; no input at all yields an empty vector.
pub fn build_profile(positive: &[WeightedVector], negative: &[WeightedVector]) -> Vec<f64> {
    let dim = match positive.iter().chain(negative.iter()).next() {
        Some(first) => first.vector.len(),
        None => return Vec::new(),
    };

    let mut sum = vec![0.0f64; dim];
    let signed = positive
        .iter()
        .map(|w| (w, 1.0))
        .chain(negative.iter().map(|w| (w, -1.0)));

    for (example, sign) in signed {
        if example.vector.len() != dim {
            warn!(
                "Skipping profile example with dimension {} (expected {})",
                example.vector.len(),
                dim
            );
            continue;
        }
        for (acc, v) in sum.iter_mut().zip(example.vector.iter()) {
            *acc += sign * example.weight * (*v as f64);
        }
    }

    let norm = sum.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return sum;
    }
    sum.into_iter().map(|x| x / norm).collect()
}

/// Profile from plain vectors, each a positive example of weight 1.0
pub fn build_profile_from_vectors(vectors: &[Vec<f32>]) -> Vec<f64> {
    let positive: Vec<WeightedVector> = vectors
        .iter()
        .map(|v| WeightedVector::new(v.clone(), 1.0))
        .collect();
    build_profile(&positive, &[])
}

/// A profile can rank posts only if it has a direction.
pub fn is_usable(profile: &[f64]) -> bool {
    !profile.is_empty() && magnitude(profile) > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_is_unit_length() {
        let positive = vec![
            WeightedVector::new(vec![1.0, 2.0, 3.0], 1.0),
            WeightedVector::new(vec![0.5, 0.0, 1.0], 1.0),
        ];
        let negative = vec![WeightedVector::new(vec![0.0, 1.0, 0.0], 2.5)];
        let profile = build_profile(&positive, &negative);
        assert_eq!(profile.len(), 3);
        assert!((magnitude(&profile) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_length_with_realistic_components() {
        let positive = vec![
            WeightedVector::new(vec![0.013, -0.271, 0.094, 0.552, -0.038, 0.117], 1.0),
            WeightedVector::new(vec![0.201, 0.044, -0.319, 0.078, 0.263, -0.091], 1.0),
        ];
        let negative = vec![WeightedVector::new(vec![-0.147, 0.336, 0.021, -0.205, 0.119, 0.482], 2.5)];
        let profile = build_profile(&positive, &negative);
        assert_eq!(profile.len(), 6);
        assert!((magnitude(&profile) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cancelling_examples_give_zero_vector() {
        let v = vec![0.2, 0.4];
        let profile = build_profile(
            &[WeightedVector::new(v.clone(), 1.0)],
            &[WeightedVector::new(v, 1.0)],
        );
        assert_eq!(profile, vec![0.0, 0.0]);
        assert!(!is_usable(&profile));
    }

    #[test]
    fn test_no_examples() {
        let profile = build_profile(&[], &[]);
        assert!(profile.is_empty());
        assert!(!is_usable(&profile));
        assert!(build_profile_from_vectors(&[]).is_empty());
    }

    #[test]
    fn test_mismatched_dimension_is_skipped() {
        let positive = vec![
            WeightedVector::new(vec![3.0, 4.0], 1.0),
            WeightedVector::new(vec![1.0, 1.0, 1.0], 1.0),
        ];
        let profile = build_profile(&positive, &[]);
        assert_eq!(profile.len(), 2);
        assert!((profile[0] - 0.6).abs() < 1e-9);
        assert!((profile[1] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_negative_only_points_away() {
        let profile = build_profile(&[], &[WeightedVector::new(vec![1.0, 0.0], 3.0)]);
        assert!((profile[0] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_vectors_uses_unit_weights() {
        let profile = build_profile_from_vectors(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!((profile[0] - profile[1]).abs() < 1e-12);
        assert!((magnitude(&profile) - 1.0).abs() < 1e-9);
    }
}
