//! Cosine similarity over embedding vectors.

use crate::types::VectorError;

/// Euclidean magnitude, accumulated in f64
pub fn magnitude<T: Copy + Into<f64>>(v: &[T]) -> f64 {
    v.iter()
        .map(|x| {
            let x: f64 = (*x).into();
            x * x
        })
        .sum::<f64>()
        .sqrt()
}

/// Cosine similarity `dot / (|a| * |b|)`.
///
/// Returns 0.0 when either side has zero magnitude and an error when the
/// dimensions differ. Stored post vectors are f32, profiles are f64; both
/// sides are widened before any arithmetic.
pub fn cosine_similarity<A, B>(a: &[A], b: &[B]) -> Result<f64, VectorError>
where
    A: Copy + Into<f64>,
    B: Copy + Into<f64>,
{
    if a.len() != b.len() {
        return Err(VectorError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y): (f64, f64) = ((*x).into(), (*y).into());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / denom)
}
