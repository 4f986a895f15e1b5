//! Cosine similarity for embedding vectors.
//!
//! Scores are computed in a single fused pass (dot product and both squared
//! norms) using 4-lane `f64` SIMD accumulators from the `wide` crate, with a
//! scalar tail for dimensions that are not a multiple of four. Accumulating
//! in `f64` keeps the squared norm of any finite `f32` vector finite and
//! non-zero, so only a vector that really is all zeros takes the fallback.
//!
//! A zero-magnitude vector has no direction, so its cosine is undefined.
//! Instead of producing NaN, such pairs score [`MIN_SIMILARITY`], the lowest
//! value a cosine can take. Ranking therefore always sees finite scores.

use wide::f64x4;

use crate::error::{QuiverError, Result};

/// Score assigned when either vector has zero magnitude.
pub const MIN_SIMILARITY: f32 = -1.0;

/// Upper bound of the cosine range.
pub const MAX_SIMILARITY: f32 = 1.0;

const LANES: usize = 4;

/// Cosine similarity between `a` and `b`, in `[-1, 1]`.
///
/// Unequal lengths are a programming error: the collection's dimension
/// invariant guarantees equal lengths before scoring starts.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(QuiverError::invariant(format!(
            "similarity requires equal vector lengths, got {} and {}",
            a.len(),
            b.len()
        )));
    }

    let (dot, norm_a_sq, norm_b_sq) = fused_dot_and_norms(a, b);
    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return Ok(MIN_SIMILARITY);
    }

    let cosine = (dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt())) as f32;
    if !cosine.is_finite() {
        return Ok(MIN_SIMILARITY);
    }
    Ok(cosine.clamp(MIN_SIMILARITY, MAX_SIMILARITY))
}

/// Euclidean norm of `v`.
pub fn magnitude(v: &[f32]) -> f32 {
    fused_dot_and_norms(v, v).0.sqrt() as f32
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = magnitude(v);
    if norm > 0.0 {
        for value in v.iter_mut() {
            *value /= norm;
        }
    }
}

/// Whether every component is finite.
pub fn is_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn fused_dot_and_norms(a: &[f32], b: &[f32]) -> (f64, f64, f64) {
    let mut dot_acc = f64x4::splat(0.0);
    let mut a_acc = f64x4::splat(0.0);
    let mut b_acc = f64x4::splat(0.0);

    let a_chunks = a.chunks_exact(LANES);
    let b_chunks = b.chunks_exact(LANES);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();

    for (ca, cb) in a_chunks.zip(b_chunks) {
        let va = f64x4::new(load_lanes(ca));
        let vb = f64x4::new(load_lanes(cb));
        dot_acc = dot_acc + va * vb;
        a_acc = a_acc + va * va;
        b_acc = b_acc + vb * vb;
    }

    let mut dot = dot_acc.reduce_add();
    let mut norm_a = a_acc.reduce_add();
    let mut norm_b = b_acc.reduce_add();

    for (&x, &y) in a_tail.iter().zip(b_tail.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    (dot, norm_a, norm_b)
}

#[inline]
fn load_lanes(chunk: &[f32]) -> [f64; LANES] {
    let mut lanes = [0.0f64; LANES];
    for (lane, &value) in lanes.iter_mut().zip(chunk) {
        *lane = f64::from(value);
    }
    lanes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar_cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (na * nb)
    }

    #[test]
    fn test_identical_and_orthogonal() {
        let a = [1.0, 0.0, 0.0];
        let b = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
        let neg = [-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &neg).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_magnitude_independent() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_simd_path_matches_scalar() {
        let a: Vec<f32> = (0..37).map(|i| (i as f32 * 0.37).sin()).collect();
        let b: Vec<f32> = (0..37).map(|i| (i as f32 * 0.11).cos()).collect();
        let simd = cosine_similarity(&a, &b).unwrap();
        assert!((simd - scalar_cosine(&a, &b)).abs() < 1e-5);
    }

    #[test]
    fn test_zero_vector_scores_minimum() {
        let zero = [0.0; 16];
        let other = [1.0; 16];
        assert_eq!(cosine_similarity(&zero, &other).unwrap(), MIN_SIMILARITY);
        assert_eq!(cosine_similarity(&other, &zero).unwrap(), MIN_SIMILARITY);
        assert_eq!(cosine_similarity(&zero, &zero).unwrap(), MIN_SIMILARITY);
    }

    #[test]
    fn test_extreme_magnitudes_keep_direction() {
        let large = cosine_similarity(&[1e20, 1e20], &[2e20, 2e20]).unwrap();
        assert!((large - 1.0).abs() < 1e-6);

        let tiny = cosine_similarity(&[1e-23, 1e-23], &[1.0, 1.0]).unwrap();
        assert!((tiny - 1.0).abs() < 1e-6);

        let opposite = cosine_similarity(&[3e38; 9], &[-1e-40; 9]).unwrap();
        assert!((opposite + 1.0).abs() < 1e-6);
        assert!((magnitude(&[3e19, 4e19]) - 5e19).abs() / 5e19 < 1e-6);
    }

    #[test]
    fn test_unequal_lengths_is_invariant_violation() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, QuiverError::InvariantViolation(_)));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((magnitude(&v) - 1.0).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
