//! Plain vector math over `f32` slices. Every binary operation checks
//! dimensions and fails with [`Error::DimensionMismatch`] instead of
//! truncating or padding.

use persona_core::error::{Error, Result};

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::DimensionMismatch { expected: a.len(), actual: b.len() });
    }
    Ok(())
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit length in place. A zero vector is left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Normalized dot product, clamped to [-1, 1]. Zero when either side has
/// zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (na.sqrt() * nb.sqrt())).clamp(-1.0, 1.0))
}

/// Element-wise mean of `vectors`; the zero vector of length `dim` when empty.
pub fn mean(vectors: &[&[f32]], dim: usize) -> Result<Vec<f32>> {
    let mut sum = vec![0.0f32; dim];
    if vectors.is_empty() {
        return Ok(sum);
    }
    for v in vectors {
        check_dims(&sum, v)?;
        for (s, x) in sum.iter_mut().zip(v.iter()) {
            *s += x;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let n = vectors.len() as f32;
    for s in &mut sum {
        *s /= n;
    }
    Ok(sum)
}

/// `acc += weight * v`.
pub fn add_scaled(acc: &mut [f32], v: &[f32], weight: f32) -> Result<()> {
    check_dims(acc, v)?;
    for (a, x) in acc.iter_mut().zip(v) {
        *a += weight * x;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap().abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_with_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_dimensions_fail() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
        let mut acc = vec![0.0; 2];
        assert!(add_scaled(&mut acc, &[1.0], 1.0).is_err());
    }

    #[test]
    fn mean_of_empty_is_zero_vector() {
        assert_eq!(mean(&[], 3).unwrap(), vec![0.0, 0.0, 0.0]);
        let a: &[f32] = &[1.0, 3.0];
        let b: &[f32] = &[3.0, 5.0];
        assert_eq!(mean(&[a, b], 2).unwrap(), vec![2.0, 4.0]);
    }

    #[test]
    fn normalize_leaves_zero_untouched() {
        let mut z = vec![0.0; 4];
        normalize(&mut z);
        assert_eq!(z, vec![0.0; 4]);
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }
}
