//! Cosine similarity primitives shared by the index and the query path.
//!
//! All functions work directly with slices.

/// Computes the dot product of two vectors
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    let mut sum = 0.0;
    for i in 0..a.len() {
        sum += a[i] * b[i];
    }
    sum
}

/// Computes the Euclidean norm of a vector
#[inline]
pub fn norm(a: &[f32]) -> f32 {
    dot_product(a, a).sqrt()
}

/// Computes the cosine similarity between two vectors
///
/// Returns 0.0 when either vector has zero magnitude.
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    let mag = (norm_a * norm_b).sqrt();
    if mag == 0.0 { 0.0 } else { dot / mag }
}

/// Computes the cosine distance (`1 - cosine`) between two vectors
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine(a, b)
}

/// Cosine similarity when both norms are already known.
#[inline]
pub(crate) fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    let mag = norm_a * norm_b;
    if mag == 0.0 {
        0.0
    } else {
        dot_product(a, b) / mag
    }
}
