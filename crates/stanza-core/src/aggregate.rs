//! Combines seed embeddings into one profile vector, and the cosine metric used to rank against it.
//!
//! The aggregate is the unweighted component-wise mean. It is not normalized: cosine
//! similarity is scale-invariant, so the centroid's magnitude doesn't matter downstream.

use thiserror::Error;

/// Centroid of `vectors`. Pure; no I/O.
///
/// Each component is accumulated in `f64` over its values in sorted order, so the result
/// is bit-for-bit independent of the order the vectors are given in.
pub fn aggregate<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Vec<f32>, AggregateError> {
    let first = vectors.first().ok_or(AggregateError::EmptyInput)?;
    let dim = first.as_ref().len();
    for (index, v) in vectors.iter().enumerate() {
        let actual = v.as_ref().len();
        if actual != dim {
            return Err(AggregateError::DimensionMismatch {
                index,
                expected: dim,
                actual,
            });
        }
    }

    let count = vectors.len() as f64;
    let mut column: Vec<f32> = Vec::with_capacity(vectors.len());
    let mut centroid = Vec::with_capacity(dim);
    for d in 0..dim {
        column.clear();
        column.extend(vectors.iter().map(|v| v.as_ref()[d]));
        column.sort_by(f32::total_cmp);
        let sum: f64 = column.iter().map(|&x| f64::from(x)).sum();
        centroid.push((sum / count) as f32);
    }
    Ok(centroid)
}

/// Cosine similarity in [-1, 1]. Returns 0.0 when either vector has zero magnitude
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0) as f32
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error("cannot aggregate an empty set of vectors")]
    EmptyInput,
    #[error("vector {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}
