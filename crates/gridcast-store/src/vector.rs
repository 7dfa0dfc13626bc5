//! In-process vector similarity.
//!
//! Candidates are pre-filtered in SQL and scored here; an ANN index can be
//! introduced beneath the same retrieval contract without touching callers.

/// Cosine similarity between two vectors, in `[-1, 1]`.
///
/// Mismatched lengths or zero-norm inputs score `0.0` rather than erroring;
/// a memory with a degenerate embedding simply never ranks well.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot = x.mul_add(y, dot);
        norm_a = x.mul_add(x, norm_a);
        norm_b = y.mul_add(y, norm_b);
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    (dot / denominator).clamp(-1.0, 1.0)
}
