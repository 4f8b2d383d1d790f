//! Cosine-similarity ranking over embedding vectors.
//!
//! Brute-force linear scan; the candidate set is scored in-process and the
//! ranked indices map back to the caller's records.

use crate::types::{AppError, AppResult};

/// Cosine similarity between two vectors: `dot(a,b) / (‖a‖·‖b‖)`.
/// Fails if the vectors have different lengths. Zero-magnitude vectors
/// score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> AppResult<f32> {
    if a.len() != b.len() {
        return Err(AppError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denom)
}

/// Score every candidate against `query`, keep scores `>= threshold`,
/// sort descending, and truncate to `limit`. Returns `(index, score)`
/// pairs into the candidate slice; ties keep original candidate order
/// (stable sort).
pub fn rank_candidates(
    query: &[f32],
    candidates: &[Vec<f32>],
    limit: usize,
    threshold: f32,
) -> AppResult<Vec<(usize, f32)>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(query, candidate)?;
        if score >= threshold {
            scored.push((i, score));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}
