use serde::Serialize;

/// Guards the denominator when an input was not properly unit-normalized.
const SIMILARITY_EPSILON: f32 = 1e-8;

/// Outcome of comparing a probe signature against a stored one. The raw
/// score is always carried alongside the decision so callers can observe
/// near-miss attempts.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MatchDecision {
    pub similarity: f32,
    pub authenticated: bool,
}

/// Cosine similarity between two signatures.
///
/// Stored signatures are unit length, so this is effectively the dot
/// product; the norms are still divided out in case an input drifted.
/// Mismatched dimensionality scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    dot / (norm_a * norm_b + SIMILARITY_EPSILON)
}

/// Score two signatures and apply the accept threshold.
pub fn decide(probe: &[f32], stored: &[f32], threshold: f32) -> MatchDecision {
    let similarity = cosine_similarity(probe, stored);
    MatchDecision {
        similarity,
        authenticated: similarity >= threshold,
    }
}
