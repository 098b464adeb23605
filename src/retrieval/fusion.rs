//! Linear weighted fusion of lexical and vector scores

use crate::retrieval::{RankedResult, ScoreMap};
use std::collections::BTreeSet;

/// Fuse lexical and vector score maps with per-query max normalization
///
/// finalScore(id) = lex_weight * lex(id) / max(lex) + vec_weight * vec(id) / max(vec)
///
/// A missing map, a missing id, or a non-positive maximum contributes 0.
///
/// # Returns
/// Fused results sorted by final score descending. Equal scores keep
/// ascending chunk id order.
pub fn linear_fusion(
    lexical: Option<&ScoreMap>,
    vector: Option<&ScoreMap>,
    lex_weight: f64,
    vec_weight: f64,
) -> Vec<RankedResult> {
    let ids: BTreeSet<i64> = lexical
        .into_iter()
        .chain(vector)
        .flat_map(|scores| scores.keys().copied())
        .collect();

    if ids.is_empty() {
        return Vec::new();
    }

    let max_lex = max_score(lexical);
    let max_vec = max_score(vector);

    let mut results: Vec<RankedResult> = ids
        .into_iter()
        .map(|chunk_id| {
            let lex_norm = normalize(lexical, chunk_id, max_lex);
            let vec_norm = normalize(vector, chunk_id, max_vec);

            RankedResult {
                chunk_id,
                final_score: lex_weight * lex_norm + vec_weight * vec_norm,
                lex_norm,
                vec_norm,
                rrf_score: None,
                reranker_score: None,
            }
        })
        .collect();

    // Stable sort keeps id order among ties
    results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    results
}

fn max_score(scores: Option<&ScoreMap>) -> f64 {
    scores
        .filter(|s| !s.is_empty())
        .map(|s| s.values().copied().fold(f64::NEG_INFINITY, f64::max))
        .unwrap_or(1.0)
}

fn normalize(scores: Option<&ScoreMap>, chunk_id: i64, max: f64) -> f64 {
    let raw = scores
        .and_then(|s| s.get(&chunk_id))
        .copied()
        .unwrap_or(0.0);
    if max > 0.0 {
        raw / max
    } else {
        0.0
    }
}
