//! Position-aware blending of RRF rank and LLM relevance

use crate::config::BlendingWeights;
use crate::retrieval::{RankedResult, RrfResult};
use std::collections::HashMap;

/// Inputs at positions below this use the `top` weight
const TOP_BUCKET_END: usize = 3;

/// Inputs at positions below this (and not in the top bucket) use `mid`
const MID_BUCKET_END: usize = 10;

/// Blend RRF results with reranker scores.
///
/// `rrf_results` must be ordered by RRF score descending. For the item at
/// position `i` the RRF weight is `top` (i < 3), `mid` (i < 10) or `tail`;
/// the reranker gets the remainder:
///
/// final = w * rrf / max(rrf) + (1 - w) * reranker
///
/// Chunks the reranker did not score contribute 0 on the reranker side.
/// Output is re-sorted by final score descending.
pub fn position_aware_blend(
    rrf_results: &[RrfResult],
    reranker_scores: &HashMap<i64, f64>,
    weights: BlendingWeights,
) -> Vec<RankedResult> {
    let max_rrf = rrf_results
        .iter()
        .map(|r| r.rrf_score)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut blended: Vec<RankedResult> = rrf_results
        .iter()
        .enumerate()
        .map(|(index, r)| {
            let rrf_norm = if max_rrf > 0.0 {
                r.rrf_score / max_rrf
            } else {
                0.0
            };
            let reranker_score = reranker_scores.get(&r.chunk_id).copied();
            let rrf_weight = bucket_weight(index, weights);

            RankedResult {
                chunk_id: r.chunk_id,
                final_score: rrf_weight * rrf_norm
                    + (1.0 - rrf_weight) * reranker_score.unwrap_or(0.0),
                lex_norm: 0.0,
                vec_norm: 0.0,
                rrf_score: Some(r.rrf_score),
                reranker_score,
            }
        })
        .collect();

    blended.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    blended
}

/// RRF weight for a 0-based input position
pub(crate) fn bucket_weight(index: usize, weights: BlendingWeights) -> f64 {
    if index < TOP_BUCKET_END {
        weights.top
    } else if index < MID_BUCKET_END {
        weights.mid
    } else {
        weights.tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHTS: BlendingWeights = BlendingWeights {
        top: 0.75,
        mid: 0.60,
        tail: 0.40,
    };

    fn rrf(scores: &[f64]) -> Vec<RrfResult> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &rrf_score)| RrfResult {
                chunk_id: i as i64 + 1,
                rrf_score,
            })
            .collect()
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(bucket_weight(0, WEIGHTS), 0.75);
        assert_eq!(bucket_weight(2, WEIGHTS), 0.75);
        assert_eq!(bucket_weight(3, WEIGHTS), 0.60);
        assert_eq!(bucket_weight(9, WEIGHTS), 0.60);
        assert_eq!(bucket_weight(10, WEIGHTS), 0.40);
        assert_eq!(bucket_weight(11, WEIGHTS), 0.40);
    }

    #[test]
    fn test_blend_uses_bucket_weights() {
        // Equal RRF scores so rrf_norm is 1.0 everywhere and the reranker
        // score of 0 isolates the RRF weight in the final score.
        let input = rrf(&[0.5; 12]);
        let reranker: HashMap<i64, f64> = input.iter().map(|r| (r.chunk_id, 0.0)).collect();

        let blended = position_aware_blend(&input, &reranker, WEIGHTS);
        let score = |id: i64| blended.iter().find(|r| r.chunk_id == id).unwrap().final_score;

        // chunk id = index + 1
        assert!((score(3) - 0.75).abs() < 1e-12);
        assert!((score(4) - 0.60).abs() < 1e-12);
        assert!((score(10) - 0.60).abs() < 1e-12);
        assert!((score(11) - 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_reranker_can_reorder() {
        let input = rrf(&[0.10, 0.09, 0.08]);
        let reranker: HashMap<i64, f64> = [(1, 0.0), (2, 0.1), (3, 1.0)].into_iter().collect();

        let blended = position_aware_blend(&input, &reranker, WEIGHTS);

        // chunk 3: 0.75 * 0.8 + 0.25 * 1.0 = 0.85 beats chunk 1: 0.75
        assert_eq!(blended[0].chunk_id, 3);
        assert!((blended[0].final_score - 0.85).abs() < 1e-9);
        assert_eq!(blended[0].reranker_score, Some(1.0));
        assert_eq!(blended[0].rrf_score, Some(0.08));
    }

    #[test]
    fn test_unscored_chunk_gets_zero_reranker_part() {
        let input = rrf(&[0.2, 0.1]);
        let reranker: HashMap<i64, f64> = [(1, 0.5)].into_iter().collect();

        let blended = position_aware_blend(&input, &reranker, WEIGHTS);
        let second = blended.iter().find(|r| r.chunk_id == 2).unwrap();

        assert_eq!(second.reranker_score, None);
        assert!((second.final_score - 0.75 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert!(position_aware_blend(&[], &HashMap::new(), WEIGHTS).is_empty());
    }
}
