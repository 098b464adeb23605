//! Reciprocal Rank Fusion algorithm for combining search results

use crate::retrieval::ScoreMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Standard RRF smoothing constant
pub const DEFAULT_RRF_K: u32 = 60;

/// Bonus for a chunk ranked #1 in at least one list
pub const RANK_1_BONUS: f64 = 0.05;

/// Bonus for a chunk whose best rank is #2 or #3
pub const RANK_2_3_BONUS: f64 = 0.02;

/// Position of a chunk in one source's ordering (rank 0 = best)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub chunk_id: i64,
    pub rank: usize,
}

/// One ranked list and its importance in fusion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingList {
    pub entries: Vec<RankedEntry>,
    pub weight: f64,
}

impl RankingList {
    pub fn new(entries: Vec<RankedEntry>, weight: f64) -> Self {
        Self { entries, weight }
    }

    /// Rank a score map and attach a weight
    pub fn from_scores(scores: &ScoreMap, weight: f64) -> Self {
        Self::new(ranks_from_scores(scores), weight)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fused score for one chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RrfResult {
    pub chunk_id: i64,
    pub rrf_score: f64,
}

/// Convert a score map into rank-ordered entries.
///
/// Highest score gets rank 0. Equal scores are ordered by ascending chunk
/// id so rank assignment is reproducible across runs.
pub fn ranks_from_scores(scores: &ScoreMap) -> Vec<RankedEntry> {
    let mut sorted: Vec<(i64, f64)> = scores.iter().map(|(id, s)| (*id, *s)).collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(rank, (chunk_id, _))| RankedEntry { chunk_id, rank })
        .collect()
}

/// Apply weighted Reciprocal Rank Fusion across any number of ranked lists
///
/// RRF formula: score(id) = sum over all lists of: weight / (k + rank + 1)
///
/// After accumulation each chunk receives a top-rank bonus based on its best
/// rank in any list: +0.05 for rank 0, +0.02 for ranks 1-2.
///
/// # Returns
/// Fused results sorted by score descending. Equal scores keep the order in
/// which chunks were first seen across the input lists.
pub fn reciprocal_rank_fusion(rankings: &[RankingList], k: u32) -> Vec<RrfResult> {
    let k = f64::from(k);

    // Index into `accumulated`, preserving first-seen order
    let mut positions: HashMap<i64, usize> = HashMap::new();
    let mut accumulated: Vec<(i64, f64, usize)> = Vec::new();

    for ranking in rankings {
        for entry in &ranking.entries {
            let contribution = ranking.weight / (k + entry.rank as f64 + 1.0);

            match positions.get(&entry.chunk_id) {
                Some(&idx) => {
                    let slot = &mut accumulated[idx];
                    slot.1 += contribution;
                    slot.2 = slot.2.min(entry.rank);
                }
                None => {
                    positions.insert(entry.chunk_id, accumulated.len());
                    accumulated.push((entry.chunk_id, contribution, entry.rank));
                }
            }
        }
    }

    let mut results: Vec<RrfResult> = accumulated
        .into_iter()
        .map(|(chunk_id, base, best_rank)| RrfResult {
            chunk_id,
            rrf_score: base + top_rank_bonus(best_rank),
        })
        .collect();

    results.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score));

    results
}

fn top_rank_bonus(best_rank: usize) -> f64 {
    match best_rank {
        0 => RANK_1_BONUS,
        1 | 2 => RANK_2_3_BONUS,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn list(ids: &[i64], weight: f64) -> RankingList {
        RankingList::new(
            ids.iter()
                .enumerate()
                .map(|(rank, &chunk_id)| RankedEntry { chunk_id, rank })
                .collect(),
            weight,
        )
    }

    #[test]
    fn test_ranks_from_scores() {
        let scores: ScoreMap = [(10, 0.5), (20, 0.9), (30, 0.7)].into_iter().collect();

        let ranked = ranks_from_scores(&scores);

        assert_eq!(
            ranked,
            vec![
                RankedEntry { chunk_id: 20, rank: 0 },
                RankedEntry { chunk_id: 30, rank: 1 },
                RankedEntry { chunk_id: 10, rank: 2 },
            ]
        );
    }

    #[test]
    fn test_ranks_tie_break_by_id() {
        let scores: ScoreMap = [(9, 1.0), (3, 1.0), (5, 2.0)].into_iter().collect();
        let ids: Vec<i64> = ranks_from_scores(&scores)
            .iter()
            .map(|e| e.chunk_id)
            .collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn test_top_rank_bonus_exact() {
        let fused = reciprocal_rank_fusion(&[list(&[7], 1.0)], DEFAULT_RRF_K);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].rrf_score - (1.0 / 61.0 + 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_bonus_tiers() {
        let fused = reciprocal_rank_fusion(&[list(&[1, 2, 3, 4], 1.0)], 60);
        let score = |id: i64| fused.iter().find(|r| r.chunk_id == id).unwrap().rrf_score;

        assert!((score(1) - (1.0 / 61.0 + 0.05)).abs() < 1e-12);
        assert!((score(2) - (1.0 / 62.0 + 0.02)).abs() < 1e-12);
        assert!((score(3) - (1.0 / 63.0 + 0.02)).abs() < 1e-12);
        assert!((score(4) - 1.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn test_bonus_uses_best_rank_once() {
        // Chunk 1 is #1 in both lists; bonus applies once
        let fused = reciprocal_rank_fusion(&[list(&[1, 2], 1.0), list(&[1, 2], 1.0)], 60);
        assert!((fused[0].rrf_score - (2.0 / 61.0 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_weights_scale_contributions() {
        let fused = reciprocal_rank_fusion(&[list(&[1], 2.0), list(&[2], 1.0)], 60);

        assert_eq!(fused[0].chunk_id, 1);
        assert!((fused[0].rrf_score - (2.0 / 61.0 + 0.05)).abs() < 1e-12);
        assert!((fused[1].rrf_score - (1.0 / 61.0 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn test_consensus_wins() {
        // Doc 2 appears in both lists near the top
        let fused = reciprocal_rank_fusion(&[list(&[1, 2, 3], 1.0), list(&[2, 4, 1], 1.0)], 60);
        assert_eq!(fused[0].chunk_id, 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], 60).is_empty());
        assert!(reciprocal_rank_fusion(&[list(&[], 1.0)], 60).is_empty());
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let fused = reciprocal_rank_fusion(&[list(&[8], 1.0), list(&[4], 1.0)], 60);
        assert_eq!(fused[0].chunk_id, 8);
        assert_eq!(fused[1].chunk_id, 4);
    }

    proptest! {
        #[test]
        fn prop_shared_top_beats_lower_ranks(
            tail_a in prop::collection::hash_set(2i64..500, 0..30),
            tail_b in prop::collection::hash_set(2i64..500, 0..30),
            k in 1u32..200,
        ) {
            let mut a = vec![1i64];
            a.extend(tail_a);
            let mut b = vec![1i64];
            b.extend(tail_b);

            let fused = reciprocal_rank_fusion(&[list(&a, 1.0), list(&b, 1.0)], k);
            let top = fused.iter().find(|r| r.chunk_id == 1).unwrap().rrf_score;

            for r in &fused {
                prop_assert!(top >= r.rrf_score);
            }
        }

        #[test]
        fn prop_output_sorted_descending(
            lists in prop::collection::vec(
                (prop::collection::vec(0i64..50, 0..20), 0.5f64..3.0),
                0..5,
            ),
        ) {
            let rankings: Vec<RankingList> = lists
                .iter()
                .map(|(ids, w)| {
                    let mut seen = std::collections::HashSet::new();
                    let unique: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
                    list(&unique, *w)
                })
                .collect();

            let fused = reciprocal_rank_fusion(&rankings, DEFAULT_RRF_K);
            for pair in fused.windows(2) {
                prop_assert!(pair[0].rrf_score >= pair[1].rrf_score);
            }
        }
    }
}
