//! Strong signal detection over lexical scores
//!
//! When the top BM25 hit is decisively ahead of the runner-up, the deep
//! pipeline skips LLM query expansion.

use crate::retrieval::ScoreMap;
use serde::{Deserialize, Serialize};

/// Default normalized top-score threshold
pub const DEFAULT_MIN_SCORE: f64 = 0.85;

/// Default gap between the top two normalized scores
pub const DEFAULT_MIN_GAP: f64 = 0.15;

/// Detector output. Scores are max-normalized, so `top_score` is 1.0
/// whenever a positive maximum exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrongSignal {
    pub detected: bool,
    pub top_score: f64,
    pub gap: f64,
}

impl StrongSignal {
    fn none() -> Self {
        Self {
            detected: false,
            top_score: 0.0,
            gap: 0.0,
        }
    }
}

/// Decide whether the top lexical result is unambiguous.
///
/// With a single result the runner-up counts as 0, so the gap is 1.0.
pub fn detect_strong_signal(scores: &ScoreMap, min_score: f64, min_gap: f64) -> StrongSignal {
    let mut first = f64::NEG_INFINITY;
    let mut second: Option<f64> = None;

    for &score in scores.values() {
        if score > first {
            if first.is_finite() {
                second = Some(first);
            }
            first = score;
        } else if second.map_or(true, |s| score > s) {
            second = Some(score);
        }
    }

    if scores.is_empty() || first == 0.0 {
        return StrongSignal::none();
    }

    let top_score = 1.0;
    let second_score = second.map_or(0.0, |s| s / first);
    let gap = top_score - second_score;

    StrongSignal {
        detected: top_score >= min_score && gap >= min_gap,
        top_score,
        gap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(i64, f64)]) -> ScoreMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_clear_winner_detected() {
        let signal = detect_strong_signal(
            &scores(&[(1, 10.0), (2, 7.0)]),
            DEFAULT_MIN_SCORE,
            DEFAULT_MIN_GAP,
        );
        assert!(signal.detected);
        assert_eq!(signal.top_score, 1.0);
        assert!((signal.gap - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_close_race_not_detected() {
        let signal = detect_strong_signal(
            &scores(&[(1, 10.0), (2, 9.5)]),
            DEFAULT_MIN_SCORE,
            DEFAULT_MIN_GAP,
        );
        assert!(!signal.detected);
        assert!((signal.gap - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_single_result_always_detected() {
        let signal = detect_strong_signal(&scores(&[(4, 0.2)]), 1.0, 1.0);
        assert!(signal.detected);
        assert_eq!(signal.gap, 1.0);
    }

    #[test]
    fn test_empty_and_zero() {
        let empty = detect_strong_signal(&ScoreMap::new(), 0.0, 0.0);
        assert_eq!(empty, StrongSignal::none());

        let zero = detect_strong_signal(&scores(&[(1, 0.0), (2, 0.0)]), 0.0, 0.0);
        assert!(!zero.detected);
    }

    #[test]
    fn test_uses_top_two_regardless_of_order() {
        let signal = detect_strong_signal(
            &scores(&[(1, 3.0), (2, 10.0), (3, 1.0), (4, 9.0)]),
            DEFAULT_MIN_SCORE,
            DEFAULT_MIN_GAP,
        );
        assert!(!signal.detected);
        assert!((signal.gap - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_top_scores() {
        let signal = detect_strong_signal(&scores(&[(1, 5.0), (2, 5.0)]), 0.85, 0.15);
        assert!(!signal.detected);
        assert!(signal.gap.abs() < 1e-9);
    }
}
