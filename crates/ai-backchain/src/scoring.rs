//! Rule selection score.

use crate::config::ScoringWeights;

/// `trial/(t+1) + probability*p + cost*(1-c)`, plus the recursion bonus for
/// recursive rules. Fewer trials, likelier effects and cheaper rules score higher.
pub fn score(
    weights: &ScoringWeights,
    trials: u32,
    probability: f64,
    base_cost: f64,
    recursive: bool,
) -> f64 {
    let mut score = weights.trial_weight / (f64::from(trials) + 1.0)
        + weights.probability_weight * probability
        + weights.cost_weight * (1.0 - base_cost);
    if recursive {
        score += weights.recursion_bonus;
    }
    score
}

/// Order items by descending score. Equal scores keep their input order.
pub fn rank_by_score<T>(scored: Vec<(T, f64)>) -> Vec<T> {
    let mut scored = scored;
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().map(|(item, _)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn recursive_rule_outranks_cheap_rule() {
        let weights = ScoringWeights::default();
        let transitive = score(&weights, 0, 1.0, 0.0, true);
        let adjacent = score(&weights, 0, 0.7, 0.0, false);
        assert!((transitive - 1.5).abs() < 1e-9);
        assert!((adjacent - 0.895).abs() < 1e-9);
        assert_eq!(rank_by_score(vec![("adjacent", adjacent), ("transitive", transitive)]), vec!["transitive", "adjacent"]);
    }

    #[test]
    fn trials_decay_the_score() {
        let weights = ScoringWeights::default();
        assert!(score(&weights, 1, 0.9, 0.1, false) < score(&weights, 0, 0.9, 0.1, false));
    }

    proptest! {
        #[test]
        fn ranking_is_stable_for_ties(scores in proptest::collection::vec(0u8..4, 0..24)) {
            let items: Vec<(usize, f64)> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| (i, f64::from(*s)))
                .collect();
            let ranked = rank_by_score(items.clone());
            prop_assert_eq!(ranked.clone(), rank_by_score(items));
            for pair in ranked.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let (sa, sb) = (scores[a], scores[b]);
                prop_assert!(sa > sb || (sa == sb && a < b));
            }
        }

        #[test]
        fn score_is_monotonic_in_probability(
            trials in 0u32..16,
            p in 0.0f64..1.0,
            dp in 0.0f64..1.0,
            cost in 0.0f64..1.0,
        ) {
            let weights = ScoringWeights::default();
            let q = (p + dp).min(1.0);
            prop_assert!(score(&weights, trials, q, cost, false) >= score(&weights, trials, p, cost, false));
        }
    }
}
