//! Upper-confidence-bound scoring for candidate selection.
//!
//! Each candidate's score is its observed engagement rate plus an
//! exploration bonus that shrinks as the candidate accumulates exposures
//! and grows with the logarithm of total traffic across all candidates
//! ranked together. Ties are broken uniformly at random.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rotation_core::types::CandidateId;
use rotation_core::{RotationError, RotationResult};
use std::collections::HashMap;

/// UCB scorer with an injectable randomness source for tie-breaking.
///
/// Entropy-seeded in production; tests use [`Scorer::with_seed`] so the
/// tie-break is deterministic.
pub struct Scorer {
    rng: Mutex<SmallRng>,
}

impl Scorer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Compute the exploration-adjusted score for one candidate.
    ///
    /// `exposures` must be > 0 and `total_exposures` >= 1; both are
    /// guaranteed by the forced-exploration rule upstream, so a
    /// violation here is a logic bug, not bad input. `total_exposures`
    /// of exactly 1 is valid (`ln(1) = 0`, the bonus collapses to 0).
    pub fn score(&self, exposures: u64, engagements: u64, total_exposures: u64) -> f64 {
        debug_assert!(exposures > 0, "scored candidate has zero exposures");
        debug_assert!(total_exposures >= 1, "scoring with no recorded traffic");

        let engagement_rate = engagements as f64 / exposures as f64;
        let exploration_bonus =
            (2.0 * (total_exposures as f64).ln() / exposures as f64).sqrt();

        engagement_rate + exploration_bonus
    }

    /// Pick the highest-scoring candidate, choosing uniformly at random
    /// among exact floating-point ties (the common case being identical
    /// counters, e.g. equal exposures with zero engagements everywhere).
    pub fn pick_winner(&self, scores: &HashMap<CandidateId, f64>) -> RotationResult<CandidateId> {
        if scores.is_empty() {
            return Err(RotationError::EmptyCandidateSet);
        }

        let top_score = scores
            .values()
            .fold(f64::NEG_INFINITY, |max, &score| max.max(score));

        let tied: Vec<&CandidateId> = scores
            .iter()
            .filter(|(_, &score)| score == top_score)
            .map(|(candidate, _)| candidate)
            .collect();

        let index = self.rng.lock().gen_range(0..tied.len());
        Ok(tied[index].clone())
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scores_of(entries: &[(&str, f64)]) -> HashMap<CandidateId, f64> {
        entries
            .iter()
            .map(|(id, score)| (id.to_string(), *score))
            .collect()
    }

    #[test]
    fn test_score_value() {
        let scorer = Scorer::with_seed(7);
        let score = scorer.score(1000, 10, 10_000);

        assert!(score > 0.1457);
        assert!(score < 0.1458);
    }

    #[test]
    fn test_score_with_single_total_exposure() {
        let scorer = Scorer::with_seed(7);
        // ln(1) = 0: the bonus vanishes and only the rate remains.
        let score = scorer.score(1, 1, 1);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_pick_winner_only_from_tie_set() {
        let scorer = Scorer::with_seed(7);
        let scores = scores_of(&[
            ("item1", 0.11),
            ("item2", 0.2),
            ("item3", 0.2),
            ("item4", 0.16),
            ("item5", 0.14),
        ]);

        let mut picked = HashMap::new();
        for _ in 0..200 {
            let winner = scorer.pick_winner(&scores).unwrap();
            *picked.entry(winner).or_insert(0u32) += 1;
        }

        assert_eq!(picked.len(), 2);
        assert!(picked["item2"] > 0);
        assert!(picked["item3"] > 0);
    }

    #[test]
    fn test_pick_winner_empty() {
        let scorer = Scorer::with_seed(7);
        let result = scorer.pick_winner(&HashMap::new());

        assert!(matches!(result, Err(RotationError::EmptyCandidateSet)));
    }

    /// Run `rounds` sequential selections over pure counter maps,
    /// incrementing the winner's exposure count before the next round.
    fn run_rotation(
        exposures: &mut HashMap<CandidateId, u64>,
        engagements: &HashMap<CandidateId, u64>,
        rounds: usize,
    ) -> HashMap<CandidateId, u64> {
        let scorer = Scorer::with_seed(42);
        let mut selections: HashMap<CandidateId, u64> = HashMap::new();

        for _ in 0..rounds {
            let total: u64 = exposures.values().sum();
            let scores: HashMap<CandidateId, f64> = exposures
                .iter()
                .map(|(candidate, &views)| {
                    let clicks = engagements.get(candidate).copied().unwrap_or(0);
                    (candidate.clone(), scorer.score(views, clicks, total))
                })
                .collect();

            let winner = scorer.pick_winner(&scores).unwrap();
            *exposures.get_mut(&winner).unwrap() += 1;
            *selections.entry(winner).or_insert(0) += 1;
        }

        selections
    }

    #[test]
    fn test_unengaged_candidates_rotate_uniformly() {
        let mut exposures: HashMap<CandidateId, u64> = (1..=5)
            .map(|i| (format!("item{i}"), 5000u64))
            .collect();
        let engagements = HashMap::new();

        let selections = run_rotation(&mut exposures, &engagements, 10_000);

        for (candidate, count) in &selections {
            assert!(*count > 1900, "{candidate} selected only {count} times");
            assert!(*count < 2100, "{candidate} selected {count} times");
        }
    }

    #[test]
    fn test_engaged_candidate_dominates() {
        let mut exposures: HashMap<CandidateId, u64> = (1..=5)
            .map(|i| (format!("item{i}"), 5000u64))
            .collect();
        let engagements: HashMap<CandidateId, u64> =
            [("item3".to_string(), 1u64)].into_iter().collect();

        let selections = run_rotation(&mut exposures, &engagements, 10_000);

        let engaged = selections["item3"];
        for (candidate, count) in &selections {
            if candidate != "item3" {
                assert!(
                    *count < engaged,
                    "{candidate} ({count}) not below engaged candidate ({engaged})"
                );
            }
        }
    }
}
