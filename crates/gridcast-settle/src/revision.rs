//! Belief revision: bounded factor-weight adjustment.
//!
//! Factors cited by a correct assertion (through its `why` memories)
//! gain weight multiplicatively by `1 + eta * decay(d, H)`; factors
//! behind an incorrect assertion lose by `1 - eta * decay(d, H)`.
//! Weights clip to `[0.5, 1.5]` after each update and totals are never
//! re-normalized.

use gridcast_experts::DecayEngine;
use gridcast_store::LearnedWeights;

/// Default learning step eta.
pub const ETA_DEFAULT: f64 = 0.05;

/// Apply one assertion's verdict to the factors it cited.
pub fn revise(
    weights: &mut LearnedWeights,
    cited_factors: &[String],
    correct: bool,
    engine: &DecayEngine,
    days_since_prediction: f64,
    eta: f64,
) {
    let step = engine.learning_rate(eta, days_since_prediction);
    let multiplier = if correct { 1.0 + step } else { 1.0 - step };
    for factor in cited_factors {
        weights.adjust(factor, multiplier);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gridcast_experts::TemporalParams;
    use gridcast_store::weights_store::{WEIGHT_CEIL, WEIGHT_FLOOR};

    use super::*;

    fn engine() -> DecayEngine {
        DecayEngine::new(TemporalParams {
            half_life_days: 45.0,
            similarity_weight: 0.4,
            temporal_weight: 0.6,
            category_half_life: BTreeMap::new(),
            early_season_factor: 1.3,
            late_season_factor: 0.85,
        })
    }

    fn factors(names: &[&str]) -> Vec<String> {
        names.iter().map(|&n| n.to_owned()).collect()
    }

    #[test]
    fn correct_assertion_raises_cited_factors() {
        let mut weights = LearnedWeights::default();
        revise(
            &mut weights,
            &factors(&["momentum", "weather"]),
            true,
            &engine(),
            0.0,
            ETA_DEFAULT,
        );
        assert!((weights.get("momentum") - 1.05).abs() < 1e-12);
        assert!((weights.get("weather") - 1.05).abs() < 1e-12);
        assert!((weights.get("fundamentals") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn incorrect_assertion_lowers_cited_factors() {
        let mut weights = LearnedWeights::default();
        revise(
            &mut weights,
            &factors(&["momentum"]),
            false,
            &engine(),
            0.0,
            ETA_DEFAULT,
        );
        assert!((weights.get("momentum") - 0.95).abs() < 1e-12);
    }

    #[test]
    fn stale_settlement_moves_less() {
        let mut prompt = LearnedWeights::default();
        let mut stale = LearnedWeights::default();
        revise(&mut prompt, &factors(&["momentum"]), true, &engine(), 0.0, ETA_DEFAULT);
        revise(&mut stale, &factors(&["momentum"]), true, &engine(), 90.0, ETA_DEFAULT);
        assert!(prompt.get("momentum") > stale.get("momentum"));
        assert!(stale.get("momentum") > 1.0);
    }

    #[test]
    fn repeated_wins_clip_at_the_ceiling() {
        let mut weights = LearnedWeights::default();
        for _ in 0..100 {
            revise(&mut weights, &factors(&["momentum"]), true, &engine(), 0.0, ETA_DEFAULT);
        }
        assert!((weights.get("momentum") - WEIGHT_CEIL).abs() < 1e-12);
    }

    #[test]
    fn repeated_losses_clip_at_the_floor() {
        let mut weights = LearnedWeights::default();
        for _ in 0..100 {
            revise(&mut weights, &factors(&["momentum"]), false, &engine(), 0.0, ETA_DEFAULT);
        }
        assert!((weights.get("momentum") - WEIGHT_FLOOR).abs() < 1e-12);
    }
}
