//! Exponential temporal decay of memories and learning signals.
//!
//! The two core equations:
//!
//! ```text
//! decay(age_days, H)          = 0.5 ^ (age_days / H)
//! rank_score(sim, age)        = alpha * sim + beta * decay(age, H)
//! ```
//!
//! Half-lives are expert-specific, optionally overridden per category
//! family, and stretched or compressed at the edges of the season. The
//! same decay curve discounts learning rates for outcomes observed long
//! after the prediction they grade.

use gridcast_types::CategoryFamily;

use crate::config::{ExpertConfig, TemporalParams};

/// Last week of the early-season half-life stretch.
const EARLY_SEASON_LAST_WEEK: u8 = 4;

/// First week of the late-season half-life compression.
const LATE_SEASON_FIRST_WEEK: u8 = 13;

/// Exponential decay score for a memory of the given age.
///
/// `decay(0, H) = 1`, `decay(H, H) = 0.5`, strictly non-increasing in
/// `age_days`. Negative ages (clock skew) clip to zero; a non-positive
/// half-life yields zero, though configs are validated to exclude it.
pub fn decay(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 || !half_life_days.is_finite() {
        return 0.0;
    }
    let age = age_days.max(0.0);
    0.5_f64.powf(age / half_life_days)
}

/// Blended similarity + recency rank score.
///
/// Monotonic in `similarity` at fixed age and monotonic in recency at
/// fixed similarity, because `alpha` and `beta` are non-negative.
pub fn rank_score(
    similarity: f64,
    age_days: f64,
    alpha: f64,
    beta: f64,
    half_life_days: f64,
) -> f64 {
    alpha.mul_add(similarity, beta * decay(age_days, half_life_days))
}

/// The decay engine for one expert: resolves effective half-lives and
/// computes scores with the expert's `(alpha, beta, H)`.
#[derive(Debug, Clone)]
pub struct DecayEngine {
    temporal: TemporalParams,
}

impl DecayEngine {
    /// Build an engine from an expert's temporal parameters.
    pub fn new(temporal: TemporalParams) -> Self {
        Self { temporal }
    }

    /// Build an engine for the given expert config.
    pub fn for_expert(config: &ExpertConfig) -> Self {
        Self::new(config.temporal.clone())
    }

    /// The similarity weight alpha.
    pub const fn alpha(&self) -> f64 {
        self.temporal.similarity_weight
    }

    /// The recency weight beta.
    pub const fn beta(&self) -> f64 {
        self.temporal.temporal_weight
    }

    /// Effective half-life for a category family at a given season week.
    ///
    /// Resolution order: family override if declared, else the expert-level
    /// half-life; then the seasonal factor (weeks 1-4 stretch, weeks 13+
    /// compress, mid-season unchanged).
    pub fn effective_half_life(&self, family: Option<CategoryFamily>, week: u8) -> f64 {
        let base = family
            .and_then(|f| self.temporal.category_half_life.get(&f).copied())
            .unwrap_or(self.temporal.half_life_days);

        let factor = if week <= EARLY_SEASON_LAST_WEEK {
            self.temporal.early_season_factor
        } else if week >= LATE_SEASON_FIRST_WEEK {
            self.temporal.late_season_factor
        } else {
            1.0
        };

        base * factor
    }

    /// Decay score using the expert-level half-life (no family override,
    /// mid-season).
    pub fn decay(&self, age_days: f64) -> f64 {
        decay(age_days, self.temporal.half_life_days)
    }

    /// Rank a memory by blended similarity + recency.
    pub fn rank(&self, similarity: f64, age_days: f64) -> f64 {
        rank_score(
            similarity,
            age_days,
            self.alpha(),
            self.beta(),
            self.temporal.half_life_days,
        )
    }

    /// Effective learning rate for an outcome observed `days_elapsed` days
    /// after the prediction it grades: `lr_base * decay(d, H)`.
    pub fn learning_rate(&self, lr_base: f64, days_elapsed: f64) -> f64 {
        lr_base * self.decay(days_elapsed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn params(half_life: f64, alpha: f64, beta: f64) -> TemporalParams {
        TemporalParams {
            half_life_days: half_life,
            similarity_weight: alpha,
            temporal_weight: beta,
            category_half_life: BTreeMap::new(),
            early_season_factor: 1.3,
            late_season_factor: 0.85,
        }
    }

    #[test]
    fn decay_at_zero_age_is_one() {
        assert!((decay(0.0, 45.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn decay_at_half_life_is_half() {
        assert!((decay(45.0, 45.0) - 0.5).abs() < 1e-9);
        assert!((decay(730.0, 730.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn decay_is_monotone_non_increasing() {
        let half_life = 45.0;
        let mut previous = decay(0.0, half_life);
        for age in 1..400 {
            let current = decay(f64::from(age), half_life);
            assert!(current <= previous, "decay increased at age {age}");
            previous = current;
        }
    }

    #[test]
    fn negative_age_clips_to_zero() {
        assert!((decay(-10.0, 45.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rank_score_monotonic_in_similarity() {
        let low = rank_score(0.2, 30.0, 0.4, 0.6, 45.0);
        let high = rank_score(0.8, 30.0, 0.4, 0.6, 45.0);
        assert!(high > low);
    }

    #[test]
    fn rank_score_monotonic_in_recency() {
        let fresh = rank_score(0.8, 30.0, 0.4, 0.6, 45.0);
        let stale = rank_score(0.8, 180.0, 0.4, 0.6, 45.0);
        assert!(fresh > stale);
    }

    #[test]
    fn momentum_rider_reference_values() {
        // H=45, alpha=0.4, beta=0.6, sim=0.8.
        let at_30 = rank_score(0.8, 30.0, 0.4, 0.6, 45.0);
        let expected_30 = 0.4_f64.mul_add(0.8, 0.6 * 0.5_f64.powf(30.0 / 45.0));
        assert!((at_30 - expected_30).abs() < 1e-12);
        assert!((at_30 - 0.697).abs() < 0.01);

        let at_180 = rank_score(0.8, 180.0, 0.4, 0.6, 45.0);
        assert!((at_180 - 0.3575).abs() < 0.001);
        assert!(at_30 > at_180);
    }

    #[test]
    fn long_half_life_barely_separates_ages() {
        // A 730-day half-life keeps 30- and 180-day-old memories close.
        let at_30 = decay(30.0, 730.0);
        let at_180 = decay(180.0, 730.0);
        assert!((at_30 - 0.972).abs() < 0.01);
        assert!((at_180 - 0.842).abs() < 0.01);
    }

    #[test]
    fn family_override_takes_precedence() {
        let mut temporal = params(180.0, 0.7, 0.3);
        temporal
            .category_half_life
            .insert(CategoryFamily::Markets, 45.0);
        let engine = DecayEngine::new(temporal);

        let markets = engine.effective_half_life(Some(CategoryFamily::Markets), 8);
        let scores = engine.effective_half_life(Some(CategoryFamily::Scores), 8);
        assert!((markets - 45.0).abs() < 1e-9);
        assert!((scores - 180.0).abs() < 1e-9);
    }

    #[test]
    fn early_season_stretches_half_life() {
        let engine = DecayEngine::new(params(100.0, 0.5, 0.5));
        let week_2 = engine.effective_half_life(None, 2);
        assert!((week_2 - 130.0).abs() < 1e-9);
    }

    #[test]
    fn late_season_compresses_half_life() {
        let engine = DecayEngine::new(params(100.0, 0.5, 0.5));
        let week_15 = engine.effective_half_life(None, 15);
        assert!((week_15 - 85.0).abs() < 1e-9);
    }

    #[test]
    fn mid_season_is_unchanged() {
        let engine = DecayEngine::new(params(100.0, 0.5, 0.5));
        let week_8 = engine.effective_half_life(None, 8);
        assert!((week_8 - 100.0).abs() < 1e-9);
    }

    #[test]
    fn learning_rate_decays_with_settlement_lag() {
        let engine = DecayEngine::new(params(45.0, 0.4, 0.6));
        let prompt_settle = engine.learning_rate(0.1, 0.0);
        let late_settle = engine.learning_rate(0.1, 45.0);
        assert!((prompt_settle - 0.1).abs() < 1e-12);
        assert!((late_settle - 0.05).abs() < 1e-9);
    }
}
