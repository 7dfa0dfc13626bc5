//! Expert configuration: the data that *is* the personality.
//!
//! There are no expert subclasses. A single engine is parameterised by
//! [`ExpertConfig`]: analytical-focus weights shape the draft priors,
//! temporal parameters shape memory retrieval and learning rates, traits
//! feed the bounded personality-adjustment tables, and guardrail fields
//! cap stakes and external calls. Configs are immutable for the lifetime
//! of a run.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gridcast_types::{CategoryFamily, ExpertId, ToolBudget};

use crate::error::ExpertError;

/// Tolerance for the `similarity_weight + temporal_weight = 1` constraint.
pub const ALPHA_BETA_TOLERANCE: f64 = 1e-6;

/// Legal range for the early-season half-life stretch factor.
pub const EARLY_SEASON_FACTOR_RANGE: (f64, f64) = (1.25, 1.5);

/// Legal range for the late-season half-life compression factor.
pub const LATE_SEASON_FACTOR_RANGE: (f64, f64) = (0.75, 0.9);

/// Temporal parameters governing memory aging and learning-signal decay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalParams {
    /// Days until a memory's decay score reaches 0.5.
    pub half_life_days: f64,
    /// Weight on embedding similarity in the retrieval rank score.
    pub similarity_weight: f64,
    /// Weight on recency decay in the retrieval rank score.
    pub temporal_weight: f64,
    /// Per-family half-life overrides; falls back to `half_life_days`.
    #[serde(default)]
    pub category_half_life: BTreeMap<CategoryFamily, f64>,
    /// Half-life multiplier for weeks 1-4 (stretch: old evidence matters
    /// more while the season has little signal).
    #[serde(default = "default_early_season_factor")]
    pub early_season_factor: f64,
    /// Half-life multiplier for weeks 13+ (compress: the season's own
    /// evidence dominates).
    #[serde(default = "default_late_season_factor")]
    pub late_season_factor: f64,
}

const fn default_early_season_factor() -> f64 {
    1.3
}

const fn default_late_season_factor() -> f64 {
    0.85
}

/// Bounded trait dials feeding the personality-adjustment tables.
///
/// All traits are in `[0, 1]`; the adjustment functions in
/// [`shaping`](crate::shaping) turn them into multiplicative factors
/// clipped to `[0.5, 1.5]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTraits {
    /// Scales the confidence spread (0 = hug the floor, 1 = use the ceiling).
    pub risk_tolerance: f64,
    /// Flips polarity on `public_*` signals as it approaches 1.
    pub contrarianism: f64,
    /// Biases scoring categories upward as it approaches 1.
    pub optimism: f64,
    /// Weights evidence-driven factors over intuition-driven ones.
    pub analytics_trust: f64,
}

/// The full configuration of one expert personality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertConfig {
    /// Stable identifier (e.g. `conservative_analyzer`).
    pub expert_id: ExpertId,
    /// Human-facing name (e.g. "The Analyst").
    pub display_name: String,
    /// Personality tag (e.g. `conservative`).
    pub personality: String,
    /// Short self-description injected into prompts.
    pub voice: String,
    /// Factor-name to weight mapping; weights in `[0, 1]`, not required
    /// to sum to 1.
    pub analytical_focus: BTreeMap<String, f64>,
    /// Memory aging parameters.
    pub temporal: TemporalParams,
    /// `[lo, hi]` confidence bounds, a sub-interval of `[0, 1]`.
    pub confidence_range: [f64; 2],
    /// Trait dials for the adjustment tables.
    pub traits: PersonalityTraits,
    /// Maximum stake per assertion, in bankroll units.
    pub stake_cap: Decimal,
    /// Risk profile tag surfaced in guardrails.
    pub risk_profile: String,
    /// Expert-specific tool budget; falls back to the playbook budget.
    #[serde(default)]
    pub tool_budget: Option<ToolBudget>,
}

impl ExpertConfig {
    /// The effective tool budget given the playbook default.
    pub fn effective_tool_budget(&self, playbook_default: ToolBudget) -> ToolBudget {
        self.tool_budget.unwrap_or(playbook_default)
    }

    /// Validate every field against its documented constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ExpertError::ConfigInvalid`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ExpertError> {
        let fail = |field: &'static str, detail: String| {
            Err(ExpertError::ConfigInvalid {
                expert_id: self.expert_id.clone(),
                field,
                detail,
            })
        };

        if self.expert_id.as_str().is_empty() {
            return fail("expert_id", String::from("must not be empty"));
        }
        if !self.temporal.half_life_days.is_finite() || self.temporal.half_life_days <= 0.0 {
            return fail(
                "temporal.half_life_days",
                format!("{} must be positive", self.temporal.half_life_days),
            );
        }
        let alpha = self.temporal.similarity_weight;
        let beta = self.temporal.temporal_weight;
        if !(0.0..=1.0).contains(&alpha) {
            return fail(
                "temporal.similarity_weight",
                format!("{alpha} not in [0, 1]"),
            );
        }
        if !(0.0..=1.0).contains(&beta) {
            return fail("temporal.temporal_weight", format!("{beta} not in [0, 1]"));
        }
        if ((alpha + beta) - 1.0).abs() > ALPHA_BETA_TOLERANCE {
            return fail(
                "temporal.temporal_weight",
                format!("similarity_weight + temporal_weight = {} != 1", alpha + beta),
            );
        }
        for (family, half_life) in &self.temporal.category_half_life {
            if !half_life.is_finite() || *half_life <= 0.0 {
                return fail(
                    "temporal.category_half_life",
                    format!("{}: {half_life} must be positive", family.as_str()),
                );
            }
        }
        let (early_lo, early_hi) = EARLY_SEASON_FACTOR_RANGE;
        if !(early_lo..=early_hi).contains(&self.temporal.early_season_factor) {
            return fail(
                "temporal.early_season_factor",
                format!(
                    "{} not in [{early_lo}, {early_hi}]",
                    self.temporal.early_season_factor
                ),
            );
        }
        let (late_lo, late_hi) = LATE_SEASON_FACTOR_RANGE;
        if !(late_lo..=late_hi).contains(&self.temporal.late_season_factor) {
            return fail(
                "temporal.late_season_factor",
                format!(
                    "{} not in [{late_lo}, {late_hi}]",
                    self.temporal.late_season_factor
                ),
            );
        }
        for (factor, weight) in &self.analytical_focus {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return fail(
                    "analytical_focus",
                    format!("{factor}: {weight} not in [0, 1]"),
                );
            }
        }
        let [lo, hi] = self.confidence_range;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return fail(
                "confidence_range",
                format!("[{lo}, {hi}] is not a sub-interval of [0, 1]"),
            );
        }
        for (name, value) in [
            ("traits.risk_tolerance", self.traits.risk_tolerance),
            ("traits.contrarianism", self.traits.contrarianism),
            ("traits.optimism", self.traits.optimism),
            ("traits.analytics_trust", self.traits.analytics_trust),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                // Field names are static strings; match on the tuple entry.
                return Err(ExpertError::ConfigInvalid {
                    expert_id: self.expert_id.clone(),
                    field: name,
                    detail: format!("{value} not in [0, 1]"),
                });
            }
        }
        if self.stake_cap <= Decimal::ZERO {
            return fail("stake_cap", format!("{} must be positive", self.stake_cap));
        }
        if let Some(budget) = self.tool_budget
            && (budget.max_calls == 0 || budget.max_time_ms == 0)
        {
            return fail(
                "tool_budget",
                String::from("max_calls and max_time_ms must be positive"),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn valid_config() -> ExpertConfig {
        ExpertConfig {
            expert_id: ExpertId::new("conservative_analyzer"),
            display_name: String::from("The Analyst"),
            personality: String::from("conservative"),
            voice: String::from("Measured and evidence-first."),
            analytical_focus: BTreeMap::from([
                (String::from("fundamentals"), 0.9),
                (String::from("statistics"), 0.8),
            ]),
            temporal: TemporalParams {
                half_life_days: 180.0,
                similarity_weight: 0.7,
                temporal_weight: 0.3,
                category_half_life: BTreeMap::new(),
                early_season_factor: 1.3,
                late_season_factor: 0.85,
            },
            confidence_range: [0.55, 0.70],
            traits: PersonalityTraits {
                risk_tolerance: 0.2,
                contrarianism: 0.2,
                optimism: 0.5,
                analytics_trust: 0.9,
            },
            stake_cap: Decimal::new(25, 1),
            risk_profile: String::from("cautious"),
            tool_budget: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn alpha_beta_must_sum_to_one() {
        let mut config = valid_config();
        config.temporal.similarity_weight = 0.7;
        config.temporal.temporal_weight = 0.4;
        let err = config.validate();
        assert!(matches!(
            err,
            Err(ExpertError::ConfigInvalid {
                field: "temporal.temporal_weight",
                ..
            })
        ));
    }

    #[test]
    fn alpha_beta_tolerance_is_respected() {
        let mut config = valid_config();
        config.temporal.similarity_weight = 0.7;
        config.temporal.temporal_weight = 0.3 + 5e-7;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn half_life_must_be_positive() {
        let mut config = valid_config();
        config.temporal.half_life_days = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ExpertError::ConfigInvalid {
                field: "temporal.half_life_days",
                ..
            })
        ));
    }

    #[test]
    fn focus_weights_must_be_unit_bounded() {
        let mut config = valid_config();
        config
            .analytical_focus
            .insert(String::from("momentum"), 1.2);
        assert!(matches!(
            config.validate(),
            Err(ExpertError::ConfigInvalid {
                field: "analytical_focus",
                ..
            })
        ));
    }

    #[test]
    fn focus_weights_must_be_finite() {
        let mut config = valid_config();
        config
            .analytical_focus
            .insert(String::from("momentum"), f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn confidence_range_must_be_ordered() {
        let mut config = valid_config();
        config.confidence_range = [0.8, 0.6];
        assert!(matches!(
            config.validate(),
            Err(ExpertError::ConfigInvalid {
                field: "confidence_range",
                ..
            })
        ));
    }

    #[test]
    fn seasonal_factors_are_bounded() {
        let mut config = valid_config();
        config.temporal.early_season_factor = 2.0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.temporal.late_season_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn category_override_must_be_positive() {
        let mut config = valid_config();
        config
            .temporal
            .category_half_life
            .insert(CategoryFamily::Markets, -1.0);
        assert!(config.validate().is_err());
    }
}
