//! Personality-adjustment tables: pure functions from traits to bounded
//! multipliers.
//!
//! Every adjustment is a multiplicative factor in `[0.5, 1.5]`; composition
//! is multiplication followed by clipping back into that interval, and the
//! final value is clipped to the category's legal range by validation.
//!
//! | Trait | Adjusts | Mapping |
//! |---|---|---|
//! | `risk_tolerance` | confidence spread | `0.5 + risk_tolerance` |
//! | `contrarianism` | polarity of `public_*` signals | flips sign above 0.5, scaled by distance from 0.5 |
//! | `optimism` | scoring-category magnitudes | `0.9 + 0.2 * optimism` |
//! | `analytics_trust` | evidence vs intuition factor weight | evidence `0.5 + trust`, intuition `1.5 - trust` |

use crate::config::PersonalityTraits;

/// Lower bound of every adjustment multiplier.
pub const MULTIPLIER_FLOOR: f64 = 0.5;

/// Upper bound of every adjustment multiplier.
pub const MULTIPLIER_CEIL: f64 = 1.5;

/// Factor names whose signals derive from public sentiment; contrarian
/// experts invert these.
pub const PUBLIC_FACTORS: [&str; 2] = ["public_sentiment", "public_money"];

/// Factor names considered evidence-driven (weighted up by
/// `analytics_trust`).
pub const EVIDENCE_FACTORS: [&str; 5] = [
    "fundamentals",
    "statistics",
    "injuries",
    "weather",
    "market_signal",
];

/// Factor names considered intuition-driven (weighted down by
/// `analytics_trust`).
pub const INTUITION_FACTORS: [&str; 3] = ["intuition", "momentum", "narrative"];

/// Clip a composed multiplier back into the legal interval.
pub fn clip_multiplier(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEIL)
    } else {
        1.0
    }
}

/// Multiplier on the width of the confidence interval an expert uses.
///
/// A fully cautious expert (`risk_tolerance = 0`) halves its spread; a
/// fully aggressive one widens it by half.
pub fn confidence_spread_multiplier(traits: PersonalityTraits) -> f64 {
    clip_multiplier(MULTIPLIER_FLOOR + traits.risk_tolerance)
}

/// Signal polarity for a factor, accounting for contrarian inversion.
///
/// Non-public factors always keep polarity `1.0`. For `public_*` factors
/// the polarity scales linearly from `+1` (fully consensus-following) to
/// `-1` (fully contrarian), crossing zero at `contrarianism = 0.5`.
pub fn signal_polarity(traits: PersonalityTraits, factor: &str) -> f64 {
    if PUBLIC_FACTORS.contains(&factor) {
        (0.5 - traits.contrarianism) * 2.0
    } else {
        1.0
    }
}

/// Multiplier on scoring-category magnitudes (totals, points).
///
/// Optimists lean over; pessimists lean under. Deliberately narrow
/// (`[0.9, 1.1]`) so optimism nudges rather than dominates.
pub fn scoring_bias_multiplier(traits: PersonalityTraits) -> f64 {
    clip_multiplier(0.2_f64.mul_add(traits.optimism, 0.9))
}

/// Weight multiplier for a factor given the expert's analytics trust.
///
/// Evidence factors scale with trust, intuition factors against it, and
/// unclassified factors are untouched.
pub fn factor_weight_multiplier(traits: PersonalityTraits, factor: &str) -> f64 {
    if EVIDENCE_FACTORS.contains(&factor) {
        clip_multiplier(MULTIPLIER_FLOOR + traits.analytics_trust)
    } else if INTUITION_FACTORS.contains(&factor) {
        clip_multiplier(MULTIPLIER_CEIL - traits.analytics_trust)
    } else {
        1.0
    }
}

/// Compose a sequence of adjustment multipliers into one bounded factor.
pub fn compose(multipliers: &[f64]) -> f64 {
    clip_multiplier(multipliers.iter().product())
}
