//! Prediction bundles and their assertions.
//!
//! A bundle is the complete output of one expert for one game: exactly one
//! assertion per registry category, plus an overall summary. Bundles are
//! never mutated after insert; corrections are new bundles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::Side;
use crate::ids::{BundleId, CategoryId, ExpertId, GameId, MemoryId, RunId, ShadowRunId};

/// The typed value of a single assertion.
///
/// Binary and enum categories both carry a declared choice string; numeric
/// and percentage categories carry a float. The category's `pred_type`
/// decides which variants are legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssertionValue {
    /// A value from the category's declared choice set.
    Choice(String),
    /// A real number within the category's range.
    Numeric(f64),
    /// A probability in `[0, 1]`.
    Percentage(f64),
}

impl AssertionValue {
    /// The choice string, if this is a choice value.
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            Self::Choice(c) => Some(c.as_str()),
            Self::Numeric(_) | Self::Percentage(_) => None,
        }
    }

    /// The float payload, if this is numeric or percentage.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) | Self::Percentage(v) => Some(*v),
            Self::Choice(_) => None,
        }
    }
}

/// One typed prediction for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Assertion {
    /// Category this assertion answers.
    pub category_id: CategoryId,
    /// Predicted value, typed per the category.
    pub value: AssertionValue,
    /// Expert confidence in `[0, 1]`, further bounded by the expert's
    /// configured confidence range.
    pub confidence: f64,
    /// Virtual stake in bankroll units, `[0, stake_cap]`.
    #[ts(as = "String")]
    pub stake: Decimal,
    /// Memories cited as evidence (may be empty).
    pub why: Vec<MemoryId>,
    /// Optional short free-text rationale.
    pub rationale: Option<String>,
}

/// Headline summary of a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct BundleSummary {
    /// Predicted game winner.
    pub winner: Side,
    /// Confidence in the winner call.
    pub confidence: f64,
    /// One-sentence headline for the dashboard feed.
    pub headline: String,
}

/// The complete prediction output of one expert for one game.
///
/// Primary key: `(run_id, game_id, expert_id)`. Writes are idempotent on
/// that key; a duplicate submit is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PredictionBundle {
    /// Row identifier.
    pub bundle_id: BundleId,
    /// Experiment scope.
    pub run_id: RunId,
    /// Game predicted.
    pub game_id: GameId,
    /// Authoring expert.
    pub expert_id: ExpertId,
    /// Headline summary.
    pub overall: BundleSummary,
    /// Exactly one assertion per registry category, keyed by category id.
    pub assertions: BTreeMap<CategoryId, Assertion>,
    /// Whether the bundle passed schema validation.
    pub schema_valid: bool,
    /// Set when validation still failed after the final repair, or when
    /// generation was cut short; degraded bundles never reach the council.
    pub degraded: bool,
    /// Number of repair iterations performed (0-2).
    pub repair_iterations: u8,
    /// Wall-clock generation latency.
    pub latency_ms: u64,
    /// Model that produced the final draft.
    pub model: String,
    /// When the bundle was persisted.
    pub created_at: DateTime<Utc>,
}

impl PredictionBundle {
    /// Total stake across all assertions.
    pub fn total_stake(&self) -> Decimal {
        self.assertions
            .values()
            .map(|a| a.stake)
            .fold(Decimal::ZERO, |acc, s| acc.saturating_add(s))
    }

    /// Look up one assertion by category id string.
    pub fn assertion(&self, category_id: &str) -> Option<&Assertion> {
        self.assertions.get(&CategoryId::new(category_id))
    }

    /// Whether this bundle may participate in council aggregation.
    pub const fn council_eligible(&self) -> bool {
        self.schema_valid && !self.degraded
    }
}

/// An assertion written by a shadow model for A/B comparison.
///
/// Stored in a physically separate partition whose isolation flags are
/// pinned false by check constraints; nothing in the council or settlement
/// path ever reads these rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowAssertion {
    /// The shadow experiment this row belongs to.
    pub shadow_run_id: ShadowRunId,
    /// The main run the shadow mirrors.
    pub main_run_id: RunId,
    /// Game predicted.
    pub game_id: GameId,
    /// Expert whose primary slot this shadows.
    pub expert_id: ExpertId,
    /// The shadowed assertion.
    pub assertion: Assertion,
    /// Model that produced the shadow assertion.
    pub shadow_model: String,
    /// Model that produced the primary assertion it mirrors.
    pub primary_model: String,
    /// Whether the shadow agreed with the primary's value.
    pub agrees_with_primary: bool,
    /// Absolute confidence gap against the primary assertion.
    pub confidence_delta: f64,
}
