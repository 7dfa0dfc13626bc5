//! Council consensus read models.
//!
//! These are the API-facing shapes returned by the consensus endpoint;
//! the aggregation logic that produces them lives in the council crate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bundle::AssertionValue;
use crate::ids::{CategoryId, ExpertId, GameId, RunId};

/// One council member's contribution weight for a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MemberWeight {
    /// The council member.
    pub expert_id: ExpertId,
    /// Renormalized vote weight in `[0, 1]`; weights sum to 1 per category.
    pub weight: f64,
}

/// A dissenting council member and the value they backed instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Dissent {
    /// The dissenting member.
    pub expert_id: ExpertId,
    /// Their vote weight.
    pub weight: f64,
    /// The value they asserted.
    pub value: AssertionValue,
    /// Their confidence in that value.
    pub confidence: f64,
}

/// The council's aggregated answer for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CategoryConsensus {
    /// The category.
    pub category_id: CategoryId,
    /// Winning value (weighted vote for choices, weighted mean for numbers).
    pub value: AssertionValue,
    /// For choice categories: the winning weight mass. For numeric and
    /// percentage categories: 1 minus the coefficient of dispersion.
    pub agreement: f64,
    /// Weighted standard deviation for numeric/percentage categories.
    pub stdev: Option<f64>,
    /// Weight-averaged confidence of the contributing members.
    pub confidence: f64,
    /// Contributing weights, renormalized to sum to 1.
    pub weights: Vec<MemberWeight>,
    /// Up to two most-weighted dissenting members.
    pub dissents: Vec<Dissent>,
    /// Three-sentence templated explanation.
    pub explanation: String,
}

/// The full consensus output for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConsensusBundle {
    /// Experiment scope.
    pub run_id: RunId,
    /// The game.
    pub game_id: GameId,
    /// Council members in selection order (best first).
    pub council: Vec<ExpertId>,
    /// Per-category consensus keyed by category id.
    pub categories: BTreeMap<CategoryId, CategoryConsensus>,
    /// Set when fewer than two eligible bundles contributed; downstream
    /// consumers must treat the result as non-authoritative.
    pub insufficient_quorum: bool,
    /// When the consensus was computed.
    pub computed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_bundle_round_trips() {
        let bundle = ConsensusBundle {
            run_id: RunId::new("r1"),
            game_id: GameId::new("g1"),
            council: vec![ExpertId::new("sharp_money_follower")],
            categories: BTreeMap::new(),
            insufficient_quorum: true,
            computed_at: Utc::now(),
        };
        let json = serde_json::to_string(&bundle).ok();
        assert!(json.is_some());
        let back: Result<ConsensusBundle, _> =
            serde_json::from_str(json.as_deref().unwrap_or("{}"));
        assert!(back.is_ok());
    }
}
