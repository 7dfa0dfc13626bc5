//! Weighted consensus aggregation.
//!
//! Per council member and category, the vote weight is
//!
//! ```text
//! w = 0.40*category_accuracy + 0.30*overall_perf
//!   + 0.20*recent_trend + 0.10*calibration
//! ```
//!
//! renormalized across the contributing members so weights sum to 1.
//! Choice categories aggregate by weighted vote, numeric by weighted
//! mean with weighted standard deviation, percentages likewise clipped
//! to `[0, 1]`. Ineligible or schema-invalid bundles never enter a sum.
//! Aggregation is symmetric: contributors are sorted by expert id before
//! any arithmetic, so input order cannot change the result.

use std::collections::BTreeMap;

use chrono::Utc;

use gridcast_types::{
    Assertion, AssertionValue, Category, CategoryConsensus, CategoryId, CategoryRegistry,
    ConsensusBundle, Dissent, ExpertId, GameId, MemberWeight, PredType, PredictionBundle, RunId,
};

use crate::explanation::explain;
use crate::selection::RankedExpert;

/// Weight on category-specific accuracy in the vote weight.
const W_CATEGORY_ACCURACY: f64 = 0.40;
/// Weight on overall window performance.
const W_OVERALL: f64 = 0.30;
/// Weight on the recent trend.
const W_TREND: f64 = 0.20;
/// Weight on calibration.
const W_CALIBRATION: f64 = 0.10;

/// Minimum contributing bundles for an authoritative consensus.
const QUORUM: usize = 2;

/// Raw (pre-normalization) vote weight for a member on a category.
pub fn vote_weight(member: &RankedExpert, category_id: &CategoryId) -> f64 {
    W_CATEGORY_ACCURACY * member.stats.category_accuracy(category_id)
        + W_OVERALL * member.stats.acc_overall
        + W_TREND * member.stats.recent_trend
        + W_CALIBRATION * member.stats.calibration
}

/// Aggregate council bundles into a consensus for one game.
///
/// `bundles` may contain non-council or invalid entries; they are
/// filtered here so callers can pass the raw per-game set.
pub fn aggregate(
    run_id: &RunId,
    game_id: &GameId,
    council: &[RankedExpert],
    bundles: &[PredictionBundle],
    registry: &CategoryRegistry,
) -> ConsensusBundle {
    // Contributors: council members with a council-eligible bundle,
    // sorted by expert id for symmetry.
    let mut contributors: Vec<(&RankedExpert, &PredictionBundle)> = council
        .iter()
        .filter_map(|member| {
            bundles
                .iter()
                .find(|b| {
                    b.expert_id == member.expert_id
                        && b.game_id == *game_id
                        && b.council_eligible()
                })
                .map(|bundle| (member, bundle))
        })
        .collect();
    contributors.sort_by(|a, b| a.0.expert_id.cmp(&b.0.expert_id));

    let insufficient_quorum = contributors.len() < QUORUM;
    if insufficient_quorum {
        tracing::warn!(
            run_id = %run_id,
            game_id = %game_id,
            contributors = contributors.len(),
            "consensus below quorum; result is non-authoritative"
        );
    }

    let mut categories = BTreeMap::new();
    for category in registry.iter() {
        if let Some(consensus) = aggregate_category(category, &contributors) {
            categories.insert(category.id.clone(), consensus);
        }
    }

    ConsensusBundle {
        run_id: run_id.clone(),
        game_id: game_id.clone(),
        council: contributors
            .iter()
            .map(|(member, _)| member.expert_id.clone())
            .collect(),
        categories,
        insufficient_quorum,
        computed_at: Utc::now(),
    }
}

/// One member's contribution to a category.
struct Vote<'a> {
    expert_id: &'a ExpertId,
    assertion: &'a Assertion,
    weight: f64,
}

fn aggregate_category(
    category: &Category,
    contributors: &[(&RankedExpert, &PredictionBundle)],
) -> Option<CategoryConsensus> {
    let mut votes: Vec<Vote<'_>> = contributors
        .iter()
        .filter_map(|(member, bundle)| {
            bundle.assertions.get(&category.id).map(|assertion| Vote {
                expert_id: &member.expert_id,
                assertion,
                weight: vote_weight(member, &category.id),
            })
        })
        .collect();
    if votes.is_empty() {
        return None;
    }

    // Renormalize weights to sum to 1 across contributors.
    let total: f64 = votes.iter().map(|v| v.weight).sum();
    if total > f64::EPSILON {
        for vote in &mut votes {
            vote.weight /= total;
        }
    } else {
        let uniform = 1.0 / votes.len() as f64;
        for vote in &mut votes {
            vote.weight = uniform;
        }
    }

    let consensus = match category.pred_type {
        PredType::Binary | PredType::Enum => aggregate_choice(category, &votes),
        PredType::Numeric => aggregate_numeric(category, &votes, false),
        PredType::Percentage => aggregate_numeric(category, &votes, true),
    };
    Some(consensus)
}

fn aggregate_choice(category: &Category, votes: &[Vote<'_>]) -> CategoryConsensus {
    // Weighted mass and mean confidence per candidate value.
    let mut mass: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for vote in votes {
        let value = vote.assertion.value.as_choice().unwrap_or("");
        let entry = mass.entry(value).or_insert((0.0, 0.0, 0));
        entry.0 += vote.weight;
        entry.1 += vote.assertion.confidence;
        entry.2 = entry.2.saturating_add(1);
    }

    // Winner: highest mass, then higher mean confidence, then lexical.
    let winner = mass
        .iter()
        .map(|(&value, &(weight, conf_sum, count))| {
            let mean_conf = if count == 0 {
                0.0
            } else {
                conf_sum / count as f64
            };
            (value, weight, mean_conf)
        })
        .max_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then_with(|| a.2.total_cmp(&b.2))
                .then_with(|| b.0.cmp(a.0))
        });

    let (winning_value, agreement) =
        winner.map_or((String::new(), 0.0), |(value, weight, _)| {
            (value.to_owned(), weight)
        });

    let confidence = votes
        .iter()
        .map(|v| v.weight * v.assertion.confidence)
        .sum::<f64>();

    let dissents = collect_dissents(votes, |assertion| {
        assertion.value.as_choice() != Some(winning_value.as_str())
    });

    let weights = member_weights(votes);
    let value = AssertionValue::Choice(winning_value);
    let explanation = explain(category, &value, agreement, &dissents, confidence, votes.len());

    CategoryConsensus {
        category_id: category.id.clone(),
        value,
        agreement,
        stdev: None,
        confidence,
        weights,
        dissents,
        explanation,
    }
}

fn aggregate_numeric(
    category: &Category,
    votes: &[Vote<'_>],
    percentage: bool,
) -> CategoryConsensus {
    let numeric_votes: Vec<(&Vote<'_>, f64)> = votes
        .iter()
        .filter_map(|v| v.assertion.value.as_number().map(|n| (v, n)))
        .collect();

    let weight_sum: f64 = numeric_votes.iter().map(|(v, _)| v.weight).sum();
    let mean = if weight_sum > f64::EPSILON {
        numeric_votes
            .iter()
            .map(|(v, n)| v.weight * n)
            .sum::<f64>()
            / weight_sum
    } else {
        0.0
    };

    let variance = if weight_sum > f64::EPSILON {
        numeric_votes
            .iter()
            .map(|(v, n)| v.weight * (n - mean).powi(2))
            .sum::<f64>()
            / weight_sum
    } else {
        0.0
    };
    let stdev = variance.sqrt();

    let mean = if percentage { mean.clamp(0.0, 1.0) } else { mean };

    // Agreement: 1 minus dispersion normalized by half the category's
    // legal range.
    let half_range = category
        .range
        .map_or(1.0, |(lo, hi)| ((hi - lo) / 2.0).max(f64::EPSILON));
    let agreement = (1.0 - stdev / half_range).clamp(0.0, 1.0);

    let confidence = votes
        .iter()
        .map(|v| v.weight * v.assertion.confidence)
        .sum::<f64>();

    // Dissenters on numeric categories: more than one stdev from the mean.
    let threshold = stdev.max(f64::EPSILON);
    let dissents = collect_dissents(votes, |assertion| {
        assertion
            .value
            .as_number()
            .is_some_and(|n| (n - mean).abs() > threshold)
    });

    let value = if percentage {
        AssertionValue::Percentage(mean)
    } else {
        AssertionValue::Numeric(mean)
    };
    let weights = member_weights(votes);
    let explanation = explain(category, &value, agreement, &dissents, confidence, votes.len());

    CategoryConsensus {
        category_id: category.id.clone(),
        value,
        agreement,
        stdev: Some(stdev),
        confidence,
        weights,
        dissents,
        explanation,
    }
}

fn member_weights(votes: &[Vote<'_>]) -> Vec<MemberWeight> {
    votes
        .iter()
        .map(|v| MemberWeight {
            expert_id: v.expert_id.clone(),
            weight: v.weight,
        })
        .collect()
}

/// The top-2 most-weighted dissenting members.
fn collect_dissents(
    votes: &[Vote<'_>],
    is_dissent: impl Fn(&Assertion) -> bool,
) -> Vec<Dissent> {
    let mut dissents: Vec<Dissent> = votes
        .iter()
        .filter(|v| is_dissent(v.assertion))
        .map(|v| Dissent {
            expert_id: v.expert_id.clone(),
            weight: v.weight,
            value: v.assertion.value.clone(),
            confidence: v.assertion.confidence,
        })
        .collect();
    dissents.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.expert_id.cmp(&b.expert_id))
    });
    dissents.truncate(2);
    dissents
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use gridcast_types::{BundleId, BundleSummary, Side};

    use crate::stats::ExpertWindowStats;

    use super::*;

    fn member(id: &str, acc: f64) -> RankedExpert {
        let mut stats = ExpertWindowStats::neutral(ExpertId::new(id));
        stats.acc_overall = acc;
        stats.recent_trend = acc;
        stats.consistency = acc;
        stats.calibration = acc;
        RankedExpert {
            expert_id: ExpertId::new(id),
            score: acc,
            stats,
            specialisation: 0.5,
        }
    }

    fn bundle_with_winner(id: &str, winner: &str, confidence: f64) -> PredictionBundle {
        let assertion = Assertion {
            category_id: CategoryId::new("winner"),
            value: AssertionValue::Choice(winner.to_owned()),
            confidence,
            stake: Decimal::ONE,
            why: Vec::new(),
            rationale: None,
        };
        let mut assertions = BTreeMap::new();
        assertions.insert(assertion.category_id.clone(), assertion);
        PredictionBundle {
            bundle_id: BundleId::new(),
            run_id: RunId::new("r1"),
            game_id: GameId::new("g1"),
            expert_id: ExpertId::new(id),
            overall: BundleSummary {
                winner: Side::Home,
                confidence,
                headline: String::new(),
            },
            assertions,
            schema_valid: true,
            degraded: false,
            repair_iterations: 0,
            latency_ms: 100,
            model: String::from("stub"),
            created_at: Utc::now(),
        }
    }

    fn registry_with_winner_only() -> CategoryRegistry {
        CategoryRegistry::standard()
    }

    #[test]
    fn weighted_vote_picks_majority_mass() {
        // Four HOME voters, one AWAY dissenter with the lowest weight.
        let council: Vec<RankedExpert> = [
            ("a", 0.80),
            ("b", 0.72),
            ("c", 0.66),
            ("d", 0.60),
            ("e", 0.50),
        ]
        .iter()
        .map(|&(id, acc)| member(id, acc))
        .collect();

        let bundles = vec![
            bundle_with_winner("a", "HOME", 0.65),
            bundle_with_winner("b", "HOME", 0.62),
            bundle_with_winner("c", "HOME", 0.60),
            bundle_with_winner("d", "HOME", 0.58),
            bundle_with_winner("e", "AWAY", 0.55),
        ];

        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );

        let winner = consensus.categories.get(&CategoryId::new("winner"));
        assert!(winner.is_some_and(|c| c.value.as_choice() == Some("HOME")));
        // Agreement is the winning mass; the four HOME members hold the
        // majority of normalized weight.
        assert!(winner.is_some_and(|c| c.agreement > 0.75));
        assert!(winner.is_some_and(|c| {
            c.dissents.len() == 1
                && c.dissents.first().is_some_and(|d| d.expert_id.as_str() == "e")
        }));
        assert!(!consensus.insufficient_quorum);
    }

    #[test]
    fn weights_renormalize_to_one() {
        let council = vec![member("a", 0.8), member("b", 0.6)];
        let bundles = vec![
            bundle_with_winner("a", "HOME", 0.6),
            bundle_with_winner("b", "AWAY", 0.6),
        ];
        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );
        let winner = consensus.categories.get(&CategoryId::new("winner"));
        let weight_sum: f64 = winner.map_or(0.0, |c| c.weights.iter().map(|w| w.weight).sum());
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn aggregation_is_symmetric_under_reordering() {
        let council_fwd = vec![member("a", 0.8), member("b", 0.6), member("c", 0.7)];
        let council_rev: Vec<RankedExpert> = council_fwd.iter().rev().cloned().collect();
        let bundles_fwd = vec![
            bundle_with_winner("a", "HOME", 0.6),
            bundle_with_winner("b", "AWAY", 0.55),
            bundle_with_winner("c", "HOME", 0.58),
        ];
        let bundles_rev: Vec<PredictionBundle> = bundles_fwd.iter().rev().cloned().collect();

        let forward = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council_fwd,
            &bundles_fwd,
            &registry_with_winner_only(),
        );
        let reversed = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council_rev,
            &bundles_rev,
            &registry_with_winner_only(),
        );

        assert_eq!(forward.council, reversed.council);
        let f = forward.categories.get(&CategoryId::new("winner"));
        let r = reversed.categories.get(&CategoryId::new("winner"));
        assert_eq!(
            f.map(|c| (c.value.clone(), c.agreement)),
            r.map(|c| (c.value.clone(), c.agreement))
        );
    }

    #[test]
    fn invalid_bundles_are_excluded_from_every_sum() {
        let council = vec![member("a", 0.8), member("b", 0.6), member("c", 0.7)];
        let mut invalid = bundle_with_winner("c", "AWAY", 0.99);
        invalid.schema_valid = false;
        invalid.degraded = true;
        let bundles = vec![
            bundle_with_winner("a", "HOME", 0.6),
            bundle_with_winner("b", "HOME", 0.55),
            invalid,
        ];

        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );

        assert_eq!(consensus.council.len(), 2);
        let winner = consensus.categories.get(&CategoryId::new("winner"));
        assert!(winner.is_some_and(|c| (c.agreement - 1.0).abs() < 1e-9));
    }

    #[test]
    fn below_quorum_is_flagged() {
        let council = vec![member("a", 0.8)];
        let bundles = vec![bundle_with_winner("a", "HOME", 0.6)];
        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );
        assert!(consensus.insufficient_quorum);
    }

    fn bundle_with_total(id: &str, total: f64, confidence: f64) -> PredictionBundle {
        let mut bundle = bundle_with_winner(id, "HOME", confidence);
        let assertion = Assertion {
            category_id: CategoryId::new("total_full_game"),
            value: AssertionValue::Numeric(total),
            confidence,
            stake: Decimal::ONE,
            why: Vec::new(),
            rationale: None,
        };
        bundle
            .assertions
            .insert(assertion.category_id.clone(), assertion);
        bundle
    }

    #[test]
    fn numeric_consensus_is_weighted_mean_with_stdev() {
        let council = vec![member("a", 0.7), member("b", 0.7)];
        let bundles = vec![
            bundle_with_total("a", 44.0, 0.6),
            bundle_with_total("b", 48.0, 0.6),
        ];
        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );
        let total = consensus.categories.get(&CategoryId::new("total_full_game"));

        // Equal stats mean equal weights: mean 46, stdev 2.
        assert!(total.is_some_and(|c| {
            c.value.as_number().is_some_and(|n| (n - 46.0).abs() < 1e-9)
        }));
        assert!(total.is_some_and(|c| {
            c.stdev.is_some_and(|s| (s - 2.0).abs() < 1e-9)
        }));
    }

    #[test]
    fn explanation_names_winner_and_dissent() {
        let council = vec![member("a", 0.8), member("b", 0.5)];
        let bundles = vec![
            bundle_with_winner("a", "HOME", 0.65),
            bundle_with_winner("b", "AWAY", 0.55),
        ];
        let consensus = aggregate(
            &RunId::new("r1"),
            &GameId::new("g1"),
            &council,
            &bundles,
            &registry_with_winner_only(),
        );
        let winner = consensus.categories.get(&CategoryId::new("winner"));
        assert!(winner.is_some_and(|c| c.explanation.contains("HOME")));
        assert!(winner.is_some_and(|c| c.explanation.contains('b')));
    }
}
