//! Bundle schema validation.
//!
//! A bundle is valid when it covers the registry exactly once, every
//! value is legal for its category's type, confidence and stakes respect
//! the expert's guardrails, and the cross-category consistency rules
//! hold. Validation returns the full violation list; the critic trims it
//! to the first K for the repair prompt.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use gridcast_experts::ExpertConfig;
use gridcast_types::{
    Assertion, AssertionValue, CategoryId, CategoryRegistry, Game, Guardrails, PredType, Side,
    well_known,
};

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// The offending category, when the violation is category-scoped.
    pub category_id: Option<CategoryId>,
    /// Stable rule identifier.
    pub rule: &'static str,
    /// Human-readable description for the critic prompt.
    pub detail: String,
}

impl Violation {
    fn scoped(category_id: &CategoryId, rule: &'static str, detail: String) -> Self {
        Self {
            category_id: Some(category_id.clone()),
            rule,
            detail,
        }
    }

    fn global(rule: &'static str, detail: String) -> Self {
        Self {
            category_id: None,
            rule,
            detail,
        }
    }
}

/// Validate a candidate assertion set against the registry, the expert's
/// guardrails, and the game's market lines.
pub fn validate_assertions(
    assertions: &BTreeMap<CategoryId, Assertion>,
    registry: &CategoryRegistry,
    config: &ExpertConfig,
    guardrails: &Guardrails,
    game: &Game,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    // Coverage: every registry category exactly once, nothing extra.
    for id in registry.ids() {
        if !assertions.contains_key(id) {
            violations.push(Violation::scoped(
                id,
                "missing_category",
                String::from("category absent from draft"),
            ));
        }
    }
    for id in assertions.keys() {
        if !registry.contains(id) {
            violations.push(Violation::scoped(
                id,
                "unknown_category",
                String::from("category not in registry"),
            ));
        }
    }

    // Per-assertion value, confidence, and stake legality.
    let [conf_lo, conf_hi] = config.confidence_range;
    let mut total_stake = Decimal::ZERO;
    for (id, assertion) in assertions {
        let Some(category) = registry.get(id) else {
            continue;
        };

        match (category.pred_type, &assertion.value) {
            (PredType::Binary | PredType::Enum, AssertionValue::Choice(choice)) => {
                if !category.allows_choice(choice) {
                    violations.push(Violation::scoped(
                        id,
                        "choice_not_declared",
                        format!("`{choice}` is not a declared value"),
                    ));
                }
            }
            (PredType::Numeric, AssertionValue::Numeric(value)) => {
                if !category.allows_numeric(*value) {
                    violations.push(Violation::scoped(
                        id,
                        "numeric_out_of_range",
                        format!("{value} outside the declared range"),
                    ));
                }
            }
            (PredType::Percentage, AssertionValue::Percentage(value)) => {
                if !value.is_finite() || !(0.0..=1.0).contains(value) {
                    violations.push(Violation::scoped(
                        id,
                        "percentage_out_of_range",
                        format!("{value} not in [0, 1]"),
                    ));
                }
            }
            (expected, _) => {
                violations.push(Violation::scoped(
                    id,
                    "wrong_value_kind",
                    format!("value kind does not match {expected:?} category"),
                ));
            }
        }

        if !assertion.confidence.is_finite()
            || assertion.confidence < conf_lo
            || assertion.confidence > conf_hi
        {
            violations.push(Violation::scoped(
                id,
                "confidence_out_of_range",
                format!(
                    "{} outside expert range [{conf_lo}, {conf_hi}]",
                    assertion.confidence
                ),
            ));
        }

        if assertion.stake < Decimal::ZERO || assertion.stake > guardrails.stake_cap {
            violations.push(Violation::scoped(
                id,
                "stake_exceeds_cap",
                format!(
                    "{} outside [0, {}]",
                    assertion.stake, guardrails.stake_cap
                ),
            ));
        }
        total_stake = total_stake.saturating_add(assertion.stake.max(Decimal::ZERO));
    }

    if total_stake > guardrails.total_stake_cap {
        violations.push(Violation::global(
            "total_stake_exceeds_cap",
            format!(
                "{total_stake} exceeds game cap {}",
                guardrails.total_stake_cap
            ),
        ));
    }

    violations.extend(consistency_violations(assertions, game));
    violations
}

/// The three mandated cross-category consistency rules.
fn consistency_violations(
    assertions: &BTreeMap<CategoryId, Assertion>,
    game: &Game,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let choice = |id: &str| -> Option<&str> {
        assertions
            .get(&CategoryId::new(id))
            .and_then(|a| a.value.as_choice())
    };
    let number = |id: &str| -> Option<f64> {
        assertions
            .get(&CategoryId::new(id))
            .and_then(|a| a.value.as_number())
    };

    let winner = match choice(well_known::WINNER) {
        Some("HOME") => Some(Side::Home),
        Some("AWAY") => Some(Side::Away),
        _ => None,
    };

    // Rule 1: winner must not contradict the predicted margin or the
    // moneyline probability.
    if let Some(winner) = winner {
        if let Some(margin) = number(well_known::SPREAD_FULL_GAME) {
            let contradicts = match winner {
                Side::Home => margin < 0.0,
                Side::Away => margin > 0.0,
            };
            if contradicts {
                violations.push(Violation::scoped(
                    &CategoryId::new(well_known::SPREAD_FULL_GAME),
                    "winner_spread_contradiction",
                    format!("margin {margin} contradicts winner {}", winner.as_value()),
                ));
            }
        }
        if let Some(p_home) = number(well_known::MONEYLINE_HOME_PROB) {
            let contradicts = match winner {
                Side::Home => p_home < 0.5,
                Side::Away => p_home > 0.5,
            };
            if contradicts {
                violations.push(Violation::scoped(
                    &CategoryId::new(well_known::MONEYLINE_HOME_PROB),
                    "winner_moneyline_contradiction",
                    format!(
                        "home probability {p_home} contradicts winner {}",
                        winner.as_value()
                    ),
                ));
            }
        }
    }

    // Rule 2: an OVER call must be backed by predicted scores above the
    // posted line (and UNDER below it).
    if let (Some(call), Some(home), Some(away)) = (
        choice(well_known::TOTAL_OVER),
        number(well_known::HOME_SCORE),
        number(well_known::AWAY_SCORE),
    ) {
        let implied_total = home + away;
        let line = game.market_lines.total;
        let contradicts = match call {
            "OVER" => implied_total <= line,
            "UNDER" => implied_total > line,
            _ => false,
        };
        if contradicts {
            violations.push(Violation::scoped(
                &CategoryId::new(well_known::TOTAL_OVER),
                "total_over_contradiction",
                format!("{call} with implied total {implied_total} against line {line}"),
            ));
        }
    }

    // Rule 3: the winner must also win the predicted scoreline.
    if let (Some(winner), Some(home), Some(away)) = (
        winner,
        number(well_known::HOME_SCORE),
        number(well_known::AWAY_SCORE),
    ) {
        let contradicts = match winner {
            Side::Home => home < away,
            Side::Away => away < home,
        };
        if contradicts {
            violations.push(Violation::scoped(
                &CategoryId::new(well_known::HOME_SCORE),
                "winner_score_contradiction",
                format!(
                    "scoreline {home}-{away} contradicts winner {}",
                    winner.as_value()
                ),
            ));
        }
    }

    violations
}
