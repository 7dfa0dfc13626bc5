//! Assertion grading against observed results.
//!
//! The final score resolves most market, score, and quarter categories
//! directly; stat-sheet categories (team props, player props, advanced)
//! are resolved only when the feed supplies them in the `resolved`
//! overlay. An assertion whose category has no resolution is left
//! ungraded -- it produces no outcome row and never touches calibration.

use std::collections::BTreeMap;

use gridcast_types::{
    Assertion, AssertionValue, CategoryId, CategoryRegistry, FinalScore, Game, PredType, Side,
    well_known,
};

/// Actual values a finalised game resolves to, keyed by category.
pub type ResolvedValues = BTreeMap<CategoryId, AssertionValue>;

/// The grade of one assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    /// Correctness for binary/enum categories.
    pub correct: Option<bool>,
    /// Absolute error for numeric categories, squared error for
    /// percentages.
    pub abs_error: Option<f64>,
}

/// Derive the actual values the final score itself resolves.
///
/// Feed-supplied stat resolutions can be merged over the result.
pub fn derive_actuals(game: &Game, score: &FinalScore) -> ResolvedValues {
    let mut actuals = ResolvedValues::new();
    let lines = &game.market_lines;

    let winner = score.winner();
    let margin = f64::from(score.home_margin());
    let total = f64::from(score.total());

    let mut put_choice = |id: &str, value: &str| {
        actuals.insert(
            CategoryId::new(id),
            AssertionValue::Choice(value.to_owned()),
        );
    };

    put_choice(well_known::WINNER, winner.as_value());
    put_choice(
        well_known::SPREAD_COVER,
        if margin > -lines.spread { "COVER" } else { "NO_COVER" },
    );
    put_choice(
        well_known::TOTAL_OVER,
        if total > lines.total { "OVER" } else { "UNDER" },
    );

    let mut put_numeric = |id: &str, value: f64| {
        actuals.insert(CategoryId::new(id), AssertionValue::Numeric(value));
    };

    put_numeric(well_known::SPREAD_FULL_GAME, margin);
    put_numeric(well_known::TOTAL_FULL_GAME, total);
    put_numeric(well_known::HOME_SCORE, f64::from(score.home));
    put_numeric(well_known::AWAY_SCORE, f64::from(score.away));

    // Halves and quarters.
    let home_q: Vec<f64> = score.home_quarters.iter().map(|&q| f64::from(q)).collect();
    let away_q: Vec<f64> = score.away_quarters.iter().map(|&q| f64::from(q)).collect();
    let home_1h = home_q.iter().take(2).sum::<f64>();
    let away_1h = away_q.iter().take(2).sum::<f64>();

    put_numeric("home_first_half_points", home_1h);
    put_numeric("away_first_half_points", away_1h);
    put_numeric("home_second_half_points", f64::from(score.home) - home_1h);
    put_numeric("away_second_half_points", f64::from(score.away) - away_1h);
    put_numeric("first_half_total", home_1h + away_1h);
    put_numeric("first_half_spread", home_1h - away_1h);

    for (index, quarter) in ["q1", "q2", "q3", "q4"].iter().enumerate() {
        put_numeric(
            &format!("{quarter}_home_points"),
            home_q.get(index).copied().unwrap_or(0.0),
        );
        put_numeric(
            &format!("{quarter}_away_points"),
            away_q.get(index).copied().unwrap_or(0.0),
        );
    }

    // Quarter-level choices.
    let quarter_totals: Vec<f64> = (0..4)
        .map(|i| home_q.get(i).copied().unwrap_or(0.0) + away_q.get(i).copied().unwrap_or(0.0))
        .collect();
    let labels = ["Q1", "Q2", "Q3", "Q4"];
    let highest = extreme_quarter(&quarter_totals, &labels, true);
    let lowest = extreme_quarter(&quarter_totals, &labels, false);
    let mut put_choice = |id: &str, value: &str| {
        actuals.insert(
            CategoryId::new(id),
            AssertionValue::Choice(value.to_owned()),
        );
    };
    put_choice("highest_scoring_quarter", highest);
    put_choice("lowest_scoring_quarter", lowest);

    let q1_home = home_q.first().copied().unwrap_or(0.0);
    let q1_away = away_q.first().copied().unwrap_or(0.0);
    put_choice(
        "first_quarter_winner",
        choice_for_lead(q1_home, q1_away),
    );
    put_choice("halftime_leader", choice_for_lead(home_1h, away_1h));
    put_choice("overtime", if score.overtime { "YES" } else { "NO" });
    put_choice(
        "both_teams_20_plus",
        if score.home >= 20 && score.away >= 20 { "YES" } else { "NO" },
    );

    // The home probability grades as the indicator of the home result.
    actuals.insert(
        CategoryId::new(well_known::MONEYLINE_HOME_PROB),
        AssertionValue::Percentage(f64::from(u8::from(winner == Side::Home))),
    );

    actuals
}

const fn choice_for_lead(home: f64, away: f64) -> &'static str {
    if home > away {
        "HOME"
    } else if away > home {
        "AWAY"
    } else {
        "TIE"
    }
}

fn extreme_quarter<'a>(totals: &[f64], labels: &[&'a str], highest: bool) -> &'a str {
    let mut best_index = 0_usize;
    for (index, &value) in totals.iter().enumerate() {
        let current = totals.get(best_index).copied().unwrap_or(0.0);
        let better = if highest {
            value > current
        } else {
            value < current
        };
        if better {
            best_index = index;
        }
    }
    labels.get(best_index).copied().unwrap_or("Q1")
}

/// Grade one assertion against the resolved actuals.
///
/// Returns `None` when the category has no resolution.
pub fn grade(
    assertion: &Assertion,
    actuals: &ResolvedValues,
    registry: &CategoryRegistry,
) -> Option<Grade> {
    let actual = actuals.get(&assertion.category_id)?;
    let category = registry.get(&assertion.category_id)?;

    match category.pred_type {
        PredType::Binary | PredType::Enum => {
            let predicted = assertion.value.as_choice()?;
            let observed = actual.as_choice()?;
            Some(Grade {
                correct: Some(predicted == observed),
                abs_error: None,
            })
        }
        PredType::Numeric => {
            let predicted = assertion.value.as_number()?;
            let observed = actual.as_number()?;
            Some(Grade {
                correct: None,
                abs_error: Some((predicted - observed).abs()),
            })
        }
        PredType::Percentage => {
            let predicted = assertion.value.as_number()?;
            let observed = actual.as_number()?;
            Some(Grade {
                correct: None,
                abs_error: Some((predicted - observed).powi(2)),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use gridcast_types::{GameId, GameStatus, MarketLines, TeamId};

    use super::*;

    fn game() -> Game {
        Game {
            game_id: GameId::new("g1"),
            season: 2025,
            week: 5,
            date: Utc::now(),
            home_team: TeamId::new("KC"),
            away_team: TeamId::new("BUF"),
            venue: String::from("Arrowhead Stadium"),
            weather: None,
            market_lines: MarketLines {
                spread: -3.0,
                total: 47.5,
                moneyline_home: -160,
                moneyline_away: 140,
            },
            injuries: Vec::new(),
            status: GameStatus::Final,
            final_score: None,
        }
    }

    /// BUF 27 @ KC 24: away win, total 51, home fails to cover -3.
    fn away_win_score() -> FinalScore {
        FinalScore {
            home: 24,
            away: 27,
            home_quarters: [7, 3, 7, 7],
            away_quarters: [10, 7, 3, 7],
            overtime: false,
        }
    }

    fn assertion(category: &str, value: AssertionValue) -> Assertion {
        Assertion {
            category_id: CategoryId::new(category),
            value,
            confidence: 0.6,
            stake: Decimal::ONE,
            why: Vec::new(),
            rationale: None,
        }
    }

    #[test]
    fn actuals_resolve_core_market_categories() {
        let actuals = derive_actuals(&game(), &away_win_score());
        assert_eq!(
            actuals.get(&CategoryId::new(well_known::WINNER)),
            Some(&AssertionValue::Choice(String::from("AWAY")))
        );
        assert_eq!(
            actuals.get(&CategoryId::new(well_known::TOTAL_OVER)),
            Some(&AssertionValue::Choice(String::from("OVER")))
        );
        assert_eq!(
            actuals.get(&CategoryId::new(well_known::SPREAD_COVER)),
            Some(&AssertionValue::Choice(String::from("NO_COVER")))
        );
        assert_eq!(
            actuals.get(&CategoryId::new(well_known::TOTAL_FULL_GAME)),
            Some(&AssertionValue::Numeric(51.0))
        );
    }

    #[test]
    fn halves_and_quarters_resolve() {
        let actuals = derive_actuals(&game(), &away_win_score());
        assert_eq!(
            actuals.get(&CategoryId::new("home_first_half_points")),
            Some(&AssertionValue::Numeric(10.0))
        );
        assert_eq!(
            actuals.get(&CategoryId::new("halftime_leader")),
            Some(&AssertionValue::Choice(String::from("AWAY")))
        );
        assert_eq!(
            actuals.get(&CategoryId::new("highest_scoring_quarter")),
            Some(&AssertionValue::Choice(String::from("Q1")))
        );
    }

    #[test]
    fn wrong_winner_grades_incorrect() {
        let actuals = derive_actuals(&game(), &away_win_score());
        let registry = CategoryRegistry::standard();
        let home_pick = assertion(
            well_known::WINNER,
            AssertionValue::Choice(String::from("HOME")),
        );
        let grade = grade(&home_pick, &actuals, &registry);
        assert_eq!(
            grade,
            Some(Grade {
                correct: Some(false),
                abs_error: None
            })
        );
    }

    #[test]
    fn numeric_grades_by_absolute_error() {
        let actuals = derive_actuals(&game(), &away_win_score());
        let registry = CategoryRegistry::standard();
        let total_pick = assertion(
            well_known::TOTAL_FULL_GAME,
            AssertionValue::Numeric(47.0),
        );
        let graded = grade(&total_pick, &actuals, &registry);
        assert!(graded.is_some_and(|g| {
            g.abs_error.is_some_and(|e| (e - 4.0).abs() < 1e-9) && g.correct.is_none()
        }));
    }

    #[test]
    fn percentage_grades_by_squared_error() {
        let actuals = derive_actuals(&game(), &away_win_score());
        let registry = CategoryRegistry::standard();
        // Home lost, indicator 0; predicted 0.6 -> squared error 0.36.
        let prob_pick = assertion(
            well_known::MONEYLINE_HOME_PROB,
            AssertionValue::Percentage(0.6),
        );
        let graded = grade(&prob_pick, &actuals, &registry);
        assert!(graded.is_some_and(|g| {
            g.abs_error.is_some_and(|e| (e - 0.36).abs() < 1e-9)
        }));
    }

    #[test]
    fn unresolved_categories_are_left_ungraded() {
        let actuals = derive_actuals(&game(), &away_win_score());
        let registry = CategoryRegistry::standard();
        let prop_pick = assertion(
            "home_qb_passing_yards",
            AssertionValue::Numeric(250.0),
        );
        assert!(grade(&prop_pick, &actuals, &registry).is_none());
    }

    #[test]
    fn feed_resolutions_merge_over_derived() {
        let mut actuals = derive_actuals(&game(), &away_win_score());
        actuals.insert(
            CategoryId::new("home_qb_passing_yards"),
            AssertionValue::Numeric(287.0),
        );
        let registry = CategoryRegistry::standard();
        let prop_pick = assertion(
            "home_qb_passing_yards",
            AssertionValue::Numeric(250.0),
        );
        let graded = grade(&prop_pick, &actuals, &registry);
        assert!(graded.is_some_and(|g| {
            g.abs_error.is_some_and(|e| (e - 37.0).abs() < 1e-9)
        }));
    }
}
