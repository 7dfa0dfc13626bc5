//! The prediction category registry.
//!
//! Every run shares one immutable registry of exactly [`REGISTRY_SIZE`]
//! categories. A bundle is valid only when it carries exactly one assertion
//! per registry entry, each value legal for its category's
//! [`PredType`](crate::enums::PredType).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{CategoryFamily, PredType};
use crate::ids::CategoryId;

/// Number of categories in the standard registry.
pub const REGISTRY_SIZE: usize = 83;

/// Well-known category ids referenced by cross-category consistency rules
/// and by the consensus explanation templates.
pub mod well_known {
    /// Game winner (`HOME`/`AWAY`).
    pub const WINNER: &str = "winner";
    /// Predicted home margin (home minus away).
    pub const SPREAD_FULL_GAME: &str = "spread_full_game";
    /// Whether the home team covers the posted spread.
    pub const SPREAD_COVER: &str = "spread_cover";
    /// Predicted combined points.
    pub const TOTAL_FULL_GAME: &str = "total_full_game";
    /// Over/under call against the posted total.
    pub const TOTAL_OVER: &str = "total_over";
    /// Home win probability.
    pub const MONEYLINE_HOME_PROB: &str = "moneyline_home_prob";
    /// Predicted home points.
    pub const HOME_SCORE: &str = "home_score";
    /// Predicted away points.
    pub const AWAY_SCORE: &str = "away_score";
}

/// One prediction category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Category {
    /// Registry-unique identifier.
    pub id: CategoryId,
    /// Family grouping.
    pub family: CategoryFamily,
    /// Value typing and grading rule.
    pub pred_type: PredType,
    /// Prior standard deviation for numeric categories (drives shaping
    /// spread and EMA calibration priors).
    pub sigma: Option<f64>,
    /// Declared value set for binary (exactly two) and enum categories.
    pub choices: Option<Vec<String>>,
    /// Inclusive legal range for numeric categories.
    pub range: Option<(f64, f64)>,
    /// Prior mean for numeric categories (e.g. total points 45.0).
    pub prior_mean: Option<f64>,
}

impl Category {
    /// Whether `value` is a member of this category's declared choice set.
    pub fn allows_choice(&self, value: &str) -> bool {
        self.choices
            .as_ref()
            .is_some_and(|set| set.iter().any(|c| c == value))
    }

    /// Whether `value` lies within this category's numeric range.
    pub fn allows_numeric(&self, value: f64) -> bool {
        match self.range {
            Some((lo, hi)) => value.is_finite() && value >= lo && value <= hi,
            None => value.is_finite(),
        }
    }
}

/// The immutable per-run category registry.
///
/// Iteration order is the stable id order of a [`BTreeMap`], which makes
/// every consumer (drafting, validation, aggregation) deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CategoryRegistry {
    categories: BTreeMap<CategoryId, Category>,
}

impl CategoryRegistry {
    /// Build the standard 83-category registry.
    pub fn standard() -> Self {
        let mut categories = BTreeMap::new();
        for category in standard_categories() {
            categories.insert(category.id.clone(), category);
        }
        Self { categories }
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    /// Whether the registry is empty (never true for the standard registry).
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Look up a category by id.
    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Whether the registry contains `id`.
    pub fn contains(&self, id: &CategoryId) -> bool {
        self.categories.contains_key(id)
    }

    /// Iterate categories in stable id order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    /// All category ids in stable order.
    pub fn ids(&self) -> impl Iterator<Item = &CategoryId> {
        self.categories.keys()
    }

    /// Categories belonging to the given family, in stable id order.
    pub fn family(&self, family: CategoryFamily) -> impl Iterator<Item = &Category> {
        self.categories.values().filter(move |c| c.family == family)
    }
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn numeric(
    id: &str,
    family: CategoryFamily,
    range: (f64, f64),
    prior_mean: f64,
    sigma: f64,
) -> Category {
    Category {
        id: CategoryId::new(id),
        family,
        pred_type: PredType::Numeric,
        sigma: Some(sigma),
        choices: None,
        range: Some(range),
        prior_mean: Some(prior_mean),
    }
}

fn binary(id: &str, family: CategoryFamily, pair: [&str; 2]) -> Category {
    Category {
        id: CategoryId::new(id),
        family,
        pred_type: PredType::Binary,
        sigma: None,
        choices: Some(pair.iter().map(|&c| c.to_owned()).collect()),
        range: None,
        prior_mean: None,
    }
}

fn choice(id: &str, family: CategoryFamily, set: &[&str]) -> Category {
    Category {
        id: CategoryId::new(id),
        family,
        pred_type: PredType::Enum,
        sigma: None,
        choices: Some(set.iter().map(|&c| c.to_owned()).collect()),
        range: None,
        prior_mean: None,
    }
}

fn percentage(id: &str, family: CategoryFamily, prior_mean: f64) -> Category {
    Category {
        id: CategoryId::new(id),
        family,
        pred_type: PredType::Percentage,
        sigma: None,
        choices: None,
        range: Some((0.0, 1.0)),
        prior_mean: Some(prior_mean),
    }
}

/// The full standard category list.
///
/// Family counts: markets 8, scores 6, quarters 12, team props 12, game
/// props 12, player props 12, advanced 8, live 6, situational 7 = 83.
#[allow(clippy::too_many_lines)]
fn standard_categories() -> Vec<Category> {
    use CategoryFamily as F;

    let yes_no = ["YES", "NO"];
    let home_away = ["HOME", "AWAY"];
    let home_away_tie = ["HOME", "AWAY", "TIE"];
    let quarters = ["Q1", "Q2", "Q3", "Q4"];

    vec![
        // --- markets (8) ---
        choice(well_known::WINNER, F::Markets, &home_away),
        numeric(well_known::SPREAD_FULL_GAME, F::Markets, (-30.0, 30.0), 0.0, 6.0),
        binary(well_known::SPREAD_COVER, F::Markets, ["COVER", "NO_COVER"]),
        numeric(well_known::TOTAL_FULL_GAME, F::Markets, (20.0, 90.0), 45.0, 12.0),
        binary(well_known::TOTAL_OVER, F::Markets, ["OVER", "UNDER"]),
        percentage(well_known::MONEYLINE_HOME_PROB, F::Markets, 0.5),
        numeric("first_half_spread", F::Markets, (-21.0, 21.0), 0.0, 4.5),
        numeric("first_half_total", F::Markets, (7.0, 49.0), 22.0, 7.0),
        // --- scores (6) ---
        numeric(well_known::HOME_SCORE, F::Scores, (0.0, 70.0), 23.0, 8.0),
        numeric(well_known::AWAY_SCORE, F::Scores, (0.0, 70.0), 22.0, 8.0),
        numeric("home_first_half_points", F::Scores, (0.0, 45.0), 11.0, 5.0),
        numeric("away_first_half_points", F::Scores, (0.0, 45.0), 11.0, 5.0),
        numeric("home_second_half_points", F::Scores, (0.0, 45.0), 12.0, 5.0),
        numeric("away_second_half_points", F::Scores, (0.0, 45.0), 11.0, 5.0),
        // --- quarters (12) ---
        numeric("q1_home_points", F::Quarters, (0.0, 28.0), 5.0, 3.5),
        numeric("q1_away_points", F::Quarters, (0.0, 28.0), 5.0, 3.5),
        numeric("q2_home_points", F::Quarters, (0.0, 28.0), 7.0, 4.0),
        numeric("q2_away_points", F::Quarters, (0.0, 28.0), 6.0, 4.0),
        numeric("q3_home_points", F::Quarters, (0.0, 28.0), 5.0, 3.5),
        numeric("q3_away_points", F::Quarters, (0.0, 28.0), 5.0, 3.5),
        numeric("q4_home_points", F::Quarters, (0.0, 28.0), 6.0, 4.0),
        numeric("q4_away_points", F::Quarters, (0.0, 28.0), 6.0, 4.0),
        choice("highest_scoring_quarter", F::Quarters, &quarters),
        choice("lowest_scoring_quarter", F::Quarters, &quarters),
        choice("first_quarter_winner", F::Quarters, &home_away_tie),
        binary("overtime", F::Quarters, yes_no),
        // --- team props (12) ---
        numeric("home_total_yards", F::TeamProps, (100.0, 700.0), 340.0, 70.0),
        numeric("away_total_yards", F::TeamProps, (100.0, 700.0), 330.0, 70.0),
        numeric("home_passing_yards", F::TeamProps, (50.0, 550.0), 225.0, 60.0),
        numeric("away_passing_yards", F::TeamProps, (50.0, 550.0), 220.0, 60.0),
        numeric("home_rushing_yards", F::TeamProps, (30.0, 350.0), 115.0, 40.0),
        numeric("away_rushing_yards", F::TeamProps, (30.0, 350.0), 110.0, 40.0),
        numeric("home_turnovers", F::TeamProps, (0.0, 8.0), 1.3, 1.1),
        numeric("away_turnovers", F::TeamProps, (0.0, 8.0), 1.3, 1.1),
        numeric("home_sacks", F::TeamProps, (0.0, 12.0), 2.4, 1.5),
        numeric("away_sacks", F::TeamProps, (0.0, 12.0), 2.4, 1.5),
        numeric("home_penalties", F::TeamProps, (0.0, 20.0), 6.0, 2.5),
        numeric("away_penalties", F::TeamProps, (0.0, 20.0), 6.0, 2.5),
        // --- game props (12) ---
        numeric("total_touchdowns", F::GameProps, (0.0, 16.0), 5.2, 1.8),
        numeric("total_field_goals", F::GameProps, (0.0, 10.0), 3.3, 1.4),
        numeric("total_turnovers", F::GameProps, (0.0, 10.0), 2.6, 1.5),
        numeric("total_sacks", F::GameProps, (0.0, 15.0), 4.8, 2.0),
        binary("both_teams_20_plus", F::GameProps, yes_no),
        binary("defensive_touchdown", F::GameProps, yes_no),
        binary("special_teams_touchdown", F::GameProps, yes_no),
        binary("safety_scored", F::GameProps, yes_no),
        binary("missed_extra_point", F::GameProps, yes_no),
        binary("two_point_conversion", F::GameProps, yes_no),
        numeric("longest_touchdown_yards", F::GameProps, (1.0, 99.0), 38.0, 20.0),
        numeric("total_punts", F::GameProps, (2.0, 16.0), 8.2, 2.4),
        // --- player props (12) ---
        numeric("home_qb_passing_yards", F::PlayerProps, (75.0, 550.0), 240.0, 55.0),
        numeric("away_qb_passing_yards", F::PlayerProps, (75.0, 550.0), 235.0, 55.0),
        numeric("home_qb_touchdown_passes", F::PlayerProps, (0.0, 7.0), 1.6, 1.0),
        numeric("away_qb_touchdown_passes", F::PlayerProps, (0.0, 7.0), 1.5, 1.0),
        numeric("home_qb_interceptions", F::PlayerProps, (0.0, 5.0), 0.8, 0.8),
        numeric("away_qb_interceptions", F::PlayerProps, (0.0, 5.0), 0.8, 0.8),
        numeric("home_rb1_rushing_yards", F::PlayerProps, (10.0, 250.0), 65.0, 28.0),
        numeric("away_rb1_rushing_yards", F::PlayerProps, (10.0, 250.0), 62.0, 28.0),
        numeric("home_wr1_receiving_yards", F::PlayerProps, (10.0, 250.0), 72.0, 30.0),
        numeric("away_wr1_receiving_yards", F::PlayerProps, (10.0, 250.0), 70.0, 30.0),
        numeric("home_top_receptions", F::PlayerProps, (2.0, 16.0), 6.5, 2.2),
        numeric("away_top_receptions", F::PlayerProps, (2.0, 16.0), 6.4, 2.2),
        // --- advanced (8) ---
        percentage("home_third_down_pct", F::Advanced, 0.40),
        percentage("away_third_down_pct", F::Advanced, 0.39),
        percentage("home_red_zone_pct", F::Advanced, 0.55),
        percentage("away_red_zone_pct", F::Advanced, 0.55),
        numeric("home_possession_minutes", F::Advanced, (18.0, 42.0), 30.0, 3.2),
        numeric("away_possession_minutes", F::Advanced, (18.0, 42.0), 30.0, 3.2),
        numeric("home_yards_per_play", F::Advanced, (2.5, 9.5), 5.4, 0.9),
        numeric("away_yards_per_play", F::Advanced, (2.5, 9.5), 5.3, 0.9),
        // --- live (6) ---
        choice("halftime_leader", F::Live, &home_away_tie),
        numeric("largest_lead_points", F::Live, (1.0, 45.0), 12.0, 7.0),
        numeric("lead_changes", F::Live, (0.0, 12.0), 2.3, 1.7),
        binary("decided_final_two_minutes", F::Live, yes_no),
        binary("comeback_win_10_plus", F::Live, yes_no),
        binary("game_winning_final_drive", F::Live, yes_no),
        // --- situational (7) ---
        choice("first_possession_result", F::Situational, &["TD", "FG", "NONE"]),
        binary("opening_kickoff_touchback", F::Situational, yes_no),
        numeric("fourth_down_attempts", F::Situational, (0.0, 8.0), 2.2, 1.4),
        numeric("fourth_down_conversions", F::Situational, (0.0, 5.0), 1.1, 1.0),
        binary("two_minute_drill_score", F::Situational, yes_no),
        numeric("longest_drive_plays", F::Situational, (6.0, 20.0), 11.0, 2.6),
        binary("trailing_team_final_possession", F::Situational, yes_no),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_exactly_83_categories() {
        let registry = CategoryRegistry::standard();
        assert_eq!(registry.len(), REGISTRY_SIZE);
    }

    #[test]
    fn registry_ids_are_unique() {
        // BTreeMap deduplicates; equality with the raw list proves no dupes.
        let raw = standard_categories();
        let registry = CategoryRegistry::standard();
        assert_eq!(raw.len(), registry.len());
    }

    #[test]
    fn every_family_is_represented() {
        let registry = CategoryRegistry::standard();
        for family in CategoryFamily::ALL {
            assert!(
                registry.family(family).count() > 0,
                "family {family:?} has no categories"
            );
        }
    }

    #[test]
    fn binary_categories_declare_exactly_two_choices() {
        let registry = CategoryRegistry::standard();
        for category in registry.iter() {
            if category.pred_type == PredType::Binary {
                let count = category.choices.as_ref().map_or(0, Vec::len);
                assert_eq!(count, 2, "category {} is binary", category.id);
            }
        }
    }

    #[test]
    fn numeric_categories_have_range_and_sigma() {
        let registry = CategoryRegistry::standard();
        for category in registry.iter() {
            if category.pred_type == PredType::Numeric {
                assert!(category.range.is_some(), "category {}", category.id);
                assert!(category.sigma.is_some(), "category {}", category.id);
                let (lo, hi) = category.range.unwrap_or((0.0, 0.0));
                assert!(lo < hi, "category {}", category.id);
            }
        }
    }

    #[test]
    fn percentage_categories_range_is_unit_interval() {
        let registry = CategoryRegistry::standard();
        for category in registry.iter() {
            if category.pred_type == PredType::Percentage {
                assert_eq!(category.range, Some((0.0, 1.0)), "category {}", category.id);
            }
        }
    }

    #[test]
    fn well_known_ids_resolve() {
        let registry = CategoryRegistry::standard();
        for id in [
            well_known::WINNER,
            well_known::SPREAD_FULL_GAME,
            well_known::SPREAD_COVER,
            well_known::TOTAL_FULL_GAME,
            well_known::TOTAL_OVER,
            well_known::MONEYLINE_HOME_PROB,
            well_known::HOME_SCORE,
            well_known::AWAY_SCORE,
        ] {
            assert!(registry.contains(&CategoryId::new(id)), "missing {id}");
        }
    }

    #[test]
    fn choice_membership_checks() {
        let registry = CategoryRegistry::standard();
        let winner = registry.get(&CategoryId::new(well_known::WINNER));
        assert!(winner.is_some_and(|c| c.allows_choice("HOME")));
        assert!(winner.is_some_and(|c| !c.allows_choice("DRAW")));
    }

    #[test]
    fn numeric_range_checks() {
        let registry = CategoryRegistry::standard();
        let total = registry.get(&CategoryId::new(well_known::TOTAL_FULL_GAME));
        assert!(total.is_some_and(|c| c.allows_numeric(45.5)));
        assert!(total.is_some_and(|c| !c.allows_numeric(150.0)));
        assert!(total.is_some_and(|c| !c.allows_numeric(f64::NAN)));
    }
}
