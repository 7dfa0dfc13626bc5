//! Rolling performance statistics over a week window.
//!
//! Everything the selection formula and the vote weights consume is
//! derived here from graded outcome rows: overall accuracy, the weekly
//! accuracy trend, consistency, Brier-based calibration, and per-category
//! accuracy. Numeric outcomes contribute to none of the accuracy shares
//! (they have no correct/incorrect), only to their category error terms.

use std::collections::BTreeMap;

use gridcast_store::OutcomeRecord;
use gridcast_types::{CategoryFamily, CategoryId, CategoryRegistry, ExpertId, Game};

/// Rolling stats for one expert over the selection window.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpertWindowStats {
    /// The expert.
    pub expert_id: ExpertId,
    /// Share of correct binary/enum assertions in the window.
    pub acc_overall: f64,
    /// Weekly-accuracy slope, clipped to `[-1, 1]` then rescaled to
    /// `[0, 1]`.
    pub recent_trend: f64,
    /// `1 -` normalized variance of weekly accuracy.
    pub consistency: f64,
    /// `1 -` Brier score on confidence-labelled binary/enum assertions.
    pub calibration: f64,
    /// Per-category accuracy (binary/enum categories only).
    pub category_accuracy: BTreeMap<CategoryId, f64>,
    /// Per-family accuracy, aggregated through the registry.
    pub family_accuracy: BTreeMap<CategoryFamily, f64>,
    /// Number of graded binary/enum assertions in the window.
    pub graded: usize,
}

impl ExpertWindowStats {
    /// Neutral stats for an expert with no graded history.
    pub fn neutral(expert_id: ExpertId) -> Self {
        Self {
            expert_id,
            acc_overall: 0.5,
            recent_trend: 0.5,
            consistency: 0.5,
            calibration: 0.5,
            category_accuracy: BTreeMap::new(),
            family_accuracy: BTreeMap::new(),
            graded: 0,
        }
    }

    /// Accuracy for one category, falling back to the overall share.
    pub fn category_accuracy(&self, category_id: &CategoryId) -> f64 {
        self.category_accuracy
            .get(category_id)
            .copied()
            .unwrap_or(self.acc_overall)
    }
}

/// Compute window stats from an expert's graded outcomes.
pub fn window_stats(
    expert_id: ExpertId,
    outcomes: &[OutcomeRecord],
    registry: &CategoryRegistry,
) -> ExpertWindowStats {
    let graded: Vec<&OutcomeRecord> =
        outcomes.iter().filter(|o| o.correct.is_some()).collect();

    if graded.is_empty() {
        return ExpertWindowStats::neutral(expert_id);
    }

    let correct_count = graded
        .iter()
        .filter(|o| o.correct == Some(true))
        .count();
    let acc_overall = correct_count as f64 / graded.len() as f64;

    // Weekly accuracy series for trend and consistency.
    let mut weekly: BTreeMap<u8, (usize, usize)> = BTreeMap::new();
    for outcome in &graded {
        let entry = weekly.entry(outcome.week).or_insert((0, 0));
        entry.1 = entry.1.saturating_add(1);
        if outcome.correct == Some(true) {
            entry.0 = entry.0.saturating_add(1);
        }
    }
    let weekly_accuracy: Vec<f64> = weekly
        .values()
        .map(|&(correct, total)| {
            if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            }
        })
        .collect();

    let recent_trend = (slope(&weekly_accuracy).clamp(-1.0, 1.0) + 1.0) / 2.0;
    let consistency = (1.0 - variance(&weekly_accuracy) / 0.25).clamp(0.0, 1.0);

    // Brier score over confidence-labelled binary/enum assertions.
    let brier: f64 = graded
        .iter()
        .map(|o| {
            let hit = f64::from(u8::from(o.correct == Some(true)));
            (o.confidence - hit).powi(2)
        })
        .sum::<f64>()
        / graded.len() as f64;
    let calibration = (1.0 - brier).clamp(0.0, 1.0);

    // Per-category and per-family shares.
    let mut per_category: BTreeMap<CategoryId, (usize, usize)> = BTreeMap::new();
    for outcome in &graded {
        let entry = per_category
            .entry(outcome.category_id.clone())
            .or_insert((0, 0));
        entry.1 = entry.1.saturating_add(1);
        if outcome.correct == Some(true) {
            entry.0 = entry.0.saturating_add(1);
        }
    }
    let category_accuracy: BTreeMap<CategoryId, f64> = per_category
        .iter()
        .map(|(id, &(correct, total))| {
            (id.clone(), correct as f64 / total.max(1) as f64)
        })
        .collect();

    let mut per_family: BTreeMap<CategoryFamily, (usize, usize)> = BTreeMap::new();
    for (id, &(correct, total)) in &per_category {
        if let Some(category) = registry.get(id) {
            let entry = per_family.entry(category.family).or_insert((0, 0));
            entry.0 = entry.0.saturating_add(correct);
            entry.1 = entry.1.saturating_add(total);
        }
    }
    let family_accuracy: BTreeMap<CategoryFamily, f64> = per_family
        .iter()
        .map(|(&family, &(correct, total))| (family, correct as f64 / total.max(1) as f64))
        .collect();

    ExpertWindowStats {
        expert_id,
        acc_overall,
        recent_trend,
        consistency,
        calibration,
        category_accuracy,
        family_accuracy,
        graded: graded.len(),
    }
}

/// Least-squares slope of a series against its index.
fn slope(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / n_f;

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, &y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator = dx.mul_add(y - mean_y, numerator);
        denominator = dx.mul_add(dx, denominator);
    }
    if denominator <= f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

/// Population variance of a series.
fn variance(series: &[f64]) -> f64 {
    let n = series.len();
    if n == 0 {
        return 0.0;
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    series.iter().map(|&y| (y - mean).powi(2)).sum::<f64>() / n as f64
}

/// Game-relevance-weighted specialisation from family accuracies.
///
/// Relevance is fixed per run: market and score families carry full
/// weight, situational/advanced/game-prop families gain weight in
/// adverse weather (that is where environmental edges show up), and the
/// rest contribute at half weight. An expert with no family history
/// scores a neutral 0.5.
pub fn specialisation(stats: &ExpertWindowStats, game: &Game) -> f64 {
    if stats.family_accuracy.is_empty() {
        return 0.5;
    }

    let adverse = game.weather.as_ref().is_some_and(|w| w.is_adverse());
    let relevance = |family: CategoryFamily| -> f64 {
        let base = match family {
            CategoryFamily::Markets | CategoryFamily::Scores => 1.0,
            CategoryFamily::GameProps | CategoryFamily::Advanced | CategoryFamily::Situational => {
                0.75
            }
            CategoryFamily::Quarters
            | CategoryFamily::TeamProps
            | CategoryFamily::PlayerProps
            | CategoryFamily::Live => 0.5,
        };
        let weather_boost = matches!(
            family,
            CategoryFamily::GameProps | CategoryFamily::Advanced | CategoryFamily::Situational
        );
        if adverse && weather_boost {
            base * 1.5
        } else {
            base
        }
    };

    let mut weighted = 0.0;
    let mut total_relevance = 0.0;
    for (&family, &accuracy) in &stats.family_accuracy {
        let r = relevance(family);
        weighted = r.mul_add(accuracy, weighted);
        total_relevance += r;
    }
    if total_relevance <= f64::EPSILON {
        0.5
    } else {
        (weighted / total_relevance).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use gridcast_types::{
        GameId, GameStatus, MarketLines, OutcomeId, RunId, TeamId, WeatherReport,
    };

    use super::*;

    fn outcome(week: u8, category: &str, correct: bool, confidence: f64) -> OutcomeRecord {
        OutcomeRecord {
            outcome_id: OutcomeId::new(),
            run_id: RunId::new("r1"),
            expert_id: ExpertId::new("value_hunter"),
            game_id: GameId::new(format!("g-w{week}").as_str()),
            category_id: CategoryId::new(category),
            season: 2025,
            week,
            correct: Some(correct),
            abs_error: None,
            confidence,
            stake: Decimal::ONE,
            payout: Decimal::ZERO,
            settled_at: Utc::now(),
        }
    }

    fn registry() -> CategoryRegistry {
        CategoryRegistry::standard()
    }

    #[test]
    fn empty_history_is_neutral() {
        let stats = window_stats(ExpertId::new("x"), &[], &registry());
        assert!((stats.acc_overall - 0.5).abs() < f64::EPSILON);
        assert!((stats.recent_trend - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.graded, 0);
    }

    #[test]
    fn accuracy_counts_correct_share() {
        let outcomes = vec![
            outcome(1, "winner", true, 0.6),
            outcome(1, "winner", true, 0.6),
            outcome(2, "winner", false, 0.6),
            outcome(2, "winner", true, 0.6),
        ];
        let stats = window_stats(ExpertId::new("x"), &outcomes, &registry());
        assert!((stats.acc_overall - 0.75).abs() < 1e-12);
        assert_eq!(stats.graded, 4);
    }

    #[test]
    fn improving_weeks_trend_above_half() {
        let outcomes = vec![
            outcome(1, "winner", false, 0.6),
            outcome(2, "winner", true, 0.6),
            outcome(3, "winner", true, 0.6),
            outcome(4, "winner", true, 0.6),
        ];
        let stats = window_stats(ExpertId::new("x"), &outcomes, &registry());
        assert!(stats.recent_trend > 0.5);
    }

    #[test]
    fn declining_weeks_trend_below_half() {
        let outcomes = vec![
            outcome(1, "winner", true, 0.6),
            outcome(2, "winner", true, 0.6),
            outcome(3, "winner", false, 0.6),
            outcome(4, "winner", false, 0.6),
        ];
        let stats = window_stats(ExpertId::new("x"), &outcomes, &registry());
        assert!(stats.recent_trend < 0.5);
    }

    #[test]
    fn steady_weeks_are_more_consistent_than_swingy_ones() {
        let steady = vec![
            outcome(1, "winner", true, 0.6),
            outcome(2, "winner", true, 0.6),
            outcome(3, "winner", true, 0.6),
        ];
        let swingy = vec![
            outcome(1, "winner", true, 0.6),
            outcome(2, "winner", false, 0.6),
            outcome(3, "winner", true, 0.6),
        ];
        let steady_stats = window_stats(ExpertId::new("x"), &steady, &registry());
        let swingy_stats = window_stats(ExpertId::new("x"), &swingy, &registry());
        assert!(steady_stats.consistency > swingy_stats.consistency);
    }

    #[test]
    fn well_calibrated_confidence_scores_higher() {
        // Confident and right beats confident and wrong.
        let sharp = vec![outcome(1, "winner", true, 0.9)];
        let deluded = vec![outcome(1, "winner", false, 0.9)];
        let sharp_stats = window_stats(ExpertId::new("x"), &sharp, &registry());
        let deluded_stats = window_stats(ExpertId::new("x"), &deluded, &registry());
        assert!(sharp_stats.calibration > deluded_stats.calibration);
    }

    #[test]
    fn category_accuracy_falls_back_to_overall() {
        let outcomes = vec![outcome(1, "winner", true, 0.6)];
        let stats = window_stats(ExpertId::new("x"), &outcomes, &registry());
        let known = stats.category_accuracy(&CategoryId::new("winner"));
        let unknown = stats.category_accuracy(&CategoryId::new("total_over"));
        assert!((known - 1.0).abs() < 1e-12);
        assert!((unknown - stats.acc_overall).abs() < 1e-12);
    }

    fn game_with_weather(adverse: bool) -> Game {
        Game {
            game_id: GameId::new("g1"),
            season: 2025,
            week: 5,
            date: Utc::now(),
            home_team: TeamId::new("KC"),
            away_team: TeamId::new("BUF"),
            venue: String::from("Arrowhead Stadium"),
            weather: Some(WeatherReport {
                temperature_f: if adverse { 15.0 } else { 65.0 },
                wind_mph: if adverse { 25.0 } else { 4.0 },
                precipitation_chance: 0.1,
                conditions: String::from(if adverse { "snow" } else { "clear" }),
            }),
            market_lines: MarketLines {
                spread: -3.0,
                total: 47.5,
                moneyline_home: -150,
                moneyline_away: 130,
            },
            injuries: Vec::new(),
            status: GameStatus::Scheduled,
            final_score: None,
        }
    }

    #[test]
    fn specialisation_neutral_without_history() {
        let stats = ExpertWindowStats::neutral(ExpertId::new("x"));
        assert!((specialisation(&stats, &game_with_weather(false)) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn situational_specialist_gains_in_bad_weather() {
        let mut stats = ExpertWindowStats::neutral(ExpertId::new("weather_specialist"));
        stats.family_accuracy = BTreeMap::from([
            (CategoryFamily::Situational, 0.9),
            (CategoryFamily::Markets, 0.5),
        ]);

        let calm = specialisation(&stats, &game_with_weather(false));
        let stormy = specialisation(&stats, &game_with_weather(true));
        assert!(stormy > calm);
    }
}
