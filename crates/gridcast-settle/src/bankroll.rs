//! Virtual stake settlement.
//!
//! The payoff schedule is a run-playbook policy: `flat` returns one unit
//! of profit per correct stake unit; `moneyline` scales winner-category
//! profits by the game's American odds. Losses always forfeit the stake.
//! Ungraded assertions leave the bankroll untouched.

use rust_decimal::Decimal;

use gridcast_types::{MarketLines, PayoffSchedule, Side, well_known};

use crate::grading::Grade;

/// Profit multiplier for a winning moneyline stake at the given
/// American odds.
fn moneyline_multiplier(odds: i32) -> Decimal {
    if odds >= 0 {
        Decimal::from(odds)
            .checked_div(Decimal::from(100))
            .unwrap_or(Decimal::ONE)
    } else {
        Decimal::from(100)
            .checked_div(Decimal::from(odds.saturating_abs()))
            .unwrap_or(Decimal::ONE)
    }
}

/// Signed bankroll delta for one graded assertion.
///
/// `picked_side` is the side the expert backed on winner-family
/// categories, used only under the moneyline schedule.
pub fn settle_stake(
    schedule: PayoffSchedule,
    category_id: &str,
    stake: Decimal,
    grade: &Grade,
    lines: &MarketLines,
    picked_side: Option<Side>,
) -> Decimal {
    if stake <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    match grade.correct {
        Some(true) => match schedule {
            PayoffSchedule::Flat => stake,
            PayoffSchedule::Moneyline => {
                if category_id == well_known::WINNER {
                    let odds = match picked_side {
                        Some(Side::Away) => lines.moneyline_away,
                        _ => lines.moneyline_home,
                    };
                    (stake * moneyline_multiplier(odds)).round_dp(4)
                } else {
                    stake
                }
            }
        },
        Some(false) => -stake,
        // Stakes only ride on graded choices; numeric error feeds
        // calibration, not the bankroll.
        None => Decimal::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> MarketLines {
        MarketLines {
            spread: -3.0,
            total: 47.5,
            moneyline_home: -160,
            moneyline_away: 140,
        }
    }

    fn won() -> Grade {
        Grade {
            correct: Some(true),
            abs_error: None,
        }
    }

    fn lost() -> Grade {
        Grade {
            correct: Some(false),
            abs_error: None,
        }
    }

    #[test]
    fn flat_schedule_pays_stake_for_stake() {
        let delta = settle_stake(
            PayoffSchedule::Flat,
            well_known::WINNER,
            Decimal::TWO,
            &won(),
            &lines(),
            Some(Side::Home),
        );
        assert_eq!(delta, Decimal::TWO);
    }

    #[test]
    fn losses_forfeit_the_stake_under_both_schedules() {
        for schedule in [PayoffSchedule::Flat, PayoffSchedule::Moneyline] {
            let delta = settle_stake(
                schedule,
                well_known::WINNER,
                Decimal::TWO,
                &lost(),
                &lines(),
                Some(Side::Home),
            );
            assert_eq!(delta, -Decimal::TWO);
        }
    }

    #[test]
    fn moneyline_favorite_pays_less_than_even() {
        // -160 favorite: 2 units return 2 * 100/160 = 1.25 profit.
        let delta = settle_stake(
            PayoffSchedule::Moneyline,
            well_known::WINNER,
            Decimal::TWO,
            &won(),
            &lines(),
            Some(Side::Home),
        );
        assert_eq!(delta, Decimal::new(125, 2));
    }

    #[test]
    fn moneyline_underdog_pays_more_than_even() {
        // +140 underdog: 2 units return 2 * 140/100 = 2.8 profit.
        let delta = settle_stake(
            PayoffSchedule::Moneyline,
            well_known::WINNER,
            Decimal::TWO,
            &won(),
            &lines(),
            Some(Side::Away),
        );
        assert_eq!(delta, Decimal::new(28, 1));
    }

    #[test]
    fn non_winner_categories_pay_flat_even_under_moneyline() {
        let delta = settle_stake(
            PayoffSchedule::Moneyline,
            well_known::TOTAL_OVER,
            Decimal::ONE,
            &won(),
            &lines(),
            None,
        );
        assert_eq!(delta, Decimal::ONE);
    }

    #[test]
    fn ungraded_and_zero_stakes_settle_to_zero() {
        let graded_numeric = Grade {
            correct: None,
            abs_error: Some(3.0),
        };
        let delta = settle_stake(
            PayoffSchedule::Flat,
            "total_full_game",
            Decimal::ONE,
            &graded_numeric,
            &lines(),
            None,
        );
        assert_eq!(delta, Decimal::ZERO);

        let delta = settle_stake(
            PayoffSchedule::Flat,
            well_known::WINNER,
            Decimal::ZERO,
            &won(),
            &lines(),
            Some(Side::Home),
        );
        assert_eq!(delta, Decimal::ZERO);
    }
}
