//! Game records as delivered by the external feed.
//!
//! The engine never mutates a game; ingestion upstream normalizes feeds into
//! this shape and transitions `status` scheduled -> live -> final. Everything
//! here is a read-only input to context assembly, drafting, and settlement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{GameStatus, Side};
use crate::ids::{GameId, TeamId};

/// A single NFL game with market context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Game {
    /// Feed-stable game identifier.
    pub game_id: GameId,
    /// Season year (e.g. 2025).
    pub season: u16,
    /// Week number within the season, 1-based.
    pub week: u8,
    /// Scheduled kickoff time.
    pub date: DateTime<Utc>,
    /// Home team abbreviation.
    pub home_team: TeamId,
    /// Away team abbreviation.
    pub away_team: TeamId,
    /// Stadium name.
    pub venue: String,
    /// Forecast at kickoff, when available (domes report `None`).
    pub weather: Option<WeatherReport>,
    /// Current betting lines.
    pub market_lines: MarketLines,
    /// Notable injuries going into the game.
    pub injuries: Vec<InjuryReport>,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Final score, present once `status` is [`GameStatus::Final`].
    pub final_score: Option<FinalScore>,
}

impl Game {
    /// The team on the given side.
    pub const fn team(&self, side: Side) -> &TeamId {
        match side {
            Side::Home => &self.home_team,
            Side::Away => &self.away_team,
        }
    }

    /// Role-agnostic matchup key for head-to-head aggregation.
    pub fn matchup_key(&self) -> String {
        self.home_team.matchup_key(&self.away_team)
    }
}

/// Weather forecast for an outdoor game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct WeatherReport {
    /// Temperature in Fahrenheit.
    pub temperature_f: f64,
    /// Sustained wind in miles per hour.
    pub wind_mph: f64,
    /// Chance of precipitation in `[0, 1]`.
    pub precipitation_chance: f64,
    /// Free-text conditions summary (e.g. `"clear"`, `"snow"`).
    pub conditions: String,
}

impl WeatherReport {
    /// Whether conditions are adverse enough to matter for scoring
    /// (high wind, freezing temperatures, or likely precipitation).
    pub fn is_adverse(&self) -> bool {
        self.wind_mph >= 15.0 || self.temperature_f <= 32.0 || self.precipitation_chance >= 0.5
    }
}

/// Current betting lines from the odds feed.
///
/// Spread is quoted from the home team's perspective: `-3.0` means the home
/// team is favored by three points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct MarketLines {
    /// Point spread (home perspective, negative = home favored).
    pub spread: f64,
    /// Over/under total points line.
    pub total: f64,
    /// American moneyline odds for the home team.
    pub moneyline_home: i32,
    /// American moneyline odds for the away team.
    pub moneyline_away: i32,
}

impl MarketLines {
    /// Convert American moneyline odds to an implied win probability.
    ///
    /// Favorites (negative odds): `|odds| / (|odds| + 100)`.
    /// Underdogs (positive odds): `100 / (odds + 100)`.
    pub fn implied_probability(odds: i32) -> f64 {
        let magnitude = f64::from(odds.saturating_abs());
        if odds < 0 {
            magnitude / (magnitude + 100.0)
        } else {
            100.0 / (magnitude + 100.0)
        }
    }

    /// Implied home-win probability from the home moneyline.
    pub fn home_implied_probability(&self) -> f64 {
        Self::implied_probability(self.moneyline_home)
    }
}

/// One notable injury from the injury feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InjuryReport {
    /// Team the player belongs to.
    pub team: TeamId,
    /// Player name.
    pub player: String,
    /// Position abbreviation (QB, RB, WR, ...).
    pub position: String,
    /// Feed designation (`out`, `doubtful`, `questionable`).
    pub designation: String,
}

/// Final score of a completed game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FinalScore {
    /// Points scored by the home team.
    pub home: u16,
    /// Points scored by the away team.
    pub away: u16,
    /// Per-quarter home points (index 0 = Q1). Overtime points fold into Q4.
    pub home_quarters: [u16; 4],
    /// Per-quarter away points (index 0 = Q1).
    pub away_quarters: [u16; 4],
    /// Whether the game went to overtime.
    pub overtime: bool,
}

impl FinalScore {
    /// The winning side. Ties are impossible in graded data; the home team
    /// is returned for a tie so grading stays total.
    pub const fn winner(&self) -> Side {
        if self.away > self.home {
            Side::Away
        } else {
            Side::Home
        }
    }

    /// Combined points scored.
    pub const fn total(&self) -> u16 {
        self.home.saturating_add(self.away)
    }

    /// Home margin of victory (negative when the away team won).
    pub const fn home_margin(&self) -> i32 {
        self.home as i32 - self.away as i32
    }
}
