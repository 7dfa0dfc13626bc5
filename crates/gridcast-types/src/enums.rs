//! Enumeration types shared across the Gridcast engine.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Prediction categories
// ---------------------------------------------------------------------------

/// How a category's predicted value is typed and graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PredType {
    /// One of exactly two declared values (e.g. `OVER`/`UNDER`).
    Binary,
    /// One of a declared finite set of values.
    Enum,
    /// A real number within a declared range.
    Numeric,
    /// A probability in `[0, 1]`.
    Percentage,
}

/// Grouping of categories used for retrieval filters, specialisation, and
/// per-family temporal half-life overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum CategoryFamily {
    /// Betting-market categories: winner, spread, total, moneyline.
    Markets,
    /// Final and half scores per team.
    Scores,
    /// Per-quarter scoring and quarter-level outcomes.
    Quarters,
    /// Team statistical props (yards, turnovers, sacks, penalties).
    TeamProps,
    /// Whole-game props (touchdown counts, special-teams events).
    GameProps,
    /// Key-player props (quarterback, lead rusher, lead receiver).
    PlayerProps,
    /// Efficiency metrics (third down, red zone, yards per play).
    Advanced,
    /// In-game dynamics (lead changes, halftime leader, comebacks).
    Live,
    /// Situational events (first possession, fourth downs, drives).
    Situational,
}

impl CategoryFamily {
    /// All families in registry order.
    pub const ALL: [Self; 9] = [
        Self::Markets,
        Self::Scores,
        Self::Quarters,
        Self::TeamProps,
        Self::GameProps,
        Self::PlayerProps,
        Self::Advanced,
        Self::Live,
        Self::Situational,
    ];

    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markets => "markets",
            Self::Scores => "scores",
            Self::Quarters => "quarters",
            Self::TeamProps => "team_props",
            Self::GameProps => "game_props",
            Self::PlayerProps => "player_props",
            Self::Advanced => "advanced",
            Self::Live => "live",
            Self::Situational => "situational",
        }
    }
}

// ---------------------------------------------------------------------------
// Games
// ---------------------------------------------------------------------------

/// Lifecycle status of a game as reported by the external feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Not yet kicked off.
    Scheduled,
    /// In progress.
    Live,
    /// Finished with a final score.
    Final,
}

/// Which side of a matchup an assertion refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// The home team.
    Home,
    /// The away team.
    Away,
}

impl Side {
    /// The declared value string used in binary/enum assertions.
    pub const fn as_value(self) -> &'static str {
        match self {
            Self::Home => "HOME",
            Self::Away => "AWAY",
        }
    }
}

// ---------------------------------------------------------------------------
// Memories
// ---------------------------------------------------------------------------

/// Category of an episodic memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Pre-game reasoning captured at bundle time.
    Reasoning,
    /// Situational context (weather, injuries, venue).
    Contextual,
    /// Market-movement observations.
    Market,
    /// Post-game lesson extracted by belief revision.
    Learning,
    /// Raw settlement facts about what actually happened.
    Outcome,
}

impl MemoryType {
    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Contextual => "contextual",
            Self::Market => "market",
            Self::Learning => "learning",
            Self::Outcome => "outcome",
        }
    }
}

/// Affective tag attached to a memory at formation time.
///
/// Purely descriptive metadata; retrieval ranks only by similarity and
/// recency, but the tag is surfaced in prompts so an expert can recognize
/// its own past state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    /// A prediction landed as expected.
    Confident,
    /// A contrarian call paid off.
    Vindicated,
    /// A confident call missed badly.
    Humbled,
    /// A close call that could have gone either way.
    Anxious,
    /// Repeated misses on the same signal.
    Frustrated,
    /// No strong signal either way.
    Neutral,
}

// ---------------------------------------------------------------------------
// Run policy
// ---------------------------------------------------------------------------

/// Bundle generation mode set by the run playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    /// Single draft, schema validation, no repair loop.
    OneShot,
    /// Draft, critic, and up to two repair iterations.
    #[default]
    Deliberate,
}

/// How virtual stakes pay out at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum PayoffSchedule {
    /// One unit returned per correct stake unit.
    #[default]
    Flat,
    /// Payout scaled by the game's moneyline odds.
    Moneyline,
}

/// When an expert that loses eligibility is removed from selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[ts(export, export_to = "bindings/")]
#[serde(rename_all = "snake_case")]
pub enum DemotionPolicy {
    /// Demote only when a new week begins.
    #[default]
    WeekBoundary,
    /// Demote as soon as the gate trips.
    Immediate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_serialized_form_matches_as_str() {
        for family in CategoryFamily::ALL {
            let json = serde_json::to_string(&family).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", family.as_str()));
        }
    }

    #[test]
    fn side_values_are_declared_pair() {
        assert_eq!(Side::Home.as_value(), "HOME");
        assert_eq!(Side::Away.as_value(), "AWAY");
    }

    #[test]
    fn generation_mode_uses_kebab_case() {
        let json = serde_json::to_string(&GenerationMode::OneShot).unwrap_or_default();
        assert_eq!(json, "\"one-shot\"");
    }

    #[test]
    fn memory_type_round_trip() {
        for ty in [
            MemoryType::Reasoning,
            MemoryType::Contextual,
            MemoryType::Market,
            MemoryType::Learning,
            MemoryType::Outcome,
        ] {
            let json = serde_json::to_string(&ty).unwrap_or_default();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }
}
