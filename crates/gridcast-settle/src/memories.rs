//! Learning memory formation after settlement.
//!
//! One learning memory per expert per game: what was called right, what
//! was called wrong, with a strength proportional to the net signal
//! `|correct - incorrect| / total`. Embeddings are filled write-behind;
//! the memory carries none at insert time.

use chrono::Utc;

use gridcast_types::{
    EmotionalState, EpisodicMemory, Game, MemoryEmbeddings, MemoryId, MemoryType,
    PredictionBundle,
};

/// Per-expert grading tallies for one game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeTally {
    /// Binary/enum assertions graded correct.
    pub correct: usize,
    /// Binary/enum assertions graded incorrect.
    pub incorrect: usize,
}

impl GradeTally {
    /// Net signal strength `|correct - incorrect| / total`, zero when
    /// nothing was graded.
    pub fn strength(self) -> f64 {
        let total = self.correct.saturating_add(self.incorrect);
        if total == 0 {
            return 0.0;
        }
        self.correct.abs_diff(self.incorrect) as f64 / total as f64
    }

    /// Share of graded assertions that were correct.
    pub fn accuracy(self) -> f64 {
        let total = self.correct.saturating_add(self.incorrect);
        if total == 0 {
            return 0.5;
        }
        self.correct as f64 / total as f64
    }

    /// The affective tag the result imprints.
    pub fn emotional_state(self) -> EmotionalState {
        let accuracy = self.accuracy();
        if accuracy >= 0.7 {
            EmotionalState::Confident
        } else if accuracy <= 0.3 {
            EmotionalState::Humbled
        } else {
            EmotionalState::Neutral
        }
    }
}

/// Build the learning memory for one expert's settled game.
pub fn learning_memory(
    bundle: &PredictionBundle,
    game: &Game,
    tally: GradeTally,
    right_examples: &[String],
    wrong_examples: &[String],
) -> EpisodicMemory {
    let content = format!(
        "Settled {} at {}: {} of {} graded calls correct. Right: {}. Wrong: {}.",
        game.away_team,
        game.home_team,
        tally.correct,
        tally.correct.saturating_add(tally.incorrect),
        summarize(right_examples),
        summarize(wrong_examples),
    );

    EpisodicMemory {
        memory_id: MemoryId::new(),
        run_id: bundle.run_id.clone(),
        expert_id: bundle.expert_id.clone(),
        game_id: bundle.game_id.clone(),
        memory_type: MemoryType::Learning,
        content,
        home_team: game.home_team.clone(),
        away_team: game.away_team.clone(),
        season: game.season,
        week: game.week,
        game_date: game.date.date_naive(),
        metadata: serde_json::json!({
            "correct": tally.correct,
            "incorrect": tally.incorrect,
            "bundle_id": bundle.bundle_id.to_string(),
        }),
        embeddings: MemoryEmbeddings::default(),
        memory_strength: tally.strength(),
        emotional_state: tally.emotional_state(),
        vividness: tally.strength().mul_add(0.5, 0.3).clamp(0.0, 1.0),
        decay_rate: 1.0,
        created_at: Utc::now(),
    }
}

fn summarize(examples: &[String]) -> String {
    if examples.is_empty() {
        String::from("nothing notable")
    } else {
        examples
            .iter()
            .take(3)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_net_signal_over_total() {
        let tally = GradeTally {
            correct: 8,
            incorrect: 2,
        };
        assert!((tally.strength() - 0.6).abs() < 1e-12);

        let split = GradeTally {
            correct: 5,
            incorrect: 5,
        };
        assert!(split.strength().abs() < f64::EPSILON);
    }

    #[test]
    fn empty_tally_has_zero_strength_neutral_state() {
        let tally = GradeTally::default();
        assert!(tally.strength().abs() < f64::EPSILON);
        assert_eq!(tally.emotional_state(), EmotionalState::Neutral);
    }

    #[test]
    fn strong_result_imprints_confident() {
        let tally = GradeTally {
            correct: 9,
            incorrect: 1,
        };
        assert_eq!(tally.emotional_state(), EmotionalState::Confident);
    }

    #[test]
    fn weak_result_imprints_humbled() {
        let tally = GradeTally {
            correct: 1,
            incorrect: 9,
        };
        assert_eq!(tally.emotional_state(), EmotionalState::Humbled);
    }
}
