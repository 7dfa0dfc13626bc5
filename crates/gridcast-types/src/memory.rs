//! Episodic memory and aggregate knowledge entities.
//!
//! Memories are immutable once written: settlement supersedes rather than
//! mutates. Each memory carries up to four 1536-dimensional embeddings;
//! `combined` is computed at write time so the row is immediately
//! retrievable, the others are filled by a write-behind embedding job.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{EmotionalState, MemoryType};
use crate::ids::{ExpertId, GameId, MemoryId, RunId, TeamId};

/// Dimensionality of every embedding vector in the system.
pub const EMBEDDING_DIM: usize = 1536;

/// The four embedding dimensions of an episodic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryEmbeddings {
    /// Embedding of the game's factual context.
    pub game_context: Option<Vec<f32>>,
    /// Embedding of the prediction content.
    pub prediction: Option<Vec<f32>>,
    /// Embedding of the observed outcome.
    pub outcome: Option<Vec<f32>>,
    /// Blended embedding used by retrieval. Must be present for a memory
    /// to enter any candidate set.
    pub combined: Option<Vec<f32>>,
}

impl MemoryEmbeddings {
    /// Whether the memory is retrievable (combined embedding present and
    /// correctly sized).
    pub fn retrievable(&self) -> bool {
        self.combined
            .as_ref()
            .is_some_and(|v| v.len() == EMBEDDING_DIM)
    }
}

/// A single episodic memory belonging to one expert within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicMemory {
    /// Row identifier.
    pub memory_id: MemoryId,
    /// Experiment scope.
    pub run_id: RunId,
    /// Owning expert.
    pub expert_id: ExpertId,
    /// Game this memory is about.
    pub game_id: GameId,
    /// Memory category.
    pub memory_type: MemoryType,
    /// Free-text content (what the expert thought or learned).
    pub content: String,
    /// Home team of the referenced game.
    pub home_team: TeamId,
    /// Away team of the referenced game.
    pub away_team: TeamId,
    /// Season of the referenced game.
    pub season: u16,
    /// Week of the referenced game.
    pub week: u8,
    /// Date the referenced game was played.
    pub game_date: NaiveDate,
    /// Structured payload (graded categories, cited factors, ...).
    pub metadata: serde_json::Value,
    /// Embedding vectors.
    pub embeddings: MemoryEmbeddings,
    /// How strongly the memory imprinted, in `[0, 1]`.
    pub memory_strength: f64,
    /// Affective tag at formation time.
    pub emotional_state: EmotionalState,
    /// Sensory detail level, in `[0, 1]`.
    pub vividness: f64,
    /// Per-memory decay multiplier in `(0, 1]` applied on top of the
    /// expert-level half-life.
    pub decay_rate: f64,
    /// When the memory was written.
    pub created_at: DateTime<Utc>,
}

impl EpisodicMemory {
    /// Age of this memory in fractional days at `now`. Clock skew that
    /// would produce a negative age clips to zero.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        let seconds = now
            .signed_duration_since(self.created_at)
            .num_seconds()
            .max(0);
        seconds as f64 / 86_400.0
    }
}

/// A memory scored and ranked for inclusion in a context pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMemory {
    /// The underlying memory (embeddings omitted from prompt payloads).
    pub memory: EpisodicMemory,
    /// Cosine similarity against the query embedding, in `[-1, 1]`.
    pub similarity: f64,
    /// Age in days at ranking time.
    pub age_days: f64,
    /// Blended similarity + recency score used for ordering.
    pub rank_score: f64,
}

/// Accumulated knowledge an expert holds about one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamKnowledge {
    /// Experiment scope.
    pub run_id: RunId,
    /// Owning expert.
    pub expert_id: ExpertId,
    /// The team.
    pub team_id: TeamId,
    /// Rolling performance notes.
    pub recent_performance: serde_json::Value,
    /// Observed trend descriptors.
    pub trends: serde_json::Value,
    /// Expert's confidence in this knowledge, in `[0, 1]`.
    pub confidence_level: f64,
    /// Expert's graded accuracy on games involving this team.
    pub accuracy_rate: f64,
    /// Embedding of the knowledge summary.
    pub knowledge_embedding: Option<Vec<f32>>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Accumulated knowledge about a specific matchup (ordered home/away pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupMemory {
    /// Experiment scope.
    pub run_id: RunId,
    /// Owning expert.
    pub expert_id: ExpertId,
    /// Home team of the observed games.
    pub home_team: TeamId,
    /// Away team of the observed games.
    pub away_team: TeamId,
    /// Role-agnostic key (`min|max`), mirrored as a generated column for
    /// head-to-head aggregation across venue swaps.
    pub matchup_key_sorted: String,
    /// Games of this matchup the expert has graded.
    pub games_observed: u32,
    /// Narrative notes about how the matchup tends to play out.
    pub notes: serde_json::Value,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_at(created_at: DateTime<Utc>) -> EpisodicMemory {
        EpisodicMemory {
            memory_id: MemoryId::new(),
            run_id: RunId::new("r1"),
            expert_id: ExpertId::new("conservative_analyzer"),
            game_id: GameId::new("g1"),
            memory_type: MemoryType::Reasoning,
            content: String::from("Home line moved two points on injury news"),
            home_team: TeamId::new("KC"),
            away_team: TeamId::new("BUF"),
            season: 2025,
            week: 5,
            game_date: NaiveDate::from_ymd_opt(2025, 10, 5).unwrap_or_default(),
            metadata: serde_json::Value::Null,
            embeddings: MemoryEmbeddings::default(),
            memory_strength: 0.7,
            emotional_state: EmotionalState::Neutral,
            vividness: 0.5,
            decay_rate: 1.0,
            created_at,
        }
    }

    #[test]
    fn age_clips_negative_to_zero() {
        let now = Utc::now();
        let future = memory_at(now + chrono::Duration::days(3));
        assert!((future.age_days(now) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn age_in_fractional_days() {
        let now = Utc::now();
        let half_day_old = memory_at(now - chrono::Duration::hours(12));
        let age = half_day_old.age_days(now);
        assert!((age - 0.5).abs() < 0.01);
    }

    #[test]
    fn retrievable_requires_full_dimension() {
        let mut embeddings = MemoryEmbeddings::default();
        assert!(!embeddings.retrievable());

        embeddings.combined = Some(vec![0.0; 10]);
        assert!(!embeddings.retrievable());

        embeddings.combined = Some(vec![0.0; EMBEDDING_DIM]);
        assert!(embeddings.retrievable());
    }
}
