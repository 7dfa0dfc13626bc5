//! Team knowledge and matchup memory persistence.
//!
//! Aggregates are updated inside the settlement transaction that produced
//! the underlying outcome memory, so a crash never leaves a memory without
//! its aggregate bump (or vice versa).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use gridcast_types::{ExpertId, MatchupMemory, RunId, TeamId, TeamKnowledge};

use crate::error::StoreError;

/// Operations on the `team_knowledge` and `matchup_memories` tables.
pub struct KnowledgeStore<'a> {
    pool: &'a PgPool,
}

impl<'a> KnowledgeStore<'a> {
    /// Create a knowledge store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an expert's knowledge about a team.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn team(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        team_id: &TeamId,
    ) -> Result<Option<TeamKnowledge>, StoreError> {
        let row = sqlx::query_as::<_, TeamKnowledgeRow>(
            r"SELECT run_id, expert_id, team_id, recent_performance, trends,
                     confidence_level, accuracy_rate, knowledge_embedding, updated_at
              FROM team_knowledge
              WHERE run_id = $1 AND expert_id = $2 AND team_id = $3",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(team_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TeamKnowledgeRow::into_knowledge))
    }

    /// Upsert team knowledge inside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_team_tx(
        tx: &mut Transaction<'_, Postgres>,
        knowledge: &TeamKnowledge,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO team_knowledge
                  (run_id, expert_id, team_id, recent_performance, trends,
                   confidence_level, accuracy_rate, knowledge_embedding, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
              ON CONFLICT (run_id, expert_id, team_id)
              DO UPDATE SET recent_performance = EXCLUDED.recent_performance,
                            trends = EXCLUDED.trends,
                            confidence_level = EXCLUDED.confidence_level,
                            accuracy_rate = EXCLUDED.accuracy_rate,
                            knowledge_embedding = COALESCE(
                                EXCLUDED.knowledge_embedding,
                                team_knowledge.knowledge_embedding),
                            updated_at = now()",
        )
        .bind(knowledge.run_id.as_str())
        .bind(knowledge.expert_id.as_str())
        .bind(knowledge.team_id.as_str())
        .bind(&knowledge.recent_performance)
        .bind(&knowledge.trends)
        .bind(knowledge.confidence_level)
        .bind(knowledge.accuracy_rate)
        .bind(knowledge.knowledge_embedding.as_deref())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fetch an expert's memory of a specific matchup, role-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn matchup(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        home_team: &TeamId,
        away_team: &TeamId,
    ) -> Result<Option<MatchupMemory>, StoreError> {
        let row = sqlx::query_as::<_, MatchupRow>(
            r"SELECT run_id, expert_id, home_team, away_team, matchup_key_sorted,
                     games_observed, notes, updated_at
              FROM matchup_memories
              WHERE run_id = $1 AND expert_id = $2 AND home_team = $3 AND away_team = $4",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(home_team.as_str())
        .bind(away_team.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(MatchupRow::into_matchup))
    }

    /// All of an expert's memories of a pairing regardless of venue,
    /// via the sorted matchup key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn matchup_any_venue(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        team_a: &TeamId,
        team_b: &TeamId,
    ) -> Result<Vec<MatchupMemory>, StoreError> {
        let key = team_a.matchup_key(team_b);
        let rows = sqlx::query_as::<_, MatchupRow>(
            r"SELECT run_id, expert_id, home_team, away_team, matchup_key_sorted,
                     games_observed, notes, updated_at
              FROM matchup_memories
              WHERE run_id = $1 AND expert_id = $2 AND matchup_key_sorted = $3
              ORDER BY home_team",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(&key)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(MatchupRow::into_matchup).collect())
    }

    /// Bump a matchup's observation count inside a settlement transaction,
    /// merging `notes` over whatever is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn observe_matchup_tx(
        tx: &mut Transaction<'_, Postgres>,
        run_id: &RunId,
        expert_id: &ExpertId,
        home_team: &TeamId,
        away_team: &TeamId,
        notes: &serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO matchup_memories
                  (run_id, expert_id, home_team, away_team, games_observed, notes, updated_at)
              VALUES ($1, $2, $3, $4, 1, $5, now())
              ON CONFLICT (run_id, expert_id, home_team, away_team)
              DO UPDATE SET games_observed = matchup_memories.games_observed + 1,
                            notes = matchup_memories.notes || EXCLUDED.notes,
                            updated_at = now()",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(home_team.as_str())
        .bind(away_team.as_str())
        .bind(notes)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TeamKnowledgeRow {
    run_id: String,
    expert_id: String,
    team_id: String,
    recent_performance: serde_json::Value,
    trends: serde_json::Value,
    confidence_level: f64,
    accuracy_rate: f64,
    knowledge_embedding: Option<Vec<f32>>,
    updated_at: DateTime<Utc>,
}

impl TeamKnowledgeRow {
    fn into_knowledge(self) -> TeamKnowledge {
        TeamKnowledge {
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            team_id: TeamId::from(self.team_id),
            recent_performance: self.recent_performance,
            trends: self.trends,
            confidence_level: self.confidence_level,
            accuracy_rate: self.accuracy_rate,
            knowledge_embedding: self.knowledge_embedding,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchupRow {
    run_id: String,
    expert_id: String,
    home_team: String,
    away_team: String,
    matchup_key_sorted: String,
    games_observed: i32,
    notes: serde_json::Value,
    updated_at: DateTime<Utc>,
}

impl MatchupRow {
    fn into_matchup(self) -> MatchupMemory {
        MatchupMemory {
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            home_team: TeamId::from(self.home_team),
            away_team: TeamId::from(self.away_team),
            matchup_key_sorted: self.matchup_key_sorted,
            games_observed: u32::try_from(self.games_observed).unwrap_or(0),
            notes: self.notes,
            updated_at: self.updated_at,
        }
    }
}
