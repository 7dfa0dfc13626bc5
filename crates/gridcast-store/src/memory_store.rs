//! Episodic memory persistence and similarity retrieval.
//!
//! Retrieval contract: candidates are memories of the `(run, expert)` pair
//! with a non-null combined embedding, conjunctively pre-filtered in SQL,
//! then scored in process with the expert's decay engine:
//!
//! ```text
//! rank = alpha * cosine(query, combined) + beta * decay(age_days, H)
//! ```
//!
//! If fewer than the minimum K candidates survive, filters are relaxed in
//! a fixed order (recency window, then family, then teams) and each
//! relaxation is recorded. Ties break by recency descending, then
//! `memory_id` ascending.

use std::time::Instant;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use gridcast_experts::DecayEngine;
use gridcast_types::{
    CTX_K_MIN, CategoryFamily, EmotionalState, EpisodicMemory, ExpertId, FilterRelaxation,
    MemoryEmbeddings, MemoryId, MemoryType, RankedMemory, RunId, TeamId,
};

use crate::error::StoreError;
use crate::vector::cosine_similarity;

/// Maximum candidate rows fetched per retrieval stage.
const CANDIDATE_LIMIT: i64 = 512;

/// Conjunctive pre-filters for a retrieval call.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    /// Restrict to memories of games with this home team.
    pub home_team: Option<TeamId>,
    /// Restrict to memories of games with this away team.
    pub away_team: Option<TeamId>,
    /// Restrict to memories tagged with this category family.
    pub family: Option<CategoryFamily>,
    /// Restrict to memories younger than this many days.
    pub recency_window_days: Option<u32>,
}

/// The result of one retrieval call.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    /// Top-K memories, best rank first.
    pub memories: Vec<RankedMemory>,
    /// Filter relaxations performed, in order.
    pub relaxations: Vec<FilterRelaxation>,
    /// True when fewer than the minimum K survived all relaxations.
    pub degraded: bool,
    /// Wall-clock latency of the retrieval, including all stages.
    pub latency_ms: f64,
}

/// Operations on the `memories` table.
pub struct MemoryStore<'a> {
    pool: &'a PgPool,
}

impl<'a> MemoryStore<'a> {
    /// Create a memory store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a memory, idempotent on its natural key
    /// `(run_id, expert_id, game_id, memory_type, created_at)`.
    ///
    /// Returns `true` when a row was inserted, `false` when a concurrent
    /// duplicate already won the race.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert(&self, memory: &EpisodicMemory) -> Result<bool, StoreError> {
        let result = insert_query(memory).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert a memory inside a settlement transaction (same idempotency
    /// rule as [`insert`](Self::insert)).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        memory: &EpisodicMemory,
    ) -> Result<bool, StoreError> {
        let result = insert_query(memory).execute(&mut **tx).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fill the write-behind embedding dimensions of an existing memory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the update fails.
    pub async fn update_embeddings(
        &self,
        memory_id: MemoryId,
        embeddings: &MemoryEmbeddings,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"UPDATE memories
              SET game_context_embedding = COALESCE($2, game_context_embedding),
                  prediction_embedding   = COALESCE($3, prediction_embedding),
                  outcome_embedding      = COALESCE($4, outcome_embedding),
                  combined_embedding     = COALESCE($5, combined_embedding)
              WHERE memory_id = $1",
        )
        .bind(memory_id.into_inner())
        .bind(embeddings.game_context.as_deref())
        .bind(embeddings.prediction.as_deref())
        .bind(embeddings.outcome.as_deref())
        .bind(embeddings.combined.as_deref())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Memories of a run that still lack any write-behind embedding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn pending_embedding(
        &self,
        run_id: &RunId,
        limit: i64,
    ) -> Result<Vec<EpisodicMemory>, StoreError> {
        let rows = sqlx::query_as::<_, MemoryRow>(
            r"SELECT * FROM memories
              WHERE run_id = $1
                AND (game_context_embedding IS NULL
                     OR prediction_embedding IS NULL
                     OR outcome_embedding IS NULL)
              ORDER BY created_at
              LIMIT $2",
        )
        .bind(run_id.as_str())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemoryRow::into_memory).collect()
    }

    /// Fetch specific memories by id within a run (provenance audits).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn fetch_by_ids(
        &self,
        run_id: &RunId,
        ids: &[MemoryId],
    ) -> Result<Vec<EpisodicMemory>, StoreError> {
        let raw: Vec<Uuid> = ids.iter().map(|id| id.into_inner()).collect();
        let rows = sqlx::query_as::<_, MemoryRow>(
            r"SELECT * FROM memories WHERE run_id = $1 AND memory_id = ANY($2)",
        )
        .bind(run_id.as_str())
        .bind(&raw)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemoryRow::into_memory).collect()
    }

    /// Retrieve the top `k_desired` memories for a query embedding.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if a candidate fetch fails.
    pub async fn retrieve(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        query_embedding: &[f32],
        filters: RetrievalFilters,
        k_desired: usize,
        engine: &DecayEngine,
    ) -> Result<RetrievalOutcome, StoreError> {
        let started = Instant::now();
        let now = Utc::now();
        let mut filters = filters;
        let mut relaxations = Vec::new();

        loop {
            let candidates = self.fetch_candidates(run_id, expert_id, &filters).await?;
            let ranked = rank_candidates(candidates, query_embedding, engine, now, k_desired);

            if ranked.len() >= CTX_K_MIN {
                return Ok(RetrievalOutcome {
                    memories: ranked,
                    relaxations,
                    degraded: false,
                    latency_ms: elapsed_ms(started),
                });
            }

            // Relax the next active filter; when none remain, return what
            // exists flagged degraded.
            if filters.recency_window_days.take().is_some() {
                relaxations.push(FilterRelaxation::RecencyWindow);
            } else if filters.family.take().is_some() {
                relaxations.push(FilterRelaxation::Family);
            } else if filters.home_team.is_some() || filters.away_team.is_some() {
                filters.home_team = None;
                filters.away_team = None;
                relaxations.push(FilterRelaxation::Team);
            } else {
                tracing::debug!(
                    run_id = %run_id,
                    expert_id = %expert_id,
                    found = ranked.len(),
                    "retrieval degraded below minimum K"
                );
                return Ok(RetrievalOutcome {
                    memories: ranked,
                    relaxations,
                    degraded: true,
                    latency_ms: elapsed_ms(started),
                });
            }
        }
    }

    async fn fetch_candidates(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        filters: &RetrievalFilters,
    ) -> Result<Vec<EpisodicMemory>, StoreError> {
        let recency_days: Option<i32> = filters
            .recency_window_days
            .map(|d| i32::try_from(d).unwrap_or(i32::MAX));

        let rows = sqlx::query_as::<_, MemoryRow>(
            r"SELECT * FROM memories
              WHERE run_id = $1
                AND expert_id = $2
                AND combined_embedding IS NOT NULL
                AND ($3::TEXT IS NULL OR home_team = $3)
                AND ($4::TEXT IS NULL OR away_team = $4)
                AND ($5::TEXT IS NULL OR metadata->>'family' = $5)
                AND ($6::INTEGER IS NULL
                     OR created_at >= now() - make_interval(days => $6))
              ORDER BY created_at DESC
              LIMIT $7",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(filters.home_team.as_ref().map(TeamId::as_str))
        .bind(filters.away_team.as_ref().map(TeamId::as_str))
        .bind(filters.family.map(CategoryFamily::as_str))
        .bind(recency_days)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MemoryRow::into_memory).collect()
    }
}

/// Score and order candidates, returning at most `k_desired`.
fn rank_candidates(
    candidates: Vec<EpisodicMemory>,
    query_embedding: &[f32],
    engine: &DecayEngine,
    now: DateTime<Utc>,
    k_desired: usize,
) -> Vec<RankedMemory> {
    let mut ranked: Vec<RankedMemory> = candidates
        .into_iter()
        .filter_map(|memory| {
            let combined = memory.embeddings.combined.as_deref()?;
            let similarity = cosine_similarity(query_embedding, combined);
            // decay_rate < 1 slows a memory's aging relative to the
            // expert-level half-life.
            let age_days = memory.age_days(now);
            let effective_age = age_days * memory.decay_rate.clamp(f64::MIN_POSITIVE, 1.0);
            let rank_score = engine.rank(similarity, effective_age);
            Some(RankedMemory {
                memory,
                similarity,
                age_days,
                rank_score,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.rank_score
            .total_cmp(&a.rank_score)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.memory_id.cmp(&b.memory.memory_id))
    });
    ranked.truncate(k_desired);
    ranked
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

fn insert_query(
    memory: &EpisodicMemory,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"INSERT INTO memories (
              memory_id, run_id, expert_id, game_id, memory_type, content,
              home_team, away_team, season, week, game_date, metadata,
              game_context_embedding, prediction_embedding, outcome_embedding,
              combined_embedding, memory_strength, emotional_state, vividness,
              decay_rate, created_at
          )
          VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                  $13, $14, $15, $16, $17, $18, $19, $20, $21)
          ON CONFLICT (run_id, expert_id, game_id, memory_type, created_at)
          DO NOTHING",
    )
    .bind(memory.memory_id.into_inner())
    .bind(memory.run_id.as_str())
    .bind(memory.expert_id.as_str())
    .bind(memory.game_id.as_str())
    .bind(memory.memory_type.as_str())
    .bind(&memory.content)
    .bind(memory.home_team.as_str())
    .bind(memory.away_team.as_str())
    .bind(i16::try_from(memory.season).unwrap_or(i16::MAX))
    .bind(i16::from(memory.week))
    .bind(memory.game_date)
    .bind(&memory.metadata)
    .bind(memory.embeddings.game_context.as_deref())
    .bind(memory.embeddings.prediction.as_deref())
    .bind(memory.embeddings.outcome.as_deref())
    .bind(memory.embeddings.combined.as_deref())
    .bind(memory.memory_strength)
    .bind(emotional_state_tag(memory.emotional_state))
    .bind(memory.vividness)
    .bind(memory.decay_rate)
    .bind(memory.created_at)
}

/// Serialize an [`EmotionalState`] to its column tag.
fn emotional_state_tag(state: EmotionalState) -> &'static str {
    match state {
        EmotionalState::Confident => "confident",
        EmotionalState::Vindicated => "vindicated",
        EmotionalState::Humbled => "humbled",
        EmotionalState::Anxious => "anxious",
        EmotionalState::Frustrated => "frustrated",
        EmotionalState::Neutral => "neutral",
    }
}

fn emotional_state_from_tag(tag: &str) -> EmotionalState {
    match tag {
        "confident" => EmotionalState::Confident,
        "vindicated" => EmotionalState::Vindicated,
        "humbled" => EmotionalState::Humbled,
        "anxious" => EmotionalState::Anxious,
        "frustrated" => EmotionalState::Frustrated,
        _ => EmotionalState::Neutral,
    }
}

fn memory_type_from_tag(tag: &str) -> Result<MemoryType, StoreError> {
    match tag {
        "reasoning" => Ok(MemoryType::Reasoning),
        "contextual" => Ok(MemoryType::Contextual),
        "market" => Ok(MemoryType::Market),
        "learning" => Ok(MemoryType::Learning),
        "outcome" => Ok(MemoryType::Outcome),
        other => Err(StoreError::NotFound(format!(
            "unknown memory type tag: {other}"
        ))),
    }
}

/// A row from the `memories` table.
#[derive(Debug, sqlx::FromRow)]
struct MemoryRow {
    memory_id: Uuid,
    run_id: String,
    expert_id: String,
    game_id: String,
    memory_type: String,
    content: String,
    home_team: String,
    away_team: String,
    season: i16,
    week: i16,
    game_date: chrono::NaiveDate,
    metadata: serde_json::Value,
    game_context_embedding: Option<Vec<f32>>,
    prediction_embedding: Option<Vec<f32>>,
    outcome_embedding: Option<Vec<f32>>,
    combined_embedding: Option<Vec<f32>>,
    memory_strength: f64,
    emotional_state: String,
    vividness: f64,
    decay_rate: f64,
    created_at: DateTime<Utc>,
}

impl MemoryRow {
    fn into_memory(self) -> Result<EpisodicMemory, StoreError> {
        Ok(EpisodicMemory {
            memory_id: MemoryId::from(self.memory_id),
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            game_id: gridcast_types::GameId::from(self.game_id),
            memory_type: memory_type_from_tag(&self.memory_type)?,
            content: self.content,
            home_team: TeamId::from(self.home_team),
            away_team: TeamId::from(self.away_team),
            season: u16::try_from(self.season).unwrap_or(0),
            week: u8::try_from(self.week).unwrap_or(0),
            game_date: self.game_date,
            metadata: self.metadata,
            embeddings: MemoryEmbeddings {
                game_context: self.game_context_embedding,
                prediction: self.prediction_embedding,
                outcome: self.outcome_embedding,
                combined: self.combined_embedding,
            },
            memory_strength: self.memory_strength,
            emotional_state: emotional_state_from_tag(&self.emotional_state),
            vividness: self.vividness,
            decay_rate: self.decay_rate,
            created_at: self.created_at,
        })
    }
}
