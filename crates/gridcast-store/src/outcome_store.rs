//! Graded outcome persistence and settlement claims.
//!
//! Settlement is single-writer per `(run_id, game_id)`: a claim row in
//! `settled_games` plus a transaction-scoped advisory lock serialize
//! concurrent submissions, and a lost claim means the game was already
//! settled (idempotent no-op).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use gridcast_types::{CategoryId, ExpertId, GameId, OutcomeId, RunId};

use crate::error::StoreError;

/// One graded assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    /// Row identifier.
    pub outcome_id: OutcomeId,
    /// Experiment scope.
    pub run_id: RunId,
    /// The graded expert.
    pub expert_id: ExpertId,
    /// The settled game.
    pub game_id: GameId,
    /// The graded category.
    pub category_id: CategoryId,
    /// Season of the game.
    pub season: u16,
    /// Week of the game.
    pub week: u8,
    /// Whether a binary/enum assertion was correct (`None` for numeric).
    pub correct: Option<bool>,
    /// Absolute error for numeric assertions, squared error for
    /// percentages (`None` for choices).
    pub abs_error: Option<f64>,
    /// Confidence the expert attached.
    pub confidence: f64,
    /// Stake placed on the assertion.
    pub stake: Decimal,
    /// Signed payout applied to the bankroll.
    pub payout: Decimal,
    /// Settlement time.
    pub settled_at: DateTime<Utc>,
}

/// Operations on the `outcomes` and `settled_games` tables.
pub struct OutcomeStore<'a> {
    pool: &'a PgPool,
}

impl<'a> OutcomeStore<'a> {
    /// Create an outcome store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Begin a settlement transaction for a game.
    ///
    /// Acquires a transaction-scoped advisory lock on the `(run, game)`
    /// pair, then attempts the idempotency claim. Returns `None` when the
    /// game was already settled in this run (the caller must treat the
    /// submission as a no-op).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the claim cannot be attempted.
    pub async fn begin_settlement(
        &self,
        run_id: &RunId,
        game_id: &GameId,
    ) -> Result<Option<Transaction<'a, Postgres>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent settlement attempts for the same game.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(run_id.as_str())
            .bind(game_id.as_str())
            .execute(&mut *tx)
            .await?;

        let claimed = sqlx::query(
            r"INSERT INTO settled_games (run_id, game_id)
              VALUES ($1, $2)
              ON CONFLICT (run_id, game_id) DO NOTHING",
        )
        .bind(run_id.as_str())
        .bind(game_id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if claimed {
            Ok(Some(tx))
        } else {
            tx.rollback().await?;
            tracing::debug!(
                run_id = %run_id,
                game_id = %game_id,
                "duplicate settlement submission ignored"
            );
            Ok(None)
        }
    }

    /// Insert one graded outcome inside the settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the insert fails.
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        outcome: &OutcomeRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO outcomes
                  (outcome_id, run_id, expert_id, game_id, category_id, season,
                   week, correct, abs_error, confidence, stake, payout, settled_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
              ON CONFLICT (run_id, expert_id, game_id, category_id) DO NOTHING",
        )
        .bind(outcome.outcome_id.into_inner())
        .bind(outcome.run_id.as_str())
        .bind(outcome.expert_id.as_str())
        .bind(outcome.game_id.as_str())
        .bind(outcome.category_id.as_str())
        .bind(i16::try_from(outcome.season).unwrap_or(i16::MAX))
        .bind(i16::from(outcome.week))
        .bind(outcome.correct)
        .bind(outcome.abs_error)
        .bind(outcome.confidence)
        .bind(outcome.stake)
        .bind(outcome.payout)
        .bind(outcome.settled_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// All outcomes for one expert within a rolling week window.
    ///
    /// The window is inclusive on both ends and scoped to one season;
    /// cross-season windows are not part of the selection contract.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn window(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        season: u16,
        week_lo: u8,
        week_hi: u8,
    ) -> Result<Vec<OutcomeRecord>, StoreError> {
        let rows = sqlx::query_as::<_, OutcomeRow>(
            r"SELECT outcome_id, run_id, expert_id, game_id, category_id, season,
                     week, correct, abs_error, confidence, stake, payout, settled_at
              FROM outcomes
              WHERE run_id = $1 AND expert_id = $2 AND season = $3
                AND week BETWEEN $4 AND $5
              ORDER BY week, game_id, category_id",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(i16::try_from(season).unwrap_or(i16::MAX))
        .bind(i16::from(week_lo))
        .bind(i16::from(week_hi))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(OutcomeRow::into_record).collect())
    }

    /// Whether a game has already been settled in this run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn is_settled(&self, run_id: &RunId, game_id: &GameId) -> Result<bool, StoreError> {
        let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r"SELECT settled_at FROM settled_games WHERE run_id = $1 AND game_id = $2",
        )
        .bind(run_id.as_str())
        .bind(game_id.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.is_some())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutcomeRow {
    outcome_id: Uuid,
    run_id: String,
    expert_id: String,
    game_id: String,
    category_id: String,
    season: i16,
    week: i16,
    correct: Option<bool>,
    abs_error: Option<f64>,
    confidence: f64,
    stake: Decimal,
    payout: Decimal,
    settled_at: DateTime<Utc>,
}

impl OutcomeRow {
    fn into_record(self) -> OutcomeRecord {
        OutcomeRecord {
            outcome_id: OutcomeId::from(self.outcome_id),
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            game_id: GameId::from(self.game_id),
            category_id: CategoryId::from(self.category_id),
            season: u16::try_from(self.season).unwrap_or(0),
            week: u8::try_from(self.week).unwrap_or(0),
            correct: self.correct,
            abs_error: self.abs_error,
            confidence: self.confidence,
            stake: self.stake,
            payout: self.payout,
            settled_at: self.settled_at,
        }
    }
}
