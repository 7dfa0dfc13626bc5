//! Prediction bundle persistence.
//!
//! A bundle and its assertions are written in one transaction so readers
//! never observe a half-written bundle. Inserts are idempotent on
//! `(run_id, expert_id, game_id)`: a duplicate submit returns the existing
//! row id and touches nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use gridcast_types::{
    Assertion, AssertionValue, BundleId, BundleSummary, CategoryId, ExpertId, GameId, MemoryId,
    PredictionBundle, RunId,
};

use crate::error::StoreError;

/// The result of a bundle write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleWrite {
    /// Id of the stored bundle (existing row on duplicate submit).
    pub bundle_id: BundleId,
    /// Whether this call inserted the row.
    pub inserted: bool,
}

/// Operations on the `bundles` and `assertions` tables.
pub struct BundleStore<'a> {
    pool: &'a PgPool,
}

impl<'a> BundleStore<'a> {
    /// Create a bundle store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a bundle with all its assertions, idempotently.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if any statement fails; the
    /// transaction rolls back and no partial bundle is visible.
    pub async fn insert(&self, bundle: &PredictionBundle) -> Result<BundleWrite, StoreError> {
        let mut tx = self.pool.begin().await?;

        let overall = serde_json::to_value(&bundle.overall)?;
        let inserted = sqlx::query(
            r"INSERT INTO bundles (
                  bundle_id, run_id, expert_id, game_id, overall, schema_valid,
                  degraded, repair_iterations, latency_ms, model, created_at
              )
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
              ON CONFLICT (run_id, expert_id, game_id) DO NOTHING",
        )
        .bind(bundle.bundle_id.into_inner())
        .bind(bundle.run_id.as_str())
        .bind(bundle.expert_id.as_str())
        .bind(bundle.game_id.as_str())
        .bind(&overall)
        .bind(bundle.schema_valid)
        .bind(bundle.degraded)
        .bind(i16::from(bundle.repair_iterations))
        .bind(i64::try_from(bundle.latency_ms).unwrap_or(i64::MAX))
        .bind(&bundle.model)
        .bind(bundle.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if !inserted {
            // Race loser or duplicate submit: report the winning row.
            tx.rollback().await?;
            let row: (Uuid,) = sqlx::query_as(
                r"SELECT bundle_id FROM bundles
                  WHERE run_id = $1 AND expert_id = $2 AND game_id = $3",
            )
            .bind(bundle.run_id.as_str())
            .bind(bundle.expert_id.as_str())
            .bind(bundle.game_id.as_str())
            .fetch_one(self.pool)
            .await?;
            return Ok(BundleWrite {
                bundle_id: BundleId::from(row.0),
                inserted: false,
            });
        }

        for assertion in bundle.assertions.values() {
            let value = serde_json::to_value(&assertion.value)?;
            let why: Vec<Uuid> = assertion.why.iter().map(|id| id.into_inner()).collect();
            sqlx::query(
                r"INSERT INTO assertions
                      (bundle_id, category_id, value, confidence, stake, why, rationale)
                  VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(bundle.bundle_id.into_inner())
            .bind(assertion.category_id.as_str())
            .bind(&value)
            .bind(assertion.confidence)
            .bind(assertion.stake)
            .bind(&why)
            .bind(assertion.rationale.as_deref())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(
            bundle_id = %bundle.bundle_id,
            run_id = %bundle.run_id,
            expert_id = %bundle.expert_id,
            game_id = %bundle.game_id,
            assertions = bundle.assertions.len(),
            "bundle persisted"
        );

        Ok(BundleWrite {
            bundle_id: bundle.bundle_id,
            inserted: true,
        })
    }

    /// All bundles for a game within a run, ordered by expert id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn for_game(
        &self,
        run_id: &RunId,
        game_id: &GameId,
    ) -> Result<Vec<PredictionBundle>, StoreError> {
        let rows = sqlx::query_as::<_, BundleRow>(
            r"SELECT bundle_id, run_id, expert_id, game_id, overall, schema_valid,
                     degraded, repair_iterations, latency_ms, model, created_at
              FROM bundles
              WHERE run_id = $1 AND game_id = $2
              ORDER BY expert_id",
        )
        .bind(run_id.as_str())
        .bind(game_id.as_str())
        .fetch_all(self.pool)
        .await?;

        let mut bundles = Vec::with_capacity(rows.len());
        for row in rows {
            let assertions = self.assertions_for(BundleId::from(row.bundle_id)).await?;
            bundles.push(row.into_bundle(assertions)?);
        }
        Ok(bundles)
    }

    /// One expert's bundle for a game, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn for_expert_game(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        game_id: &GameId,
    ) -> Result<Option<PredictionBundle>, StoreError> {
        let row = sqlx::query_as::<_, BundleRow>(
            r"SELECT bundle_id, run_id, expert_id, game_id, overall, schema_valid,
                     degraded, repair_iterations, latency_ms, model, created_at
              FROM bundles
              WHERE run_id = $1 AND expert_id = $2 AND game_id = $3",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(game_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => {
                let assertions = self.assertions_for(BundleId::from(row.bundle_id)).await?;
                Ok(Some(row.into_bundle(assertions)?))
            }
            None => Ok(None),
        }
    }

    async fn assertions_for(
        &self,
        bundle_id: BundleId,
    ) -> Result<BTreeMap<CategoryId, Assertion>, StoreError> {
        let rows = sqlx::query_as::<_, AssertionRow>(
            r"SELECT category_id, value, confidence, stake, why, rationale
              FROM assertions
              WHERE bundle_id = $1
              ORDER BY category_id",
        )
        .bind(bundle_id.into_inner())
        .fetch_all(self.pool)
        .await?;

        let mut assertions = BTreeMap::new();
        for row in rows {
            let assertion = row.into_assertion()?;
            assertions.insert(assertion.category_id.clone(), assertion);
        }
        Ok(assertions)
    }
}

/// A row from the `bundles` table.
#[derive(Debug, sqlx::FromRow)]
struct BundleRow {
    bundle_id: Uuid,
    run_id: String,
    expert_id: String,
    game_id: String,
    overall: serde_json::Value,
    schema_valid: bool,
    degraded: bool,
    repair_iterations: i16,
    latency_ms: i64,
    model: String,
    created_at: DateTime<Utc>,
}

impl BundleRow {
    fn into_bundle(
        self,
        assertions: BTreeMap<CategoryId, Assertion>,
    ) -> Result<PredictionBundle, StoreError> {
        let overall: BundleSummary = serde_json::from_value(self.overall)?;
        Ok(PredictionBundle {
            bundle_id: BundleId::from(self.bundle_id),
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            game_id: GameId::from(self.game_id),
            overall,
            assertions,
            schema_valid: self.schema_valid,
            degraded: self.degraded,
            repair_iterations: u8::try_from(self.repair_iterations).unwrap_or(0),
            latency_ms: u64::try_from(self.latency_ms).unwrap_or(0),
            model: self.model,
            created_at: self.created_at,
        })
    }
}

/// A row from the `assertions` table.
#[derive(Debug, sqlx::FromRow)]
struct AssertionRow {
    category_id: String,
    value: serde_json::Value,
    confidence: f64,
    stake: Decimal,
    why: Vec<Uuid>,
    rationale: Option<String>,
}

impl AssertionRow {
    fn into_assertion(self) -> Result<Assertion, StoreError> {
        let value: AssertionValue = serde_json::from_value(self.value)?;
        Ok(Assertion {
            category_id: CategoryId::from(self.category_id),
            value,
            confidence: self.confidence,
            stake: self.stake,
            why: self.why.into_iter().map(MemoryId::from).collect(),
            rationale: self.rationale,
        })
    }
}
