//! Shadow partition persistence.
//!
//! Shadow A/B assertions live in a physically separate table whose
//! isolation flags are pinned `FALSE` by check constraints. Nothing in
//! this module is reachable from the council or settlement paths; the
//! reader methods exist only for the shadow API and its telemetry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use gridcast_types::{
    Assertion, AssertionValue, CategoryId, ExpertId, GameId, MemoryId, RunId, ShadowAssertion,
    ShadowRunId,
};

use crate::error::StoreError;

/// Aggregated telemetry for one shadow run.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowTelemetry {
    /// The shadow run.
    pub shadow_run_id: ShadowRunId,
    /// Shadow bundles written.
    pub bundles: i64,
    /// Of those, how many validated cleanly.
    pub schema_valid_count: i64,
    /// Total generation latency across bundles.
    pub total_latency_ms: i64,
    /// Accumulated model cost in dollars.
    pub total_cost: Decimal,
    /// Sum of per-assertion agreement indicators (1 = agreed with primary).
    pub agreement_sum: f64,
    /// Number of shadow assertions written.
    pub assertion_count: i64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl ShadowTelemetry {
    /// Schema-validity success rate across shadow bundles.
    pub fn success_rate(&self) -> f64 {
        if self.bundles <= 0 {
            return 0.0;
        }
        self.schema_valid_count as f64 / self.bundles as f64
    }

    /// Mean generation latency per bundle in milliseconds.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.bundles <= 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.bundles as f64
    }

    /// Fraction of shadow assertions agreeing with the primary.
    pub fn agreement_rate(&self) -> f64 {
        if self.assertion_count <= 0 {
            return 0.0;
        }
        self.agreement_sum / self.assertion_count as f64
    }
}

/// Operations on the shadow partition.
pub struct ShadowStore<'a> {
    pool: &'a PgPool,
}

impl<'a> ShadowStore<'a> {
    /// Create a shadow store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Write one shadow bundle's assertions and fold its stats into the
    /// telemetry row. Idempotent per `(shadow_run, expert, game, category)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if any statement fails.
    pub async fn insert_bundle(
        &self,
        assertions: &[ShadowAssertion],
        schema_valid: bool,
        latency_ms: u64,
        cost: Decimal,
    ) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0_usize;
        let mut agreement_sum = 0.0_f64;

        for shadow in assertions {
            let value = serde_json::to_value(&shadow.assertion.value)?;
            let inserted = sqlx::query(
                r"INSERT INTO shadow_assertions
                      (id, shadow_run_id, main_run_id, game_id, expert_id, category_id,
                       value, confidence, stake, shadow_model, primary_model,
                       agrees_with_primary, confidence_delta)
                  VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                  ON CONFLICT (shadow_run_id, expert_id, game_id, category_id)
                  DO NOTHING",
            )
            .bind(Uuid::now_v7())
            .bind(shadow.shadow_run_id.as_str())
            .bind(shadow.main_run_id.as_str())
            .bind(shadow.game_id.as_str())
            .bind(shadow.expert_id.as_str())
            .bind(shadow.assertion.category_id.as_str())
            .bind(&value)
            .bind(shadow.assertion.confidence)
            .bind(shadow.assertion.stake)
            .bind(&shadow.shadow_model)
            .bind(&shadow.primary_model)
            .bind(shadow.agrees_with_primary)
            .bind(shadow.confidence_delta)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            if inserted {
                written = written.saturating_add(1);
                if shadow.agrees_with_primary {
                    agreement_sum += 1.0;
                }
            }
        }

        if written > 0
            && let Some(first) = assertions.first()
        {
            sqlx::query(
                r"INSERT INTO shadow_telemetry
                      (shadow_run_id, bundles, schema_valid_count, total_latency_ms,
                       total_cost, agreement_sum, assertion_count, updated_at)
                  VALUES ($1, 1, $2, $3, $4, $5, $6, now())
                  ON CONFLICT (shadow_run_id)
                  DO UPDATE SET
                      bundles = shadow_telemetry.bundles + 1,
                      schema_valid_count = shadow_telemetry.schema_valid_count + EXCLUDED.schema_valid_count,
                      total_latency_ms = shadow_telemetry.total_latency_ms + EXCLUDED.total_latency_ms,
                      total_cost = shadow_telemetry.total_cost + EXCLUDED.total_cost,
                      agreement_sum = shadow_telemetry.agreement_sum + EXCLUDED.agreement_sum,
                      assertion_count = shadow_telemetry.assertion_count + EXCLUDED.assertion_count,
                      updated_at = now()",
            )
            .bind(first.shadow_run_id.as_str())
            .bind(i64::from(schema_valid))
            .bind(i64::try_from(latency_ms).unwrap_or(i64::MAX))
            .bind(cost)
            .bind(agreement_sum)
            .bind(i64::try_from(written).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// All shadow assertions of a shadow run (shadow API only).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn for_run(
        &self,
        shadow_run_id: &ShadowRunId,
    ) -> Result<Vec<ShadowAssertion>, StoreError> {
        let rows = sqlx::query_as::<_, ShadowRow>(
            r"SELECT shadow_run_id, main_run_id, game_id, expert_id, category_id,
                     value, confidence, stake, shadow_model, primary_model,
                     agrees_with_primary, confidence_delta
              FROM shadow_assertions
              WHERE shadow_run_id = $1
              ORDER BY game_id, expert_id, category_id",
        )
        .bind(shadow_run_id.as_str())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(ShadowRow::into_assertion).collect()
    }

    /// Telemetry summary for a shadow run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn telemetry(
        &self,
        shadow_run_id: &ShadowRunId,
    ) -> Result<Option<ShadowTelemetry>, StoreError> {
        let row = sqlx::query_as::<_, TelemetryRow>(
            r"SELECT shadow_run_id, bundles, schema_valid_count, total_latency_ms,
                     total_cost, agreement_sum, assertion_count, updated_at
              FROM shadow_telemetry
              WHERE shadow_run_id = $1",
        )
        .bind(shadow_run_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(TelemetryRow::into_telemetry))
    }

    /// Defense-in-depth audit: count shadow rows claiming hot-path use.
    ///
    /// The check constraints make a non-zero count impossible unless the
    /// schema was tampered with; a non-zero result is a fatal isolation
    /// violation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails, or
    /// [`StoreError::ShadowIsolation`] when violations exist.
    pub async fn audit_isolation(&self) -> Result<(), StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r"SELECT COUNT(*) FROM shadow_assertions
              WHERE used_in_council OR used_in_coherence OR used_in_settlement",
        )
        .fetch_one(self.pool)
        .await?;

        if count > 0 {
            return Err(StoreError::ShadowIsolation(format!(
                "{count} shadow assertions claim hot-path use"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ShadowRow {
    shadow_run_id: String,
    main_run_id: String,
    game_id: String,
    expert_id: String,
    category_id: String,
    value: serde_json::Value,
    confidence: f64,
    stake: Decimal,
    shadow_model: String,
    primary_model: String,
    agrees_with_primary: bool,
    confidence_delta: f64,
}

impl ShadowRow {
    fn into_assertion(self) -> Result<ShadowAssertion, StoreError> {
        let value: AssertionValue = serde_json::from_value(self.value)?;
        Ok(ShadowAssertion {
            shadow_run_id: ShadowRunId::from(self.shadow_run_id),
            main_run_id: RunId::from(self.main_run_id),
            game_id: GameId::from(self.game_id),
            expert_id: ExpertId::from(self.expert_id),
            assertion: Assertion {
                category_id: CategoryId::from(self.category_id),
                value,
                confidence: self.confidence,
                stake: self.stake,
                why: Vec::<MemoryId>::new(),
                rationale: None,
            },
            shadow_model: self.shadow_model,
            primary_model: self.primary_model,
            agrees_with_primary: self.agrees_with_primary,
            confidence_delta: self.confidence_delta,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TelemetryRow {
    shadow_run_id: String,
    bundles: i64,
    schema_valid_count: i64,
    total_latency_ms: i64,
    total_cost: Decimal,
    agreement_sum: f64,
    assertion_count: i64,
    updated_at: DateTime<Utc>,
}

impl TelemetryRow {
    fn into_telemetry(self) -> ShadowTelemetry {
        ShadowTelemetry {
            shadow_run_id: ShadowRunId::from(self.shadow_run_id),
            bundles: self.bundles,
            schema_valid_count: self.schema_valid_count,
            total_latency_ms: self.total_latency_ms,
            total_cost: self.total_cost,
            agreement_sum: self.agreement_sum,
            assertion_count: self.assertion_count,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn telemetry(bundles: i64, valid: i64, latency: i64) -> ShadowTelemetry {
        ShadowTelemetry {
            shadow_run_id: ShadowRunId::new("shadow-1"),
            bundles,
            schema_valid_count: valid,
            total_latency_ms: latency,
            total_cost: Decimal::ZERO,
            agreement_sum: 40.0,
            assertion_count: 50,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn success_rate_and_latency() {
        let t = telemetry(10, 9, 25_000);
        assert!((t.success_rate() - 0.9).abs() < 1e-12);
        assert!((t.avg_latency_ms() - 2_500.0).abs() < 1e-12);
        assert!((t.agreement_rate() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn empty_telemetry_rates_are_zero() {
        let t = telemetry(0, 0, 0);
        assert!(t.success_rate().abs() < f64::EPSILON);
        assert!(t.avg_latency_ms().abs() < f64::EPSILON);
    }
}
