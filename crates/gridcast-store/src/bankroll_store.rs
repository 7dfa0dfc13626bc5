//! Bankroll and eligibility gate persistence.
//!
//! Both tables are keyed `(run_id, expert_id)` and mutated only by
//! settlement under the per-pair lock, so plain upserts suffice.

use rust_decimal::Decimal;
use sqlx::PgPool;

use gridcast_experts::{Bankroll, EligibilityGate};
use gridcast_types::{ExpertId, RunId};

use crate::error::StoreError;

/// Operations on the `bankroll` and `eligibility_gates` tables.
pub struct BankrollStore<'a> {
    pool: &'a PgPool,
}

impl<'a> BankrollStore<'a> {
    /// Create a bankroll store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an expert's bankroll, creating a fresh one on first touch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn bankroll(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
    ) -> Result<Bankroll, StoreError> {
        let row: Option<(Decimal, Decimal, Decimal)> = sqlx::query_as(
            r"SELECT current_units, starting_units, peak_units
              FROM bankroll
              WHERE run_id = $1 AND expert_id = $2",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map_or_else(Bankroll::fresh, |(current, starting, peak)| Bankroll {
            current_units: current,
            starting_units: starting,
            peak_units: peak,
        }))
    }

    /// Write an expert's bankroll back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_bankroll(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        bankroll: &Bankroll,
    ) -> Result<(), StoreError> {
        bankroll_query(run_id, expert_id, bankroll)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Write an expert's bankroll inside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_bankroll_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        run_id: &RunId,
        expert_id: &ExpertId,
        bankroll: &Bankroll,
    ) -> Result<(), StoreError> {
        bankroll_query(run_id, expert_id, bankroll)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Fetch an expert's eligibility gate, fresh on first touch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn gate(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
    ) -> Result<EligibilityGate, StoreError> {
        let row: Option<(f64, f64, bool)> = sqlx::query_as(
            r"SELECT schema_validity_rate, avg_latency_ms, eligible
              FROM eligibility_gates
              WHERE run_id = $1 AND expert_id = $2",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map_or_else(
            EligibilityGate::fresh,
            |(schema_validity_rate, avg_latency_ms, eligible)| EligibilityGate {
                schema_validity_rate,
                avg_latency_ms,
                eligible,
            },
        ))
    }

    /// Write an expert's eligibility gate back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_gate(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        gate: &EligibilityGate,
    ) -> Result<(), StoreError> {
        gate_query(run_id, expert_id, gate).execute(self.pool).await?;
        Ok(())
    }

    /// Write an expert's eligibility gate inside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_gate_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        run_id: &RunId,
        expert_id: &ExpertId,
        gate: &EligibilityGate,
    ) -> Result<(), StoreError> {
        gate_query(run_id, expert_id, gate).execute(&mut **tx).await?;
        Ok(())
    }

    /// Seed bankroll and gate rows for every expert at run start so the
    /// eligible set is complete before any outcomes exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if any insert fails.
    pub async fn seed_expert(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
    ) -> Result<(), StoreError> {
        let fresh = Bankroll::fresh();
        sqlx::query(
            r"INSERT INTO bankroll
                  (run_id, expert_id, current_units, starting_units, peak_units)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (run_id, expert_id) DO NOTHING",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(fresh.current_units)
        .bind(fresh.starting_units)
        .bind(fresh.peak_units)
        .execute(self.pool)
        .await?;
        sqlx::query(
            r"INSERT INTO eligibility_gates (run_id, expert_id)
              VALUES ($1, $2)
              ON CONFLICT (run_id, expert_id) DO NOTHING",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Ids of currently eligible experts in a run, ordered for determinism.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn eligible_experts(&self, run_id: &RunId) -> Result<Vec<ExpertId>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"SELECT expert_id FROM eligibility_gates
              WHERE run_id = $1 AND eligible = TRUE
              ORDER BY expert_id",
        )
        .bind(run_id.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| ExpertId::from(id)).collect())
    }
}

fn bankroll_query<'q>(
    run_id: &'q RunId,
    expert_id: &'q ExpertId,
    bankroll: &Bankroll,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"INSERT INTO bankroll
              (run_id, expert_id, current_units, starting_units, peak_units, updated_at)
          VALUES ($1, $2, $3, $4, $5, now())
          ON CONFLICT (run_id, expert_id)
          DO UPDATE SET current_units = EXCLUDED.current_units,
                        peak_units = EXCLUDED.peak_units,
                        updated_at = now()",
    )
    .bind(run_id.as_str())
    .bind(expert_id.as_str())
    .bind(bankroll.current_units)
    .bind(bankroll.starting_units)
    .bind(bankroll.peak_units)
}

fn gate_query<'q>(
    run_id: &'q RunId,
    expert_id: &'q ExpertId,
    gate: &EligibilityGate,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"INSERT INTO eligibility_gates
              (run_id, expert_id, schema_validity_rate, avg_latency_ms, eligible, updated_at)
          VALUES ($1, $2, $3, $4, $5, now())
          ON CONFLICT (run_id, expert_id)
          DO UPDATE SET schema_validity_rate = EXCLUDED.schema_validity_rate,
                        avg_latency_ms = EXCLUDED.avg_latency_ms,
                        eligible = EXCLUDED.eligible,
                        updated_at = now()",
    )
    .bind(run_id.as_str())
    .bind(expert_id.as_str())
    .bind(gate.schema_validity_rate)
    .bind(gate.avg_latency_ms)
    .bind(gate.eligible)
}
