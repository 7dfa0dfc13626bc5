//! Learned factor weight persistence.
//!
//! Weights are per-`(run, expert)` multiplicative adjustments on the
//! expert's analytical-focus factors, learnt by belief revision and
//! clipped to `[0.5, 1.5]`. Unset factors read as 1.0.

use std::collections::BTreeMap;

use sqlx::PgPool;

use gridcast_types::{ExpertId, RunId};

use crate::error::StoreError;

/// Lower clip bound for a learned weight.
pub const WEIGHT_FLOOR: f64 = 0.5;

/// Upper clip bound for a learned weight.
pub const WEIGHT_CEIL: f64 = 1.5;

/// The learned factor weights of one expert within a run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LearnedWeights {
    weights: BTreeMap<String, f64>,
}

impl LearnedWeights {
    /// Weights from a factor map, clipping every entry into bounds.
    pub fn from_map(weights: BTreeMap<String, f64>) -> Self {
        let weights = weights
            .into_iter()
            .map(|(factor, w)| (factor, clip_weight(w)))
            .collect();
        Self { weights }
    }

    /// The multiplier for a factor (1.0 when never adjusted).
    pub fn get(&self, factor: &str) -> f64 {
        self.weights.get(factor).copied().unwrap_or(1.0)
    }

    /// Multiply a factor's weight by `multiplier` and clip the result.
    pub fn adjust(&mut self, factor: &str, multiplier: f64) {
        let current = self.get(factor);
        self.weights
            .insert(factor.to_owned(), clip_weight(current * multiplier));
    }

    /// Iterate all explicitly stored factors.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, &v)| (k.as_str(), v))
    }

    /// The underlying map (for serialization).
    pub const fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }
}

/// Clip a weight into the legal `[0.5, 1.5]` interval.
pub fn clip_weight(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.clamp(WEIGHT_FLOOR, WEIGHT_CEIL)
    } else {
        1.0
    }
}

/// Operations on the `learned_weights` table.
pub struct WeightsStore<'a> {
    pool: &'a PgPool,
}

impl<'a> WeightsStore<'a> {
    /// Create a weights store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an expert's learned weights (empty when never adjusted).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn get(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
    ) -> Result<LearnedWeights, StoreError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r"SELECT weights FROM learned_weights
              WHERE run_id = $1 AND expert_id = $2",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some((value,)) => {
                let map: BTreeMap<String, f64> = serde_json::from_value(value)?;
                Ok(LearnedWeights::from_map(map))
            }
            None => Ok(LearnedWeights::default()),
        }
    }

    /// Write an expert's learned weights back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        weights: &LearnedWeights,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(weights.as_map())?;
        upsert_query(run_id, expert_id, &value)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Write an expert's learned weights inside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        run_id: &RunId,
        expert_id: &ExpertId,
        weights: &LearnedWeights,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(weights.as_map())?;
        upsert_query(run_id, expert_id, &value)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

fn upsert_query<'q>(
    run_id: &'q RunId,
    expert_id: &'q ExpertId,
    value: &'q serde_json::Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"INSERT INTO learned_weights (run_id, expert_id, weights, updated_at)
          VALUES ($1, $2, $3, now())
          ON CONFLICT (run_id, expert_id)
          DO UPDATE SET weights = EXCLUDED.weights, updated_at = now()",
    )
    .bind(run_id.as_str())
    .bind(expert_id.as_str())
    .bind(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_factor_reads_as_identity() {
        let weights = LearnedWeights::default();
        assert!((weights.get("momentum") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn adjust_multiplies_and_clips() {
        let mut weights = LearnedWeights::default();
        weights.adjust("momentum", 1.2);
        assert!((weights.get("momentum") - 1.2).abs() < 1e-12);

        for _ in 0..10 {
            weights.adjust("momentum", 1.2);
        }
        assert!((weights.get("momentum") - WEIGHT_CEIL).abs() < 1e-12);

        for _ in 0..20 {
            weights.adjust("momentum", 0.7);
        }
        assert!((weights.get("momentum") - WEIGHT_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn from_map_clips_out_of_bounds_entries() {
        let map = BTreeMap::from([
            (String::from("weather"), 3.0),
            (String::from("injuries"), 0.1),
        ]);
        let weights = LearnedWeights::from_map(map);
        assert!((weights.get("weather") - WEIGHT_CEIL).abs() < 1e-12);
        assert!((weights.get("injuries") - WEIGHT_FLOOR).abs() < 1e-12);
    }

    #[test]
    fn non_finite_weight_reads_as_identity() {
        assert!((clip_weight(f64::NAN) - 1.0).abs() < f64::EPSILON);
    }
}
