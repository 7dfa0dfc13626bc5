//! Calibration bucket persistence.
//!
//! One bucket per `(run, expert, category)`: a Beta(alpha, beta) posterior
//! for binary/enum accuracy and an EMA(mean, stdev) for numeric error.
//! Buckets are mutated only by settlement, which holds the per-game
//! single-writer lock, so upserts here need no extra locking.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use gridcast_types::{CategoryId, ExpertId, RunId};

use crate::error::StoreError;

/// Initial pseudo-count mass for the Beta prior (alpha = beta = 1).
pub const BETA_PRIOR_MASS: f64 = 2.0;

/// One calibration bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBucket {
    /// Experiment scope.
    pub run_id: RunId,
    /// The expert.
    pub expert_id: ExpertId,
    /// The category.
    pub category_id: CategoryId,
    /// Beta posterior success count (starts at 1).
    pub alpha: f64,
    /// Beta posterior failure count (starts at 1).
    pub beta: f64,
    /// EMA of absolute numeric error.
    pub ema_mean: f64,
    /// EMA standard deviation of numeric error.
    pub ema_stdev: f64,
    /// Number of outcomes folded in.
    pub samples: i64,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl CalibrationBucket {
    /// A fresh bucket with a uniform Beta prior and a domain-derived EMA
    /// prior (e.g. total points mean 45, stdev 12 comes from the category).
    pub fn fresh(
        run_id: RunId,
        expert_id: ExpertId,
        category_id: CategoryId,
        prior_mean: f64,
        prior_stdev: f64,
    ) -> Self {
        Self {
            run_id,
            expert_id,
            category_id,
            alpha: 1.0,
            beta: 1.0,
            ema_mean: prior_mean,
            ema_stdev: prior_stdev,
            samples: 0,
            updated_at: Utc::now(),
        }
    }

    /// Posterior mean accuracy for binary/enum categories.
    pub fn accuracy(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total <= 0.0 { 0.5 } else { self.alpha / total }
    }
}

/// Operations on the `calibration_buckets` table.
pub struct CalibrationStore<'a> {
    pool: &'a PgPool,
}

impl<'a> CalibrationStore<'a> {
    /// Create a calibration store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a bucket, or `None` when the pair has no history yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn get(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
        category_id: &CategoryId,
    ) -> Result<Option<CalibrationBucket>, StoreError> {
        let row = sqlx::query_as::<_, BucketRow>(
            r"SELECT run_id, expert_id, category_id, alpha, beta, ema_mean,
                     ema_stdev, samples, updated_at
              FROM calibration_buckets
              WHERE run_id = $1 AND expert_id = $2 AND category_id = $3",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .bind(category_id.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(BucketRow::into_bucket))
    }

    /// All buckets for one expert within a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the query fails.
    pub async fn for_expert(
        &self,
        run_id: &RunId,
        expert_id: &ExpertId,
    ) -> Result<Vec<CalibrationBucket>, StoreError> {
        let rows = sqlx::query_as::<_, BucketRow>(
            r"SELECT run_id, expert_id, category_id, alpha, beta, ema_mean,
                     ema_stdev, samples, updated_at
              FROM calibration_buckets
              WHERE run_id = $1 AND expert_id = $2
              ORDER BY category_id",
        )
        .bind(run_id.as_str())
        .bind(expert_id.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(BucketRow::into_bucket).collect())
    }

    /// Write a bucket back inside a settlement transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        bucket: &CalibrationBucket,
    ) -> Result<(), StoreError> {
        Self::upsert_query(bucket).execute(&mut **tx).await?;
        Ok(())
    }

    /// Write a bucket back, inserting or overwriting the unique row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, bucket: &CalibrationBucket) -> Result<(), StoreError> {
        Self::upsert_query(bucket).execute(self.pool).await?;
        Ok(())
    }

    fn upsert_query(
        bucket: &CalibrationBucket,
    ) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
        sqlx::query(
            r"INSERT INTO calibration_buckets
                  (run_id, expert_id, category_id, alpha, beta, ema_mean,
                   ema_stdev, samples, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
              ON CONFLICT (run_id, expert_id, category_id)
              DO UPDATE SET alpha = EXCLUDED.alpha,
                            beta = EXCLUDED.beta,
                            ema_mean = EXCLUDED.ema_mean,
                            ema_stdev = EXCLUDED.ema_stdev,
                            samples = EXCLUDED.samples,
                            updated_at = EXCLUDED.updated_at",
        )
        .bind(bucket.run_id.as_str())
        .bind(bucket.expert_id.as_str())
        .bind(bucket.category_id.as_str())
        .bind(bucket.alpha)
        .bind(bucket.beta)
        .bind(bucket.ema_mean)
        .bind(bucket.ema_stdev)
        .bind(bucket.samples)
        .bind(bucket.updated_at)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BucketRow {
    run_id: String,
    expert_id: String,
    category_id: String,
    alpha: f64,
    beta: f64,
    ema_mean: f64,
    ema_stdev: f64,
    samples: i64,
    updated_at: DateTime<Utc>,
}

impl BucketRow {
    fn into_bucket(self) -> CalibrationBucket {
        CalibrationBucket {
            run_id: RunId::from(self.run_id),
            expert_id: ExpertId::from(self.expert_id),
            category_id: CategoryId::from(self.category_id),
            alpha: self.alpha,
            beta: self.beta,
            ema_mean: self.ema_mean,
            ema_stdev: self.ema_stdev,
            samples: self.samples,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_has_uniform_prior() {
        let bucket = CalibrationBucket::fresh(
            RunId::new("r1"),
            ExpertId::new("statistics_purist"),
            CategoryId::new("winner"),
            0.0,
            0.0,
        );
        assert!((bucket.alpha - 1.0).abs() < f64::EPSILON);
        assert!((bucket.beta - 1.0).abs() < f64::EPSILON);
        assert!((bucket.accuracy() - 0.5).abs() < f64::EPSILON);
        assert_eq!(bucket.samples, 0);
    }

    #[test]
    fn accuracy_is_posterior_mean() {
        let mut bucket = CalibrationBucket::fresh(
            RunId::new("r1"),
            ExpertId::new("statistics_purist"),
            CategoryId::new("winner"),
            0.0,
            0.0,
        );
        bucket.alpha = 7.0;
        bucket.beta = 3.0;
        assert!((bucket.accuracy() - 0.7).abs() < 1e-12);
    }
}
