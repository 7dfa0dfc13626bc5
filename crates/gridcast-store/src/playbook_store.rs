//! Run playbook persistence.
//!
//! One JSON blob per run holding the active policy. Playbooks are written
//! once at run start; a re-insert with the same run id is rejected rather
//! than silently replaced, because the policy must stay constant per run.

use sqlx::PgPool;

use gridcast_types::{RunId, RunPlaybook};

use crate::error::StoreError;

/// Operations on the `run_playbook` table.
pub struct PlaybookStore<'a> {
    pool: &'a PgPool,
}

impl<'a> PlaybookStore<'a> {
    /// Create a playbook store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Persist a validated playbook for a new run.
    ///
    /// Returns `false` when the run already has a playbook (no overwrite).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the playbook fails validation and
    /// [`StoreError::Postgres`] if the insert fails.
    pub async fn create(&self, playbook: &RunPlaybook) -> Result<bool, StoreError> {
        playbook
            .validate()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let value = serde_json::to_value(playbook)?;
        let inserted = sqlx::query(
            r"INSERT INTO run_playbook (run_id, playbook)
              VALUES ($1, $2)
              ON CONFLICT (run_id) DO NOTHING",
        )
        .bind(playbook.run_id.as_str())
        .bind(&value)
        .execute(self.pool)
        .await?
        .rows_affected()
            > 0;

        Ok(inserted)
    }

    /// Load the playbook governing a run.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown run and
    /// [`StoreError::Postgres`] if the query fails.
    pub async fn get(&self, run_id: &RunId) -> Result<RunPlaybook, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as(r"SELECT playbook FROM run_playbook WHERE run_id = $1")
                .bind(run_id.as_str())
                .fetch_optional(self.pool)
                .await?;

        match row {
            Some((value,)) => Ok(serde_json::from_value(value)?),
            None => Err(StoreError::NotFound(format!(
                "no playbook for run {run_id}"
            ))),
        }
    }
}
