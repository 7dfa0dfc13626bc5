//! Council selection: rolling composite ranking over eligible experts.
//!
//! The composite selection score is
//!
//! ```text
//! sel = 0.35*acc_overall + 0.25*recent_trend + 0.20*consistency
//!     + 0.10*calibration + 0.10*specialisation
//! ```
//!
//! Ineligible experts are excluded before ranking. Ties break
//! deterministically: score descending, accuracy descending, expert id
//! ascending.

use sqlx::PgPool;

use gridcast_store::{BankrollStore, OutcomeStore, StoreError};
use gridcast_types::{CategoryRegistry, ExpertId, Game, RunId};

use crate::stats::{ExpertWindowStats, specialisation, window_stats};

/// Weight on overall accuracy in the composite score.
const W_ACCURACY: f64 = 0.35;
/// Weight on the recent trend.
const W_TREND: f64 = 0.25;
/// Weight on consistency.
const W_CONSISTENCY: f64 = 0.20;
/// Weight on calibration.
const W_CALIBRATION: f64 = 0.10;
/// Weight on game specialisation.
const W_SPECIALISATION: f64 = 0.10;

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedExpert {
    /// The expert.
    pub expert_id: ExpertId,
    /// Composite selection score.
    pub score: f64,
    /// The expert's window stats (reused by consensus weighting).
    pub stats: ExpertWindowStats,
    /// Game-specific specialisation component.
    pub specialisation: f64,
}

/// Composite selection score for one candidate.
pub fn selection_score(stats: &ExpertWindowStats, specialisation: f64) -> f64 {
    W_ACCURACY * stats.acc_overall
        + W_TREND * stats.recent_trend
        + W_CONSISTENCY * stats.consistency
        + W_CALIBRATION * stats.calibration
        + W_SPECIALISATION * specialisation
}

/// Rank candidates and take the top N with deterministic tie-breaks.
pub fn rank_candidates(mut candidates: Vec<RankedExpert>, n: usize) -> Vec<RankedExpert> {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.stats.acc_overall.total_cmp(&a.stats.acc_overall))
            .then_with(|| a.expert_id.cmp(&b.expert_id))
    });
    candidates.truncate(n);
    candidates
}

/// Selects the council for one game from persisted state.
pub struct CouncilSelector<'a> {
    pool: &'a PgPool,
}

impl<'a> CouncilSelector<'a> {
    /// Create a selector bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Select the top `council_size` eligible experts for a game over
    /// the rolling window ending at the week before the game.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any read fails.
    pub async fn select(
        &self,
        run_id: &RunId,
        game: &Game,
        registry: &CategoryRegistry,
        council_size: usize,
        window_weeks: u8,
    ) -> Result<Vec<RankedExpert>, StoreError> {
        let eligible = BankrollStore::new(self.pool).eligible_experts(run_id).await?;

        let week_hi = game.week.saturating_sub(1).max(1);
        let week_lo = week_hi.saturating_sub(window_weeks.saturating_sub(1)).max(1);

        let outcome_store = OutcomeStore::new(self.pool);
        let mut candidates = Vec::with_capacity(eligible.len());
        for expert_id in eligible {
            let outcomes = outcome_store
                .window(run_id, &expert_id, game.season, week_lo, week_hi)
                .await?;
            let stats = window_stats(expert_id.clone(), &outcomes, registry);
            let spec = specialisation(&stats, game);
            let score = selection_score(&stats, spec);
            candidates.push(RankedExpert {
                expert_id,
                score,
                stats,
                specialisation: spec,
            });
        }

        let council = rank_candidates(candidates, council_size);
        tracing::info!(
            run_id = %run_id,
            game_id = %game.game_id,
            council = ?council.iter().map(|c| c.expert_id.as_str()).collect::<Vec<_>>(),
            "council selected"
        );
        Ok(council)
    }
}
