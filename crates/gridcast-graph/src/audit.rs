//! Graph reconciliation audit.
//!
//! Walks primary storage and repairs the mirror: every persisted bundle
//! must have its decision/assertion nodes and edges, and every memory id
//! cited in a `why` list must exist as a `Thought` node linked by
//! `USED_IN`. Missing pieces are re-derived from primary rows and
//! re-applied (idempotently). The graph is never treated as truth.

use sqlx::PgPool;

use gridcast_store::bundle_store::BundleStore;
use gridcast_types::{GameId, RunId};

use crate::error::GraphError;
use crate::model::{assertion_key, bundle_update, thought_key};
use crate::store::GraphStore;

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Bundles walked.
    pub bundles_checked: usize,
    /// Assertions walked.
    pub assertions_checked: usize,
    /// Cited memories verified.
    pub citations_checked: usize,
    /// Bundles whose mirror was incomplete and re-applied.
    pub repaired: usize,
}

/// Reconcile the graph mirror for one game's bundles.
///
/// # Errors
///
/// Returns [`GraphError`] if primary reads or mirror writes fail.
pub async fn reconcile_game(
    pool: &PgPool,
    run_id: &RunId,
    game_id: &GameId,
) -> Result<AuditReport, GraphError> {
    let bundles = BundleStore::new(pool).for_game(run_id, game_id).await?;
    let graph = GraphStore::new(pool);

    let mut report = AuditReport::default();

    for bundle in &bundles {
        report.bundles_checked = report.bundles_checked.saturating_add(1);
        let mut intact = true;

        for assertion in bundle.assertions.values() {
            report.assertions_checked = report.assertions_checked.saturating_add(1);
            let a_key = assertion_key(bundle.bundle_id, &assertion.category_id);
            if !graph.node_exists(&a_key).await? {
                intact = false;
            }
            for memory_id in &assertion.why {
                report.citations_checked = report.citations_checked.saturating_add(1);
                let t_key = thought_key(*memory_id);
                if !graph.node_exists(&t_key).await?
                    || !graph
                        .edge_exists(&t_key, &a_key, crate::model::EdgeKind::UsedIn)
                        .await?
                {
                    intact = false;
                }
            }
        }

        if !intact {
            // Re-derive the whole mirror for this bundle from the primary
            // row; upserts make the repair idempotent.
            graph.apply(&bundle_update(bundle, None)).await?;
            report.repaired = report.repaired.saturating_add(1);
            tracing::info!(
                run_id = %run_id,
                game_id = %game_id,
                bundle_id = %bundle.bundle_id,
                "graph mirror repaired"
            );
        }
    }

    Ok(report)
}
