//! Write-behind provenance graph mirror for the Gridcast prediction
//! engine.
//!
//! The graph records who predicted what and which thoughts backed each
//! claim: `Expert -> Decision -> Assertion <- Thought`, plus `FACED`
//! matchup edges and `EVALUATED_AS` settlement edges. It is strictly a
//! derived view of primary storage -- written behind a bounded queue,
//! possibly lagging by seconds, and repaired by a reconciliation audit
//! whenever the mirror and primary rows disagree.
//!
//! # Modules
//!
//! - [`model`] -- Node/edge model and update builders
//! - [`store`] -- Graph table access
//! - [`writer`] -- The bounded write-behind worker
//! - [`audit`] -- Reconciliation against primary storage
//! - [`error`] -- [`GraphError`]

pub mod audit;
pub mod error;
pub mod model;
pub mod store;
pub mod writer;

pub use audit::{AuditReport, reconcile_game};
pub use error::GraphError;
pub use model::{
    EdgeKind, GraphEdge, GraphNode, GraphUpdate, NodeKind, assertion_key, bundle_update,
    decision_key, expert_key, outcome_key, settlement_update, team_key, thought_key,
};
pub use store::GraphStore;
pub use writer::GraphWriter;
