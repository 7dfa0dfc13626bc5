//! Provenance graph node and edge model.
//!
//! Node keys are stable strings derived from primary-store identifiers, so
//! replaying the same update is idempotent. The graph is a derived view:
//! every key can be traced back to a row in primary storage.

use serde::{Deserialize, Serialize};

use gridcast_types::{
    BundleId, CategoryId, ExpertId, GameId, MemoryId, OutcomeId, PredictionBundle, RunId, TeamId,
};

/// Node labels in the provenance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// An expert personality.
    Expert,
    /// A prediction bundle (decision).
    Decision,
    /// One assertion within a bundle.
    Assertion,
    /// A cited episodic memory.
    Thought,
    /// A team.
    Team,
    /// A graded settlement result.
    Outcome,
}

impl NodeKind {
    /// Stable label used in node keys and the `node_type` column.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Expert => "expert",
            Self::Decision => "decision",
            Self::Assertion => "assertion",
            Self::Thought => "thought",
            Self::Team => "team",
            Self::Outcome => "outcome",
        }
    }
}

/// Edge labels in the provenance graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Expert -> Decision attribution.
    Predicted,
    /// Decision -> Assertion decomposition.
    HasAssertion,
    /// Thought -> Assertion provenance.
    UsedIn,
    /// Team <-> Team head-to-head.
    Faced,
    /// Assertion -> Outcome settlement.
    EvaluatedAs,
}

impl EdgeKind {
    /// Stable label used in the `edge_type` column.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Predicted => "PREDICTED",
            Self::HasAssertion => "HAS_ASSERTION",
            Self::UsedIn => "USED_IN",
            Self::Faced => "FACED",
            Self::EvaluatedAs => "EVALUATED_AS",
        }
    }
}

/// A node to mirror into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Stable key (`<label>:<primary id>`).
    pub key: String,
    /// Node label.
    pub kind: NodeKind,
    /// Experiment scope.
    pub run_id: RunId,
    /// Free-form properties.
    pub properties: serde_json::Value,
}

/// An edge to mirror into the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node key.
    pub from: String,
    /// Target node key.
    pub to: String,
    /// Edge label.
    pub kind: EdgeKind,
    /// Experiment scope.
    pub run_id: RunId,
    /// Free-form properties.
    pub properties: serde_json::Value,
}

/// A batch of nodes and edges applied atomically by the writer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphUpdate {
    /// Nodes to upsert (first).
    pub nodes: Vec<GraphNode>,
    /// Edges to upsert (after their endpoints).
    pub edges: Vec<GraphEdge>,
}

// ---------------------------------------------------------------------------
// Key builders
// ---------------------------------------------------------------------------

/// Key of an expert node.
pub fn expert_key(expert_id: &ExpertId) -> String {
    format!("expert:{expert_id}")
}

/// Key of a decision (bundle) node.
pub fn decision_key(bundle_id: BundleId) -> String {
    format!("decision:{bundle_id}")
}

/// Key of an assertion node.
pub fn assertion_key(bundle_id: BundleId, category_id: &CategoryId) -> String {
    format!("assertion:{bundle_id}:{category_id}")
}

/// Key of a thought (memory) node.
pub fn thought_key(memory_id: MemoryId) -> String {
    format!("thought:{memory_id}")
}

/// Key of a team node.
pub fn team_key(team_id: &TeamId) -> String {
    format!("team:{team_id}")
}

/// Key of an outcome node.
pub fn outcome_key(outcome_id: OutcomeId) -> String {
    format!("outcome:{outcome_id}")
}

// ---------------------------------------------------------------------------
// Update builders
// ---------------------------------------------------------------------------

/// Build the mirror update for a freshly persisted bundle.
///
/// Produces: the expert/decision/team nodes, a `PREDICTED` edge, one
/// assertion node and `HAS_ASSERTION` edge per category, a `USED_IN` edge
/// from every cited thought, and the `FACED` matchup edge.
pub fn bundle_update(bundle: &PredictionBundle, game: Option<(&TeamId, &TeamId)>) -> GraphUpdate {
    let run_id = bundle.run_id.clone();
    let decision = decision_key(bundle.bundle_id);

    let mut update = GraphUpdate::default();
    update.nodes.push(GraphNode {
        key: expert_key(&bundle.expert_id),
        kind: NodeKind::Expert,
        run_id: run_id.clone(),
        properties: serde_json::json!({ "expert_id": bundle.expert_id.as_str() }),
    });
    update.nodes.push(GraphNode {
        key: decision.clone(),
        kind: NodeKind::Decision,
        run_id: run_id.clone(),
        properties: serde_json::json!({
            "game_id": bundle.game_id.as_str(),
            "schema_valid": bundle.schema_valid,
            "model": bundle.model,
        }),
    });
    update.edges.push(GraphEdge {
        from: expert_key(&bundle.expert_id),
        to: decision.clone(),
        kind: EdgeKind::Predicted,
        run_id: run_id.clone(),
        properties: serde_json::json!({ "run_id": run_id.as_str() }),
    });

    for assertion in bundle.assertions.values() {
        let a_key = assertion_key(bundle.bundle_id, &assertion.category_id);
        update.nodes.push(GraphNode {
            key: a_key.clone(),
            kind: NodeKind::Assertion,
            run_id: run_id.clone(),
            properties: serde_json::json!({
                "category_id": assertion.category_id.as_str(),
                "confidence": assertion.confidence,
            }),
        });
        update.edges.push(GraphEdge {
            from: decision.clone(),
            to: a_key.clone(),
            kind: EdgeKind::HasAssertion,
            run_id: run_id.clone(),
            properties: serde_json::Value::Null,
        });
        for memory_id in &assertion.why {
            let t_key = thought_key(*memory_id);
            update.nodes.push(GraphNode {
                key: t_key.clone(),
                kind: NodeKind::Thought,
                run_id: run_id.clone(),
                properties: serde_json::Value::Null,
            });
            update.edges.push(GraphEdge {
                from: t_key,
                to: a_key.clone(),
                kind: EdgeKind::UsedIn,
                run_id: run_id.clone(),
                properties: serde_json::Value::Null,
            });
        }
    }

    if let Some((home, away)) = game {
        update.nodes.push(GraphNode {
            key: team_key(home),
            kind: NodeKind::Team,
            run_id: run_id.clone(),
            properties: serde_json::Value::Null,
        });
        update.nodes.push(GraphNode {
            key: team_key(away),
            kind: NodeKind::Team,
            run_id: run_id.clone(),
            properties: serde_json::Value::Null,
        });
        update.edges.push(GraphEdge {
            from: team_key(home),
            to: team_key(away),
            kind: EdgeKind::Faced,
            run_id,
            properties: serde_json::json!({ "game_id": bundle.game_id.as_str() }),
        });
    }

    update
}

/// Build the mirror update for one graded assertion.
pub fn settlement_update(
    run_id: &RunId,
    bundle_id: BundleId,
    category_id: &CategoryId,
    outcome_id: OutcomeId,
    game_id: &GameId,
    correct: Option<bool>,
    abs_error: Option<f64>,
) -> GraphUpdate {
    let o_key = outcome_key(outcome_id);
    GraphUpdate {
        nodes: vec![GraphNode {
            key: o_key.clone(),
            kind: NodeKind::Outcome,
            run_id: run_id.clone(),
            properties: serde_json::json!({
                "game_id": game_id.as_str(),
                "correct": correct,
                "error": abs_error,
            }),
        }],
        edges: vec![GraphEdge {
            from: assertion_key(bundle_id, category_id),
            to: o_key,
            kind: EdgeKind::EvaluatedAs,
            run_id: run_id.clone(),
            properties: serde_json::Value::Null,
        }],
    }
}
