//! Graph table access.
//!
//! Upserts are `ON CONFLICT DO NOTHING` so replays and reconciliation
//! repairs are idempotent. Readers get trails and relationship queries;
//! anything needing exactness must go to primary storage.

use sqlx::PgPool;

use gridcast_types::RunId;

use crate::error::GraphError;
use crate::model::{EdgeKind, GraphEdge, GraphNode, GraphUpdate};

/// Operations on the `graph_nodes` and `graph_edges` tables.
pub struct GraphStore<'a> {
    pool: &'a PgPool,
}

impl<'a> GraphStore<'a> {
    /// Create a graph store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Apply one update batch in a transaction (nodes before edges).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Postgres`] if any statement fails.
    pub async fn apply(&self, update: &GraphUpdate) -> Result<(), GraphError> {
        let mut tx = self.pool.begin().await?;

        for node in &update.nodes {
            sqlx::query(
                r"INSERT INTO graph_nodes (node_key, node_type, run_id, properties)
                  VALUES ($1, $2, $3, $4)
                  ON CONFLICT (node_key) DO NOTHING",
            )
            .bind(&node.key)
            .bind(node.kind.label())
            .bind(node.run_id.as_str())
            .bind(&node.properties)
            .execute(&mut *tx)
            .await?;
        }

        for edge in &update.edges {
            sqlx::query(
                r"INSERT INTO graph_edges (from_key, to_key, edge_type, run_id, properties)
                  VALUES ($1, $2, $3, $4, $5)
                  ON CONFLICT (from_key, to_key, edge_type) DO NOTHING",
            )
            .bind(&edge.from)
            .bind(&edge.to)
            .bind(edge.kind.label())
            .bind(edge.run_id.as_str())
            .bind(&edge.properties)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Whether a node exists.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Postgres`] if the query fails.
    pub async fn node_exists(&self, key: &str) -> Result<bool, GraphError> {
        let row: Option<(String,)> =
            sqlx::query_as(r"SELECT node_key FROM graph_nodes WHERE node_key = $1")
                .bind(key)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Whether an edge exists.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Postgres`] if the query fails.
    pub async fn edge_exists(
        &self,
        from: &str,
        to: &str,
        kind: EdgeKind,
    ) -> Result<bool, GraphError> {
        let row: Option<(String,)> = sqlx::query_as(
            r"SELECT from_key FROM graph_edges
              WHERE from_key = $1 AND to_key = $2 AND edge_type = $3",
        )
        .bind(from)
        .bind(to)
        .bind(kind.label())
        .fetch_optional(self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Outgoing edges of a node, optionally filtered by kind.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Postgres`] if the query fails.
    pub async fn edges_from(
        &self,
        from: &str,
        kind: Option<EdgeKind>,
    ) -> Result<Vec<GraphEdge>, GraphError> {
        let rows = sqlx::query_as::<_, EdgeRow>(
            r"SELECT from_key, to_key, edge_type, run_id, properties
              FROM graph_edges
              WHERE from_key = $1 AND ($2::TEXT IS NULL OR edge_type = $2)
              ORDER BY to_key, edge_type",
        )
        .bind(from)
        .bind(kind.map(EdgeKind::label))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    /// Assertion nodes of a run that cite thoughts without a `USED_IN`
    /// edge in place -- the orphan-detection query behind the audit.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Postgres`] if the query fails.
    pub async fn nodes_of_type(
        &self,
        run_id: &RunId,
        node_type: &str,
    ) -> Result<Vec<GraphNode>, GraphError> {
        let rows = sqlx::query_as::<_, NodeRow>(
            r"SELECT node_key, node_type, run_id, properties
              FROM graph_nodes
              WHERE run_id = $1 AND node_type = $2
              ORDER BY node_key",
        )
        .bind(run_id.as_str())
        .bind(node_type)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(NodeRow::into_node).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    node_key: String,
    node_type: String,
    run_id: String,
    properties: serde_json::Value,
}

impl NodeRow {
    fn into_node(self) -> Result<GraphNode, GraphError> {
        let kind = serde_json::from_value(serde_json::Value::String(self.node_type))
            .map_err(GraphError::Serialization)?;
        Ok(GraphNode {
            key: self.node_key,
            kind,
            run_id: RunId::from(self.run_id),
            properties: self.properties,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EdgeRow {
    from_key: String,
    to_key: String,
    edge_type: String,
    run_id: String,
    properties: serde_json::Value,
}

impl EdgeRow {
    fn into_edge(self) -> Result<GraphEdge, GraphError> {
        let kind = match self.edge_type.as_str() {
            "PREDICTED" => EdgeKind::Predicted,
            "HAS_ASSERTION" => EdgeKind::HasAssertion,
            "USED_IN" => EdgeKind::UsedIn,
            "FACED" => EdgeKind::Faced,
            "EVALUATED_AS" => EdgeKind::EvaluatedAs,
            other => {
                return Err(GraphError::Corrupt(format!("unknown edge type: {other}")));
            }
        };
        Ok(GraphEdge {
            from: self.from_key,
            to: self.to_key,
            kind,
            run_id: RunId::from(self.run_id),
            properties: self.properties,
        })
    }
}
