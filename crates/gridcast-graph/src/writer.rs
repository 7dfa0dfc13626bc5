//! The write-behind graph worker.
//!
//! Producers enqueue [`GraphUpdate`] batches on a bounded channel and
//! return immediately; a background task drains the channel into the
//! graph tables. The mirror may lag primary storage by seconds, and
//! readers must not assume read-your-writes against it. A full channel
//! drops the update with a warning rather than blocking the hot path --
//! the reconciliation audit repairs any gap.

use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::GraphError;
use crate::model::GraphUpdate;
use crate::store::GraphStore;

/// Default bound of the write-behind channel.
const DEFAULT_QUEUE_DEPTH: usize = 1_024;

/// Handle used by producers to enqueue graph updates.
#[derive(Clone)]
pub struct GraphWriter {
    sender: mpsc::Sender<GraphUpdate>,
}

impl GraphWriter {
    /// Spawn the write-behind worker and return the producer handle plus
    /// the worker's join handle (for graceful shutdown).
    pub fn spawn(pool: PgPool) -> (Self, JoinHandle<()>) {
        Self::spawn_with_depth(pool, DEFAULT_QUEUE_DEPTH)
    }

    /// Spawn with an explicit queue depth.
    pub fn spawn_with_depth(pool: PgPool, depth: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<GraphUpdate>(depth.max(1));

        let handle = tokio::spawn(async move {
            while let Some(update) = receiver.recv().await {
                let store = GraphStore::new(&pool);
                if let Err(error) = store.apply(&update).await {
                    tracing::warn!(
                        %error,
                        nodes = update.nodes.len(),
                        edges = update.edges.len(),
                        "graph write-behind apply failed; audit will repair"
                    );
                }
            }
            tracing::debug!("graph write-behind worker stopped");
        });

        (Self { sender }, handle)
    }

    /// Enqueue an update without blocking.
    ///
    /// A full queue drops the update (the audit repairs the gap); a
    /// closed queue is reported so callers can surface worker death.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::WriterUnavailable`] when the worker is gone.
    pub fn enqueue(&self, update: GraphUpdate) -> Result<(), GraphError> {
        if update.nodes.is_empty() && update.edges.is_empty() {
            return Ok(());
        }
        match self.sender.try_send(update) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    nodes = dropped.nodes.len(),
                    edges = dropped.edges.len(),
                    "graph queue full; dropping update for audit repair"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GraphError::WriterUnavailable),
        }
    }

    /// Close the producer side so the worker drains and stops.
    pub fn close(self) {
        drop(self.sender);
    }
}

#[cfg(test)]
mod tests {
    use gridcast_types::RunId;

    use super::*;
    use crate::model::{GraphNode, NodeKind};

    fn node_update() -> GraphUpdate {
        GraphUpdate {
            nodes: vec![GraphNode {
                key: String::from("expert:x"),
                kind: NodeKind::Expert,
                run_id: RunId::new("r1"),
                properties: serde_json::Value::Null,
            }],
            edges: Vec::new(),
        }
    }

    #[tokio::test]
    async fn empty_updates_are_not_enqueued() {
        let (sender, mut receiver) = mpsc::channel::<GraphUpdate>(4);
        let writer = GraphWriter { sender };
        assert!(writer.enqueue(GraphUpdate::default()).is_ok());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_without_error() {
        let (sender, _receiver) = mpsc::channel::<GraphUpdate>(1);
        let writer = GraphWriter { sender };
        assert!(writer.enqueue(node_update()).is_ok());
        // Queue is now full; the next enqueue drops but succeeds.
        assert!(writer.enqueue(node_update()).is_ok());
    }

    #[tokio::test]
    async fn closed_queue_reports_writer_unavailable() {
        let (sender, receiver) = mpsc::channel::<GraphUpdate>(1);
        drop(receiver);
        let writer = GraphWriter { sender };
        assert!(matches!(
            writer.enqueue(node_update()),
            Err(GraphError::WriterUnavailable)
        ));
    }
}
