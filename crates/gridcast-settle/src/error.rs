//! Error types for outcome ingestion.

use gridcast_types::GameId;

/// Errors that can occur during settlement.
#[derive(Debug, thiserror::Error)]
pub enum SettleError {
    /// A data-layer operation failed.
    #[error(transparent)]
    Store(#[from] gridcast_store::StoreError),

    /// A graph mirror operation failed.
    #[error(transparent)]
    Graph(#[from] gridcast_graph::GraphError),

    /// A database operation failed.
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// The game is not final (no score to grade against).
    #[error("game {0} is not final")]
    GameNotFinal(GameId),
}
