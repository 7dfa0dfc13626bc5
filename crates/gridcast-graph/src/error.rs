//! Error types for the provenance graph.

/// Errors that can occur in the graph layer.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A `PostgreSQL` operation failed.
    #[error("graph PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A serialization or deserialization error.
    #[error("graph serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A primary-store read during reconciliation failed.
    #[error("graph audit read error: {0}")]
    Audit(#[from] gridcast_store::StoreError),

    /// Stored graph data does not match the model.
    #[error("graph corrupt: {0}")]
    Corrupt(String),

    /// The write-behind channel is closed (worker gone).
    #[error("graph writer unavailable")]
    WriterUnavailable,
}
