//! Error types for the data layer.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors with context about the failing operation.

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis cache operation failed.
    #[error("Dragonfly error: {0}")]
    Cache(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A write targeted the shadow partition from the hot path, or vice
    /// versa. This is a correctness bug, not a transient failure.
    #[error("shadow isolation violation: {0}")]
    ShadowIsolation(String),
}
