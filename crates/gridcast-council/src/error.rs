//! Error types for council selection and consensus.

/// Errors that can occur while selecting a council or aggregating.
#[derive(Debug, thiserror::Error)]
pub enum CouncilError {
    /// A data-layer read failed.
    #[error(transparent)]
    Store(#[from] gridcast_store::StoreError),

    /// Expert lookup failed.
    #[error(transparent)]
    Expert(#[from] gridcast_experts::ExpertError),
}
