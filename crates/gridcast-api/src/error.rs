//! Error types for the API layer.
//!
//! [`ApiError`] unifies all failure modes into a single enum that
//! converts into an HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation,
//! following the error taxonomy: unknown references are client errors
//! with no state mutated, degraded results are not errors at all (they
//! are flagged payloads), and isolation violations are fatal.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use gridcast_experts::ExpertError;
use gridcast_store::StoreError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request references an unknown run.
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// A request payload was invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Expert lookup or configuration failure.
    #[error(transparent)]
    Expert(#[from] ExpertError),

    /// A data-layer operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] gridcast_engine::EngineError),

    /// A settlement operation failed.
    #[error(transparent)]
    Settle(#[from] gridcast_settle::SettleError),

    /// A council operation failed.
    #[error(transparent)]
    Council(#[from] gridcast_council::CouncilError),

    /// A serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) | Self::UnknownRun(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Expert(ExpertError::UnknownExpert(_)) => StatusCode::NOT_FOUND,
            Self::Expert(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::ShadowIsolation(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Settle(gridcast_settle::SettleError::GameNotFinal(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Store(_)
            | Self::Engine(_)
            | Self::Settle(_)
            | Self::Council(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
