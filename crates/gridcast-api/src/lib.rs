//! HTTP API surface (Axum) for the Gridcast prediction engine.
//!
//! Exposes the five interface groups: context packs, predictions,
//! council consensus, outcomes, and the isolated shadow endpoints.
//! Consumers always receive either a complete payload or an explicit
//! degraded indicator -- never half-built data.
//!
//! # Modules
//!
//! - [`state`] -- Shared [`AppState`] and the pluggable game source
//! - [`handlers`] -- Endpoint handlers
//! - [`router`] -- Route table and middleware
//! - [`server`] -- Bind-and-serve bootstrap
//! - [`error`] -- [`ApiError`] with its HTTP mapping

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::serve;
pub use state::{AppState, GameSource, InMemoryGames};
