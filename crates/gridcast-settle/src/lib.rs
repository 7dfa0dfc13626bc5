//! Outcome ingestion, calibration, and belief revision for Gridcast.
//!
//! When a game goes final, this crate grades every eligible bundle,
//! updates per-category calibration (Beta posteriors and lag-discounted
//! error EMAs), adjusts learned factor weights within bounds, forms one
//! learning memory per expert, settles virtual stakes, and refreshes the
//! eligibility gates -- all inside one single-writer transaction per
//! `(run, game)`.
//!
//! # Modules
//!
//! - [`grading`] -- Actual derivation and per-assertion grading
//! - [`calibration`] -- Beta and EMA bucket updates
//! - [`revision`] -- Bounded factor-weight revision
//! - [`memories`] -- Learning memory formation
//! - [`bankroll`] -- Stake payoff schedules
//! - [`ingest`] -- The settlement pipeline ([`OutcomeIngestor`])
//! - [`error`] -- [`SettleError`]

pub mod bankroll;
pub mod calibration;
pub mod error;
pub mod grading;
pub mod ingest;
pub mod memories;
pub mod revision;

pub use bankroll::settle_stake;
pub use calibration::{LAMBDA_BASE, apply_grade};
pub use error::SettleError;
pub use grading::{Grade, ResolvedValues, derive_actuals, grade};
pub use ingest::{OutcomeIngestor, SettlementReport};
pub use memories::{GradeTally, learning_memory};
pub use revision::{ETA_DEFAULT, revise};
