//! Expert personalities, temporal decay, and eligibility math for Gridcast.
//!
//! This crate holds everything about an expert that is *pure data and pure
//! functions*: configuration, the decay engine, the personality-adjustment
//! tables, and the bankroll/eligibility math. Persistence and orchestration
//! live elsewhere; nothing here touches I/O.
//!
//! # Modules
//!
//! - [`config`] -- [`ExpertConfig`] and validation
//! - [`registry`] -- The run-scoped expert directory ([`ExpertRegistry`])
//! - [`decay`] -- Exponential aging of memories and learning signals
//! - [`shaping`] -- Bounded personality-adjustment multipliers
//! - [`eligibility`] -- Bankroll state and the schema/latency gate
//! - [`error`] -- [`ExpertError`]

pub mod config;
pub mod decay;
pub mod eligibility;
pub mod error;
pub mod registry;
pub mod shaping;

pub use config::{ExpertConfig, PersonalityTraits, TemporalParams};
pub use decay::{DecayEngine, decay, rank_score};
pub use eligibility::{
    Bankroll, EligibilityGate, GATE_EMA_LAMBDA, LATENCY_THRESHOLD_MS, STARTING_UNITS,
    VALIDITY_THRESHOLD, ema,
};
pub use error::ExpertError;
pub use registry::{BUILTIN_EXPERT_COUNT, ExpertRegistry};
