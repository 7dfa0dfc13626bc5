//! Data layer (`PostgreSQL` + `Dragonfly`) for the Gridcast prediction
//! engine.
//!
//! `PostgreSQL` is the system of record for every per-run entity:
//! memories, bundles, knowledge aggregates, calibration, learned weights,
//! bankrolls, outcomes, playbooks, and the shadow partition. The
//! `Dragonfly` cache holds only short-TTL live briefs. All writes are
//! idempotent on their natural keys; race losers are no-ops.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool and migrations
//! - [`memory_store`] -- Episodic memories + similarity retrieval
//! - [`bundle_store`] -- Prediction bundles and assertions
//! - [`knowledge_store`] -- Team knowledge and matchup memories
//! - [`calibration_store`] -- Beta/EMA calibration buckets
//! - [`weights_store`] -- Learned factor weights
//! - [`bankroll_store`] -- Bankrolls and eligibility gates
//! - [`outcome_store`] -- Graded outcomes and settlement claims
//! - [`shadow_store`] -- The isolated shadow partition
//! - [`playbook_store`] -- Run playbooks
//! - [`briefs`] -- Short-TTL live-brief cache
//! - [`vector`] -- In-process cosine similarity
//! - [`error`] -- [`StoreError`]

pub mod bankroll_store;
pub mod briefs;
pub mod bundle_store;
pub mod calibration_store;
pub mod error;
pub mod knowledge_store;
pub mod memory_store;
pub mod outcome_store;
pub mod playbook_store;
pub mod postgres;
pub mod shadow_store;
pub mod vector;
pub mod weights_store;

pub use bankroll_store::BankrollStore;
pub use briefs::BriefCache;
pub use bundle_store::{BundleStore, BundleWrite};
pub use calibration_store::{CalibrationBucket, CalibrationStore};
pub use error::StoreError;
pub use knowledge_store::KnowledgeStore;
pub use memory_store::{MemoryStore, RetrievalFilters, RetrievalOutcome};
pub use outcome_store::{OutcomeRecord, OutcomeStore};
pub use playbook_store::PlaybookStore;
pub use postgres::{PostgresConfig, PostgresPool};
pub use shadow_store::{ShadowStore, ShadowTelemetry};
pub use vector::cosine_similarity;
pub use weights_store::{LearnedWeights, WeightsStore, clip_weight};
