//! Shared type definitions for the Gridcast prediction engine.
//!
//! This crate is the single source of truth for all types used across the
//! Gridcast workspace. API-facing read models flow downstream to
//! `TypeScript` via `ts-rs` for dashboard consumers.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifier wrappers (string ids + UUID row ids)
//! - [`enums`] -- Enumeration types (prediction typing, families, policies)
//! - [`game`] -- Game records from the external feed
//! - [`category`] -- The immutable 83-entry category registry
//! - [`memory`] -- Episodic memories, team knowledge, matchup memories
//! - [`bundle`] -- Assertions, prediction bundles, shadow assertions
//! - [`context`] -- Context packs handed to bundle generation
//! - [`consensus`] -- Council consensus read models
//! - [`playbook`] -- The explicit per-run configuration mapping

pub mod bundle;
pub mod category;
pub mod consensus;
pub mod context;
pub mod enums;
pub mod game;
pub mod ids;
pub mod memory;
pub mod playbook;

// Re-export primary types at crate root for convenience.
pub use bundle::{
    Assertion, AssertionValue, BundleSummary, PredictionBundle, ShadowAssertion,
};
pub use category::{Category, CategoryRegistry, REGISTRY_SIZE, well_known};
pub use consensus::{CategoryConsensus, ConsensusBundle, Dissent, MemberWeight};
pub use context::{
    CTX_K_MAX, CTX_K_MIN, ContextPack, ContextTelemetry, ExpertPersona, FilterRelaxation,
    GenerationPolicy, Guardrails, LiveBrief, MAX_LIVE_BRIEFS,
};
pub use enums::{
    CategoryFamily, DemotionPolicy, EmotionalState, GameStatus, GenerationMode, MemoryType,
    PayoffSchedule, PredType, Side,
};
pub use game::{FinalScore, Game, InjuryReport, MarketLines, WeatherReport};
pub use ids::{
    BundleId, CategoryId, ExpertId, GameId, MemoryId, OutcomeId, RunId, ShadowRunId, TeamId,
};
pub use memory::{
    EMBEDDING_DIM, EpisodicMemory, MatchupMemory, MemoryEmbeddings, RankedMemory, TeamKnowledge,
};
pub use playbook::{
    DEFAULT_COUNCIL_SIZE, DEFAULT_K_DESIRED, DEFAULT_PER_EXPERT_DEADLINE_MS,
    DEFAULT_REPAIR_MAX_ITERS, DEFAULT_ROLLING_WINDOW_WEEKS, PlaybookError, RunPlaybook,
    ToolBudget,
};

#[cfg(test)]
mod tests {
    //! Binding generation smoke test for `TypeScript` exports.

    #[test]
    fn export_bindings() {
        use ts_rs::TS;

        let _ = crate::ids::RunId::export_all();
        let _ = crate::ids::ExpertId::export_all();
        let _ = crate::ids::GameId::export_all();
        let _ = crate::ids::TeamId::export_all();
        let _ = crate::ids::CategoryId::export_all();
        let _ = crate::ids::MemoryId::export_all();
        let _ = crate::ids::BundleId::export_all();

        let _ = crate::enums::PredType::export_all();
        let _ = crate::enums::CategoryFamily::export_all();
        let _ = crate::enums::GameStatus::export_all();
        let _ = crate::enums::Side::export_all();
        let _ = crate::enums::MemoryType::export_all();
        let _ = crate::enums::GenerationMode::export_all();

        let _ = crate::game::Game::export_all();
        let _ = crate::game::MarketLines::export_all();
        let _ = crate::game::FinalScore::export_all();

        let _ = crate::category::Category::export_all();
        let _ = crate::category::CategoryRegistry::export_all();

        let _ = crate::bundle::Assertion::export_all();
        let _ = crate::bundle::PredictionBundle::export_all();

        let _ = crate::consensus::ConsensusBundle::export_all();
        let _ = crate::consensus::CategoryConsensus::export_all();

        let _ = crate::playbook::RunPlaybook::export_all();
        let _ = crate::playbook::ToolBudget::export_all();
    }
}
