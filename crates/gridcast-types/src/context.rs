//! Context packs: the immutable input packet handed to bundle generation.
//!
//! A pack is built once per `(run, expert, game)` and contains everything
//! the generator is allowed to see: retrieved memories, the category
//! registry, the expert's persona and guardrails, the generation policy,
//! and optional short-TTL live briefs.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::category::CategoryRegistry;
use crate::enums::GenerationMode;
use crate::game::Game;
use crate::ids::{ExpertId, RunId};
use crate::memory::RankedMemory;
use crate::playbook::ToolBudget;

/// Minimum number of retrieved memories for a non-degraded pack.
pub const CTX_K_MIN: usize = 10;

/// Maximum number of retrieved memories in a pack.
pub const CTX_K_MAX: usize = 20;

/// Maximum number of live briefs attached to a pack.
pub const MAX_LIVE_BRIEFS: usize = 8;

/// A filter dropped during retrieval to reach the minimum candidate count.
///
/// Relaxations apply in a fixed order; each one performed is recorded so
/// telemetry can count `K_reductions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRelaxation {
    /// The recency window filter was dropped.
    RecencyWindow,
    /// The category-family filter was dropped.
    Family,
    /// The team filters were dropped.
    Team,
}

/// The expert's presentation and behavioral framing for prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertPersona {
    /// The expert.
    pub expert_id: ExpertId,
    /// Human-facing name (e.g. "The Analyst").
    pub display_name: String,
    /// Personality tag (e.g. `conservative`, `contrarian`).
    pub personality: String,
    /// Short self-description injected into the system prompt.
    pub voice: String,
}

/// Hard limits the generator must respect for this expert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guardrails {
    /// Maximum stake per assertion, in bankroll units.
    pub stake_cap: Decimal,
    /// Maximum total stake per game.
    pub total_stake_cap: Decimal,
    /// Tool call and time budget.
    pub tool_budget: ToolBudget,
    /// Risk profile tag surfaced in prompts (`cautious`, `aggressive`, ...).
    pub risk_profile: String,
}

/// Generation policy resolved from the run playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPolicy {
    /// One-shot or deliberate.
    pub mode: GenerationMode,
    /// Model used for drafts.
    pub draft_model: String,
    /// Model used for critic passes.
    pub critic_model: String,
    /// Maximum repair iterations (0-2).
    pub repair_max_iters: u8,
}

/// A short-lived news or market brief from the hot cache.
///
/// Briefs are advisory context only and never system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveBrief {
    /// Source tag (`news`, `market`, `injury`).
    pub source: String,
    /// Brief text.
    pub text: String,
    /// When the brief was cached.
    pub cached_at: DateTime<Utc>,
}

/// Retrieval telemetry captured during pack assembly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextTelemetry {
    /// Effective number of memories in the pack.
    pub ctx_k: usize,
    /// p95 of vector retrieval latency across the pack's queries.
    pub vector_p95_ms: f64,
    /// Number of filter relaxations performed.
    pub k_reductions: usize,
}

/// The immutable input packet for one `(run, expert, game)` build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPack {
    /// Experiment scope.
    pub run_id: RunId,
    /// Target expert.
    pub expert_id: ExpertId,
    /// The game to predict.
    pub game: Game,
    /// Retrieved memories, best rank first.
    pub memories: Vec<RankedMemory>,
    /// The 83-entry category registry.
    pub registry: CategoryRegistry,
    /// Persona framing.
    pub persona: ExpertPersona,
    /// Hard limits.
    pub guardrails: Guardrails,
    /// Generation policy.
    pub policy: GenerationPolicy,
    /// Live briefs (at most [`MAX_LIVE_BRIEFS`]).
    pub live_briefs: Vec<LiveBrief>,
    /// True when fewer than [`CTX_K_MIN`] memories survived even after all
    /// relaxations.
    pub degraded: bool,
    /// Relaxations performed, in order.
    pub relaxations: Vec<FilterRelaxation>,
    /// Retrieval telemetry.
    pub telemetry: ContextTelemetry,
    /// When the pack was assembled.
    pub built_at: DateTime<Utc>,
}

impl ContextPack {
    /// Whether the pack honors the K-boundary invariant: either K is in
    /// `[CTX_K_MIN, CTX_K_MAX]` or the pack is flagged degraded.
    pub fn k_invariant_holds(&self) -> bool {
        let k = self.memories.len();
        (k >= CTX_K_MIN && k <= CTX_K_MAX) || self.degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relaxation_serializes_snake_case() {
        let json = serde_json::to_string(&FilterRelaxation::RecencyWindow).unwrap_or_default();
        assert_eq!(json, "\"recency_window\"");
    }

    #[test]
    fn telemetry_defaults_to_zero() {
        let t = ContextTelemetry::default();
        assert_eq!(t.ctx_k, 0);
        assert_eq!(t.k_reductions, 0);
    }
}
