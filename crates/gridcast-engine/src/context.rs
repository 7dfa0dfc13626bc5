//! Context pack assembly.
//!
//! For each `(run, expert, game)` the assembler computes a deterministic
//! query embedding from the game's factual fields and the expert's
//! analytical-focus keywords, retrieves the top memories through the
//! decay-weighted ranking in the store, and packages the registry,
//! persona, guardrails, policy, and any cached live briefs into an
//! immutable [`ContextPack`].

use std::sync::Mutex;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use gridcast_experts::{DecayEngine, ExpertConfig, ExpertRegistry};
use gridcast_store::{BriefCache, MemoryStore, RetrievalFilters};
use gridcast_types::{
    CategoryRegistry, ContextPack, ContextTelemetry, ExpertId, ExpertPersona, Game,
    GenerationPolicy, Guardrails, RunPlaybook,
};

use crate::budget::RateLimiter;
use crate::embed::EmbeddingBackend;
use crate::error::EngineError;

/// Number of top focus keywords mixed into the query text.
const QUERY_FOCUS_KEYWORDS: usize = 5;

/// Multiplier applied to the per-assertion stake cap to form the
/// per-game total cap.
const TOTAL_STAKE_CAP_FACTOR: i64 = 40;

/// Assembles context packs for bundle generation.
pub struct ContextAssembler<'a> {
    pool: &'a PgPool,
    experts: &'a ExpertRegistry,
    categories: &'a CategoryRegistry,
    embedder: &'a EmbeddingBackend,
    briefs: Option<&'a BriefCache>,
    playbook: &'a RunPlaybook,
    rate_limits: Option<&'a Mutex<RateLimiter>>,
    draft_model: String,
    critic_model: String,
}

impl<'a> ContextAssembler<'a> {
    /// Create an assembler over the run's shared components.
    pub fn new(
        pool: &'a PgPool,
        experts: &'a ExpertRegistry,
        categories: &'a CategoryRegistry,
        embedder: &'a EmbeddingBackend,
        briefs: Option<&'a BriefCache>,
        playbook: &'a RunPlaybook,
    ) -> Self {
        Self {
            pool,
            experts,
            categories,
            embedder,
            briefs,
            playbook,
            rate_limits: None,
            draft_model: String::from("primary"),
            critic_model: String::from("primary"),
        }
    }

    /// Override the model names recorded in generation policies.
    #[must_use]
    pub fn with_models(mut self, draft_model: &str, critic_model: &str) -> Self {
        draft_model.clone_into(&mut self.draft_model);
        critic_model.clone_into(&mut self.critic_model);
        self
    }

    /// Enforce per-expert tool rate limits on brief refreshes.
    #[must_use]
    pub const fn with_rate_limits(mut self, limits: &'a Mutex<RateLimiter>) -> Self {
        self.rate_limits = Some(limits);
        self
    }

    /// Build the context pack for one expert and game.
    ///
    /// Repeated calls with the same inputs are deterministic within a
    /// run: the query text is a pure function of game and config, and
    /// retrieval ranks with stable tie-breaks.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on expert lookup, embedding, or retrieval
    /// failure. Retrieval degradation is not an error; it is flagged on
    /// the pack.
    pub async fn build_context(
        &self,
        expert_id: &ExpertId,
        game: &Game,
    ) -> Result<ContextPack, EngineError> {
        let config = self.experts.get(expert_id)?;
        let run_id = self.experts.run_id().clone();

        let query_text = query_text(game, config);
        let query_embedding = self.embedder.embed(&query_text).await?;

        let engine = DecayEngine::for_expert(config);
        let filters = RetrievalFilters {
            home_team: Some(game.home_team.clone()),
            away_team: Some(game.away_team.clone()),
            family: None,
            recency_window_days: None,
        };

        let retrieval = MemoryStore::new(self.pool)
            .retrieve(
                &run_id,
                expert_id,
                &query_embedding,
                filters,
                self.playbook.k_desired,
                &engine,
            )
            .await?;

        // Brief refreshes count as the "news" tool; a rate-limited
        // expert just gets a pack without briefs.
        let brief_slot = self.rate_limits.is_none_or(|limits| {
            limits
                .lock()
                .map_or(true, |mut limiter| limiter.try_acquire(expert_id, "news"))
        });
        let live_briefs = match (self.briefs, brief_slot) {
            (Some(cache), true) => cache
                .fetch(&run_id, &game.game_id)
                .await
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let telemetry = ContextTelemetry {
            ctx_k: retrieval.memories.len(),
            vector_p95_ms: retrieval.latency_ms,
            k_reductions: retrieval.relaxations.len(),
        };

        tracing::info!(
            run_id = %run_id,
            expert_id = %expert_id,
            game_id = %game.game_id,
            ctx_k = telemetry.ctx_k,
            vector_p95_ms = telemetry.vector_p95_ms,
            k_reductions = telemetry.k_reductions,
            degraded = retrieval.degraded,
            "context pack assembled"
        );

        Ok(ContextPack {
            run_id,
            expert_id: expert_id.clone(),
            game: game.clone(),
            memories: retrieval.memories,
            registry: self.categories.clone(),
            persona: persona_for(config),
            guardrails: guardrails_for(config, self.playbook),
            policy: GenerationPolicy {
                mode: self.playbook.mode,
                draft_model: self.draft_model.clone(),
                critic_model: self.critic_model.clone(),
                repair_max_iters: self.playbook.repair_max_iters,
            },
            live_briefs,
            degraded: retrieval.degraded,
            relaxations: retrieval.relaxations,
            telemetry,
            built_at: Utc::now(),
        })
    }
}

/// The persona block for prompts.
fn persona_for(config: &ExpertConfig) -> ExpertPersona {
    ExpertPersona {
        expert_id: config.expert_id.clone(),
        display_name: config.display_name.clone(),
        personality: config.personality.clone(),
        voice: config.voice.clone(),
    }
}

/// The guardrail block, resolving the tool budget against the playbook.
fn guardrails_for(config: &ExpertConfig, playbook: &RunPlaybook) -> Guardrails {
    Guardrails {
        stake_cap: config.stake_cap,
        total_stake_cap: config.stake_cap * Decimal::from(TOTAL_STAKE_CAP_FACTOR),
        tool_budget: config.effective_tool_budget(playbook.tool_budget),
        risk_profile: config.risk_profile.clone(),
    }
}

/// Deterministic query text: the game's factual fields plus the expert's
/// highest-weighted focus keywords.
fn query_text(game: &Game, config: &ExpertConfig) -> String {
    let mut focus: Vec<(&String, f64)> = config
        .analytical_focus
        .iter()
        .map(|(k, &v)| (k, v))
        .collect();
    focus.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let keywords: Vec<&str> = focus
        .iter()
        .take(QUERY_FOCUS_KEYWORDS)
        .map(|(k, _)| k.as_str())
        .collect();

    let weather = game.weather.as_ref().map_or_else(String::new, |w| {
        format!(
            " weather {}F wind {}mph {}",
            w.temperature_f, w.wind_mph, w.conditions
        )
    });

    format!(
        "NFL season {} week {}: {} at {} at {}.{} spread {} total {}. focus: {}",
        game.season,
        game.week,
        game.away_team,
        game.home_team,
        game.venue,
        weather,
        game.market_lines.spread,
        game.market_lines.total,
        keywords.join(" "),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use gridcast_experts::{PersonalityTraits, TemporalParams};
    use gridcast_types::TeamId;

    use super::*;

    fn config(focus: &[(&str, f64)]) -> ExpertConfig {
        ExpertConfig {
            expert_id: ExpertId::new("weather_specialist"),
            display_name: String::from("The Meteorologist"),
            personality: String::from("environmental"),
            voice: String::new(),
            analytical_focus: focus
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect(),
            temporal: TemporalParams {
                half_life_days: 730.0,
                similarity_weight: 0.6,
                temporal_weight: 0.4,
                category_half_life: BTreeMap::new(),
                early_season_factor: 1.4,
                late_season_factor: 0.9,
            },
            confidence_range: [0.5, 0.8],
            traits: PersonalityTraits {
                risk_tolerance: 0.4,
                contrarianism: 0.35,
                optimism: 0.45,
                analytics_trust: 0.75,
            },
            stake_cap: Decimal::new(25, 1),
            risk_profile: String::from("cautious"),
            tool_budget: None,
        }
    }

    fn game() -> Game {
        Game {
            game_id: gridcast_types::GameId::new("g1"),
            season: 2025,
            week: 5,
            date: Utc::now(),
            home_team: TeamId::new("KC"),
            away_team: TeamId::new("BUF"),
            venue: String::from("Arrowhead Stadium"),
            weather: None,
            market_lines: gridcast_types::MarketLines {
                spread: -3.0,
                total: 47.5,
                moneyline_home: -160,
                moneyline_away: 140,
            },
            injuries: Vec::new(),
            status: gridcast_types::GameStatus::Scheduled,
            final_score: None,
        }
    }

    #[test]
    fn query_text_is_deterministic() {
        let config = config(&[("weather", 0.98), ("fundamentals", 0.5)]);
        let first = query_text(&game(), &config);
        let second = query_text(&game(), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn query_text_prefers_highest_focus_keywords() {
        let config = config(&[
            ("weather", 0.98),
            ("fundamentals", 0.5),
            ("statistics", 0.5),
            ("injuries", 0.4),
            ("home_advantage", 0.3),
            ("momentum", 0.1),
        ]);
        let text = query_text(&game(), &config);
        assert!(text.contains("weather"));
        assert!(!text.contains("momentum"));
    }

    #[test]
    fn equal_focus_weights_break_ties_by_name() {
        let config = config(&[("zeta", 0.5), ("alpha", 0.5)]);
        let text = query_text(&game(), &config);
        let alpha_pos = text.find("alpha");
        let zeta_pos = text.find("zeta");
        assert!(alpha_pos < zeta_pos);
    }

    #[test]
    fn guardrails_scale_total_cap_from_stake_cap() {
        let config = config(&[("weather", 0.9)]);
        let playbook = RunPlaybook::default();
        let guardrails = guardrails_for(&config, &playbook);
        assert_eq!(
            guardrails.total_stake_cap,
            config.stake_cap * Decimal::from(TOTAL_STAKE_CAP_FACTOR)
        );
    }
}
