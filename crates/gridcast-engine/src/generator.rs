//! Prediction bundle generation: draft, critique, repair, persist.
//!
//! The pipeline per expert is internally sequential -- retrieve (done by
//! the assembler), draft, critique, repair, store -- while experts for
//! one game run concurrently at the task level. Every model call is
//! wrapped in a timeout and charged against the expert's tool budget;
//! exceeding either aborts the task with nothing persisted.
//!
//! Side-effect order per expert: memory read (context pack), bundle
//! insert, memory write of pre-game thoughts, graph enqueue.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::PgPool;
use tokio::time::timeout;

use gridcast_experts::{ExpertConfig, ExpertRegistry};
use gridcast_graph::GraphWriter;
use gridcast_store::{BundleStore, LearnedWeights, MemoryStore, ShadowStore, WeightsStore};
use gridcast_types::{
    Assertion, AssertionValue, BundleId, BundleSummary, CategoryId, ContextPack, EmotionalState,
    EpisodicMemory, GenerationMode, MemoryEmbeddings, MemoryId, MemoryType, PredictionBundle,
    RunPlaybook, ShadowAssertion, ShadowRunId, Side, well_known,
};

use crate::budget::BudgetTracker;
use crate::context::ContextAssembler;
use crate::cost::{CostTier, CostTracker};
use crate::critic::{critic_context, critique};
use crate::draft::{draft_response_json, shaped_draft};
use crate::embed::EmbeddingBackend;
use crate::error::EngineError;
use crate::llm::LlmBackend;
use crate::parse::{parse_draft, parse_repair};
use crate::prompt::PromptEngine;
use crate::validate::validate_assertions;

/// Hard cap on any single model call.
const MODEL_CALL_CAP: Duration = Duration::from_secs(4);

/// The outcome of the compose phase, before persistence.
#[derive(Debug, Clone)]
pub struct ComposedBundle {
    /// The assembled bundle (not yet persisted).
    pub bundle: PredictionBundle,
    /// Violations remaining after the final repair (empty when valid).
    pub remaining_violations: usize,
}

/// Generates, validates, and persists prediction bundles.
pub struct BundleGenerator<'a> {
    pool: &'a PgPool,
    prompts: &'a PromptEngine,
    draft_backend: &'a LlmBackend,
    critic_backend: &'a LlmBackend,
    embedder: &'a EmbeddingBackend,
    graph: Option<&'a GraphWriter>,
    cost: &'a CostTracker,
}

impl<'a> BundleGenerator<'a> {
    /// Create a generator over the run's shared components.
    pub const fn new(
        pool: &'a PgPool,
        prompts: &'a PromptEngine,
        draft_backend: &'a LlmBackend,
        critic_backend: &'a LlmBackend,
        embedder: &'a EmbeddingBackend,
        graph: Option<&'a GraphWriter>,
        cost: &'a CostTracker,
    ) -> Self {
        Self {
            pool,
            prompts,
            draft_backend,
            critic_backend,
            embedder,
            graph,
            cost,
        }
    }

    /// Run the full pipeline for one expert: compose, persist, record
    /// the pre-game memory, and mirror to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on timeout, budget exhaustion, or storage
    /// failure. No partial bundle is ever persisted.
    pub async fn generate(
        &self,
        pack: &ContextPack,
        config: &ExpertConfig,
    ) -> Result<PredictionBundle, EngineError> {
        let learned = WeightsStore::new(self.pool)
            .get(&pack.run_id, &pack.expert_id)
            .await?;

        let composed = self.compose(pack, config, &learned).await?;
        let bundle = composed.bundle;

        BundleStore::new(self.pool).insert(&bundle).await?;

        self.write_pregame_memory(pack, config, &bundle).await?;

        if let Some(graph) = self.graph {
            let teams = (&pack.game.home_team, &pack.game.away_team);
            graph.enqueue(gridcast_graph::bundle_update(&bundle, Some(teams)))?;
        }

        tracing::info!(
            run_id = %bundle.run_id,
            expert_id = %bundle.expert_id,
            game_id = %bundle.game_id,
            schema_valid = bundle.schema_valid,
            repair_iterations = bundle.repair_iterations,
            latency_ms = bundle.latency_ms,
            "bundle generated"
        );

        Ok(bundle)
    }

    /// The model-facing part of the pipeline: shaped priors, draft call,
    /// validation, and the bounded critic/repair loop. Pure with respect
    /// to primary storage.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on unrecoverable model, parse, timeout,
    /// or budget failure. Validation failure is NOT an error: the bundle
    /// comes back `schema_valid = false, degraded = true`.
    pub async fn compose(
        &self,
        pack: &ContextPack,
        config: &ExpertConfig,
        learned: &LearnedWeights,
    ) -> Result<ComposedBundle, EngineError> {
        let started = Instant::now();
        let mut budget = BudgetTracker::new(pack.expert_id.clone(), pack.guardrails.tool_budget);

        // Shaped priors precede any model invocation.
        let shaped = shaped_draft(pack, config, learned);
        let prompt_context = draft_prompt_context(pack, &shaped);
        let draft_prompt = self.prompts.render_draft(&prompt_context)?;

        let response = self
            .timed_call(self.draft_backend, &draft_prompt, &mut budget, CostTier::Draft)
            .await?;

        let parsed = parse_draft(&response.text)?;
        let mut assertions: BTreeMap<CategoryId, Assertion> = parsed
            .assertions
            .into_iter()
            .map(|a| (a.category_id.clone(), a))
            .collect();
        let mut overall = parsed.overall;

        let mut violations = validate_assertions(
            &assertions,
            &pack.registry,
            config,
            &pack.guardrails,
            &pack.game,
        );

        let mut iterations: u8 = 0;
        if pack.policy.mode == GenerationMode::Deliberate {
            while !violations.is_empty() && iterations < pack.policy.repair_max_iters.min(2) {
                let reported = critique(&violations);
                let context = critic_context(&pack.persona, &reported);
                let repair_prompt = self.prompts.render_critic(&context)?;

                let repair_response = self
                    .timed_call(
                        self.critic_backend,
                        &repair_prompt,
                        &mut budget,
                        CostTier::Critic,
                    )
                    .await?;

                // Merge repaired assertions over the draft, preserving
                // everything the critic did not flag.
                match parse_repair(&repair_response.text) {
                    Ok(repaired) => {
                        for assertion in repaired {
                            assertions.insert(assertion.category_id.clone(), assertion);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "repair response unparseable; keeping draft");
                    }
                }

                iterations = iterations.saturating_add(1);
                violations = validate_assertions(
                    &assertions,
                    &pack.registry,
                    config,
                    &pack.guardrails,
                    &pack.game,
                );
            }
        }

        let schema_valid = violations.is_empty();
        if !schema_valid {
            tracing::warn!(
                run_id = %pack.run_id,
                expert_id = %pack.expert_id,
                game_id = %pack.game.game_id,
                violations = violations.len(),
                iterations,
                "bundle failed validation after repairs"
            );
        }

        let summary = overall.take().map_or_else(
            || fallback_summary(&assertions, &pack.game),
            |o| BundleSummary {
                winner: o.winner,
                confidence: o.confidence,
                headline: o.headline,
            },
        );

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Ok(ComposedBundle {
            remaining_violations: violations.len(),
            bundle: PredictionBundle {
                bundle_id: BundleId::new(),
                run_id: pack.run_id.clone(),
                game_id: pack.game.game_id.clone(),
                expert_id: pack.expert_id.clone(),
                overall: summary,
                assertions,
                schema_valid,
                degraded: !schema_valid,
                repair_iterations: iterations,
                latency_ms,
                model: self.draft_backend.model().to_owned(),
                created_at: Utc::now(),
            },
        })
    }

    /// Shadow pass: generate an A/B bundle with the shadow model and
    /// write the comparison into the isolated partition. Never touches
    /// the primary tables.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on model or shadow-store failure.
    pub async fn shadow_pass(
        &self,
        pack: &ContextPack,
        config: &ExpertConfig,
        learned: &LearnedWeights,
        primary: &PredictionBundle,
        shadow_backend: &LlmBackend,
        shadow_run_id: &ShadowRunId,
    ) -> Result<usize, EngineError> {
        let started = Instant::now();
        let mut budget = BudgetTracker::new(pack.expert_id.clone(), pack.guardrails.tool_budget);

        let shaped = shaped_draft(pack, config, learned);
        let prompt_context = draft_prompt_context(pack, &shaped);
        let prompt = self.prompts.render_draft(&prompt_context)?;
        let response = self
            .timed_call(shadow_backend, &prompt, &mut budget, CostTier::Draft)
            .await?;

        let parsed = parse_draft(&response.text)?;
        let shadow_assertions: Vec<ShadowAssertion> = parsed
            .assertions
            .into_iter()
            .map(|assertion| {
                let primary_assertion = primary.assertions.get(&assertion.category_id);
                let agrees = primary_assertion
                    .is_some_and(|p| values_agree(&p.value, &assertion.value));
                let confidence_delta = primary_assertion
                    .map_or(assertion.confidence, |p| {
                        (p.confidence - assertion.confidence).abs()
                    });
                ShadowAssertion {
                    shadow_run_id: shadow_run_id.clone(),
                    main_run_id: pack.run_id.clone(),
                    game_id: pack.game.game_id.clone(),
                    expert_id: pack.expert_id.clone(),
                    assertion,
                    shadow_model: shadow_backend.model().to_owned(),
                    primary_model: primary.model.clone(),
                    agrees_with_primary: agrees,
                    confidence_delta,
                }
            })
            .collect();

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let cost = self.cost.summary().total_estimated_cost;
        let written = ShadowStore::new(self.pool)
            .insert_bundle(&shadow_assertions, true, latency_ms, cost)
            .await?;
        Ok(written)
    }

    async fn timed_call(
        &self,
        backend: &LlmBackend,
        prompt: &crate::prompt::RenderedPrompt,
        budget: &mut BudgetTracker,
        tier: CostTier,
    ) -> Result<crate::llm::LlmResponse, EngineError> {
        let cap = MODEL_CALL_CAP.min(budget.remaining_time());
        let call_started = Instant::now();

        let response = match timeout(cap, backend.complete(prompt)).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                return Err(EngineError::Timeout {
                    expert_id: budget.expert_id().clone(),
                    deadline_ms: u64::try_from(cap.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };

        budget.charge(call_started.elapsed())?;
        self.cost
            .record_call(tier, response.input_tokens, response.output_tokens);
        Ok(response)
    }

    async fn write_pregame_memory(
        &self,
        pack: &ContextPack,
        config: &ExpertConfig,
        bundle: &PredictionBundle,
    ) -> Result<(), EngineError> {
        let content = pregame_memory_content(bundle);
        let combined = self.embedder.embed(&content).await?;

        // The factors this reasoning leaned on; belief revision reads
        // them back when the bundle settles.
        let mut focus: Vec<(&String, f64)> = config
            .analytical_focus
            .iter()
            .map(|(k, &v)| (k, v))
            .collect();
        focus.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let cited_factors: Vec<&str> = focus.iter().take(3).map(|(k, _)| k.as_str()).collect();

        let memory = EpisodicMemory {
            memory_id: MemoryId::new(),
            run_id: pack.run_id.clone(),
            expert_id: pack.expert_id.clone(),
            game_id: pack.game.game_id.clone(),
            memory_type: MemoryType::Reasoning,
            content,
            home_team: pack.game.home_team.clone(),
            away_team: pack.game.away_team.clone(),
            season: pack.game.season,
            week: pack.game.week,
            game_date: pack.game.date.date_naive(),
            metadata: serde_json::json!({
                "bundle_id": bundle.bundle_id.to_string(),
                "family": "markets",
                "schema_valid": bundle.schema_valid,
                "factors": cited_factors,
            }),
            embeddings: MemoryEmbeddings {
                combined: Some(combined),
                ..MemoryEmbeddings::default()
            },
            memory_strength: bundle.overall.confidence.clamp(0.0, 1.0),
            emotional_state: EmotionalState::Neutral,
            vividness: 0.5,
            decay_rate: 1.0,
            created_at: Utc::now(),
        };

        MemoryStore::new(self.pool).insert(&memory).await?;
        Ok(())
    }
}

/// Generate bundles for every registered expert concurrently, each under
/// the playbook's per-expert deadline. Failed or timed-out experts are
/// contained: their slot reports the error, the rest proceed.
pub async fn generate_for_game(
    assembler: &ContextAssembler<'_>,
    generator: &BundleGenerator<'_>,
    experts: &ExpertRegistry,
    game: &gridcast_types::Game,
    playbook: &RunPlaybook,
) -> Vec<(gridcast_types::ExpertId, Result<PredictionBundle, EngineError>)> {
    let deadline = Duration::from_millis(playbook.per_expert_deadline_ms);

    let tasks = experts.list().into_iter().map(|config| {
        let expert_id = config.expert_id.clone();
        async move {
            let result = timeout(deadline, async {
                let pack = assembler.build_context(&expert_id, game).await?;
                generator.generate(&pack, config).await
            })
            .await
            .unwrap_or_else(|_elapsed| {
                Err(EngineError::Timeout {
                    expert_id: expert_id.clone(),
                    deadline_ms: playbook.per_expert_deadline_ms,
                })
            });
            (expert_id, result)
        }
    });

    futures::future::join_all(tasks).await
}

/// Whether two assertion values agree for shadow comparison purposes.
fn values_agree(a: &AssertionValue, b: &AssertionValue) -> bool {
    match (a, b) {
        (AssertionValue::Choice(x), AssertionValue::Choice(y)) => x == y,
        (AssertionValue::Numeric(x), AssertionValue::Numeric(y)) => (x - y).abs() < 0.5,
        (AssertionValue::Percentage(x), AssertionValue::Percentage(y)) => (x - y).abs() < 0.05,
        _ => false,
    }
}

/// The draft prompt context: pack fields plus shaped priors.
fn draft_prompt_context(
    pack: &ContextPack,
    shaped: &crate::draft::ShapedDraft,
) -> serde_json::Value {
    let priors: Vec<serde_json::Value> = shaped
        .assertions
        .iter()
        .map(|a| {
            let value = match &a.value {
                AssertionValue::Choice(c) => c.clone(),
                AssertionValue::Numeric(n) => n.to_string(),
                AssertionValue::Percentage(p) => format!("{p:.3}"),
            };
            serde_json::json!({
                "category_id": a.category_id.as_str(),
                "value": value,
                "confidence": a.confidence,
                "stake": a.stake.to_string(),
            })
        })
        .collect();

    // Memories enter the prompt without their embedding vectors.
    let memories: Vec<serde_json::Value> = pack
        .memories
        .iter()
        .map(|m| {
            serde_json::json!({
                "memory": {
                    "memory_id": m.memory.memory_id.to_string(),
                    "memory_type": m.memory.memory_type.as_str(),
                    "content": m.memory.content,
                    "memory_strength": m.memory.memory_strength,
                },
                "age_days": m.age_days,
                "similarity": m.similarity,
            })
        })
        .collect();

    serde_json::json!({
        "persona": pack.persona,
        "game": pack.game,
        "memories": memories,
        "live_briefs": pack.live_briefs,
        "guardrails": {
            "stake_cap": pack.guardrails.stake_cap.to_string(),
            "risk_profile": pack.guardrails.risk_profile,
        },
        "priors": priors,
    })
}

/// Derive an overall summary when the model omitted its own.
fn fallback_summary(
    assertions: &BTreeMap<CategoryId, Assertion>,
    game: &gridcast_types::Game,
) -> BundleSummary {
    let winner_assertion = assertions.get(&CategoryId::new(well_known::WINNER));
    let winner = winner_assertion
        .and_then(|a| a.value.as_choice())
        .map_or(Side::Home, |c| {
            if c == "AWAY" { Side::Away } else { Side::Home }
        });
    let confidence = winner_assertion.map_or(0.5, |a| a.confidence);
    BundleSummary {
        winner,
        confidence,
        headline: format!(
            "{} over {}",
            game.team(winner),
            game.team(match winner {
                Side::Home => Side::Away,
                Side::Away => Side::Home,
            })
        ),
    }
}

/// Build the text of the pre-game reasoning memory.
fn pregame_memory_content(bundle: &PredictionBundle) -> String {
    let margin = bundle
        .assertion(well_known::SPREAD_FULL_GAME)
        .and_then(|a| a.value.as_number())
        .unwrap_or(0.0);
    let total = bundle
        .assertion(well_known::TOTAL_FULL_GAME)
        .and_then(|a| a.value.as_number())
        .unwrap_or(0.0);
    format!(
        "Predicted {} with confidence {:.2}; margin {margin:+.1}, total {total:.1}. {}",
        bundle.overall.winner.as_value(),
        bundle.overall.confidence,
        bundle.overall.headline,
    )
}

#[cfg(test)]
mod tests {
    use gridcast_store::LearnedWeights;

    use super::*;
    use crate::draft::tests::pack_for;
    use crate::llm::StubBackend;

    fn stub(responses: Vec<String>) -> LlmBackend {
        LlmBackend::Stub(StubBackend::scripted(responses))
    }

    #[allow(clippy::unwrap_used)]
    fn prompts() -> PromptEngine {
        PromptEngine::embedded().unwrap()
    }

    fn composer_parts() -> (PromptEngine, EmbeddingBackend, CostTracker) {
        (prompts(), EmbeddingBackend::stub(), CostTracker::free())
    }

    fn valid_draft_json(expert: &str) -> String {
        let (pack, config) = pack_for(expert);
        let shaped = shaped_draft(&pack, &config, &LearnedWeights::default());
        draft_response_json(&shaped, "Baseline call.").to_string()
    }

    fn draft_json_missing(expert: &str, category: &str) -> String {
        let (pack, config) = pack_for(expert);
        let shaped = shaped_draft(&pack, &config, &LearnedWeights::default());
        let mut value = draft_response_json(&shaped, "Partial call.");
        if let Some(assertions) = value
            .get_mut("assertions")
            .and_then(serde_json::Value::as_array_mut)
        {
            assertions.retain(|a| {
                a.get("category_id").and_then(serde_json::Value::as_str) != Some(category)
            });
        }
        value.to_string()
    }

    fn repair_json_for(expert: &str, category: &str) -> String {
        let (pack, config) = pack_for(expert);
        let shaped = shaped_draft(&pack, &config, &LearnedWeights::default());
        let repaired: Vec<serde_json::Value> = shaped
            .assertions
            .iter()
            .filter(|a| a.category_id.as_str() == category)
            .map(|a| {
                serde_json::json!({
                    "category_id": a.category_id.as_str(),
                    "value": a.value,
                    "confidence": a.confidence,
                    "stake": a.stake.to_string(),
                    "why": [],
                })
            })
            .collect();
        serde_json::json!({ "assertions": repaired }).to_string()
    }

    async fn compose_with(
        expert: &str,
        draft_responses: Vec<String>,
        critic_responses: Vec<String>,
    ) -> ComposedBundle {
        let (pack, config) = pack_for(expert);
        let (prompts, embedder, cost) = composer_parts();
        let draft_backend = stub(draft_responses);
        let critic_backend = stub(critic_responses);

        // compose() never touches the pool; a lazily-connecting pool
        // stands in without a live database.
        let pool = lazy_pool();

        let generator = BundleGenerator::new(
            &pool,
            &prompts,
            &draft_backend,
            &critic_backend,
            &embedder,
            None,
            &cost,
        );
        match generator.compose(&pack, &config, &LearnedWeights::default()).await {
            Ok(composed) => composed,
            Err(e) => panic_compose(&e),
        }
    }

    #[allow(clippy::unwrap_used)]
    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://localhost/gridcast_test")
            .unwrap()
    }

    #[allow(clippy::panic)]
    fn panic_compose(e: &EngineError) -> ! {
        panic!("compose failed: {e}")
    }

    #[tokio::test]
    async fn happy_path_valid_draft_needs_no_repairs() {
        let composed = compose_with(
            "conservative_analyzer",
            vec![valid_draft_json("conservative_analyzer")],
            Vec::new(),
        )
        .await;

        assert!(composed.bundle.schema_valid);
        assert!(!composed.bundle.degraded);
        assert_eq!(composed.bundle.repair_iterations, 0);
        assert_eq!(composed.bundle.assertions.len(), 83);
        assert_eq!(composed.remaining_violations, 0);

        // Winner confidence honors the conservative range.
        let winner = composed.bundle.assertion(well_known::WINNER);
        assert!(winner.is_some_and(|a| a.confidence >= 0.55 && a.confidence <= 0.70));
    }

    #[tokio::test]
    async fn missing_category_is_repaired_in_one_iteration() {
        let composed = compose_with(
            "conservative_analyzer",
            vec![draft_json_missing("conservative_analyzer", "total_full_game")],
            vec![repair_json_for("conservative_analyzer", "total_full_game")],
        )
        .await;

        assert!(composed.bundle.schema_valid);
        assert_eq!(composed.bundle.repair_iterations, 1);
        assert_eq!(composed.bundle.assertions.len(), 83);
    }

    #[tokio::test]
    async fn persistent_omission_degrades_after_two_repairs() {
        // The critic keeps returning an empty repair, so the category
        // stays missing through both iterations.
        let empty_repair = serde_json::json!({ "assertions": [] }).to_string();
        let composed = compose_with(
            "conservative_analyzer",
            vec![draft_json_missing("conservative_analyzer", "total_full_game")],
            vec![empty_repair.clone(), empty_repair],
        )
        .await;

        assert!(!composed.bundle.schema_valid);
        assert!(composed.bundle.degraded);
        assert_eq!(composed.bundle.repair_iterations, 2);
        assert!(composed.remaining_violations > 0);
        assert!(!composed.bundle.council_eligible());
    }

    #[tokio::test]
    async fn one_shot_mode_skips_the_repair_loop() {
        let (mut pack, config) = pack_for("conservative_analyzer");
        pack.policy.mode = GenerationMode::OneShot;
        let (prompts, embedder, cost) = composer_parts();
        let draft_backend = stub(vec![draft_json_missing(
            "conservative_analyzer",
            "total_full_game",
        )]);
        let critic_backend = stub(Vec::new());
        let pool = lazy_pool();

        let generator = BundleGenerator::new(
            &pool,
            &prompts,
            &draft_backend,
            &critic_backend,
            &embedder,
            None,
            &cost,
        );
        let composed = generator
            .compose(&pack, &config, &LearnedWeights::default())
            .await;

        assert!(composed.as_ref().is_ok_and(|c| !c.bundle.schema_valid));
        assert!(composed.is_ok_and(|c| c.bundle.repair_iterations == 0));
    }

    #[tokio::test]
    async fn compose_is_deterministic_for_identical_packs() {
        let first = compose_with(
            "statistics_purist",
            vec![valid_draft_json("statistics_purist")],
            Vec::new(),
        )
        .await;
        let second = compose_with(
            "statistics_purist",
            vec![valid_draft_json("statistics_purist")],
            Vec::new(),
        )
        .await;

        assert_eq!(first.bundle.schema_valid, second.bundle.schema_valid);
        let first_values: Vec<&Assertion> = first.bundle.assertions.values().collect();
        let second_values: Vec<&Assertion> = second.bundle.assertions.values().collect();
        assert_eq!(first_values, second_values);
    }

    #[test]
    fn values_agree_rules() {
        assert!(values_agree(
            &AssertionValue::Choice(String::from("HOME")),
            &AssertionValue::Choice(String::from("HOME")),
        ));
        assert!(!values_agree(
            &AssertionValue::Choice(String::from("HOME")),
            &AssertionValue::Choice(String::from("AWAY")),
        ));
        assert!(values_agree(
            &AssertionValue::Numeric(45.0),
            &AssertionValue::Numeric(45.3),
        ));
        assert!(!values_agree(
            &AssertionValue::Numeric(45.0),
            &AssertionValue::Percentage(0.45),
        ));
    }

    #[test]
    fn fallback_summary_reads_winner_assertion() {
        let (pack, config) = pack_for("conservative_analyzer");
        let shaped = shaped_draft(&pack, &config, &LearnedWeights::default());
        let assertions: BTreeMap<CategoryId, Assertion> = shaped
            .assertions
            .into_iter()
            .map(|a| (a.category_id.clone(), a))
            .collect();
        let summary = fallback_summary(&assertions, &pack.game);
        assert_eq!(summary.winner, shaped_winner(&assertions));
    }

    fn shaped_winner(assertions: &BTreeMap<CategoryId, Assertion>) -> Side {
        assertions
            .get(&CategoryId::new(well_known::WINNER))
            .and_then(|a| a.value.as_choice())
            .map_or(Side::Home, |c| if c == "AWAY" { Side::Away } else { Side::Home })
    }
}
