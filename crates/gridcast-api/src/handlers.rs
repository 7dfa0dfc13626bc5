//! REST API endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/context-pack` | Build the context pack for one (run, expert, game) |
//! | `POST` | `/predictions` | Write-through a prediction bundle (idempotent) |
//! | `POST` | `/predictions/generate` | Run the full per-game generation across experts |
//! | `POST` | `/council/consensus` | Compute the council consensus for a game |
//! | `POST` | `/outcomes` | Settle a finalised game |
//! | `POST` | `/shadow/predictions` | Run a shadow A/B pass for one expert |
//! | `GET` | `/shadow/predictions/{shadow_run_id}` | Shadow rows for a shadow run |
//! | `GET` | `/shadow/telemetry/{shadow_run_id}` | Shadow telemetry summary |
//! | `GET` | `/shadow/health` | Shadow isolation health check |
//!
//! No shadow endpoint returns data to council or outcome consumers; the
//! shadow read paths exist solely for experiment analysis.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gridcast_council::{CouncilSelector, aggregate};
use gridcast_engine::{
    BundleGenerator, ContextAssembler, generate_for_game, validate_assertions,
};
use gridcast_experts::ExpertRegistry;
use gridcast_settle::{OutcomeIngestor, ResolvedValues, SettlementReport};
use gridcast_store::{BundleStore, ShadowStore};
use gridcast_types::{
    ConsensusBundle, ContextPack, ExpertId, FinalScore, GameId, GameStatus, Guardrails,
    PredictionBundle, RunId, ShadowAssertion, ShadowRunId,
};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response payloads
// ---------------------------------------------------------------------------

/// Request body for `POST /context-pack`.
#[derive(Debug, Deserialize)]
pub struct ContextPackRequest {
    /// Experiment scope.
    pub run_id: RunId,
    /// Target expert.
    pub expert_id: ExpertId,
    /// Target game.
    pub game_id: GameId,
}

/// Request body for `POST /predictions`.
#[derive(Debug, Deserialize)]
pub struct PredictionsRequest {
    /// The bundle to write through.
    pub bundle: PredictionBundle,
}

/// Response body for `POST /predictions`.
#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    /// Stored bundle id (existing row on duplicate submit).
    pub id: String,
    /// Schema validity as stored.
    pub schema_valid: bool,
    /// Repair iterations recorded on the bundle.
    pub iterations: u8,
}

/// Request body for `POST /predictions/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Experiment scope.
    pub run_id: RunId,
    /// Target game.
    pub game_id: GameId,
}

/// Per-expert slot in the generate response.
#[derive(Debug, Serialize)]
pub struct GeneratedSlot {
    /// The expert.
    pub expert_id: ExpertId,
    /// Schema validity when generation succeeded.
    pub schema_valid: Option<bool>,
    /// The contained error when it did not.
    pub error: Option<String>,
}

/// Request body for `POST /council/consensus`.
#[derive(Debug, Deserialize)]
pub struct ConsensusRequest {
    /// Experiment scope.
    pub run_id: RunId,
    /// Target game.
    pub game_id: GameId,
}

/// Request body for `POST /outcomes`.
#[derive(Debug, Deserialize)]
pub struct OutcomesRequest {
    /// Experiment scope.
    pub run_id: RunId,
    /// The settled game.
    pub game_id: GameId,
    /// Final score from the feed.
    pub r#final: FinalScore,
    /// Feed-resolved stat categories, merged over score-derived actuals.
    #[serde(default)]
    pub resolved: ResolvedValues,
}

/// Response body for `POST /outcomes`.
#[derive(Debug, Serialize)]
pub struct OutcomesResponse {
    /// Graded assertion rows written.
    pub settled_assertions: usize,
    /// Experts whose state was updated.
    pub updated_experts: Vec<ExpertId>,
    /// Whether the submission was an idempotent duplicate.
    pub duplicate: bool,
}

impl From<SettlementReport> for OutcomesResponse {
    fn from(report: SettlementReport) -> Self {
        Self {
            settled_assertions: report.settled_assertions,
            updated_experts: report.updated_experts,
            duplicate: report.duplicate,
        }
    }
}

/// Request body for `POST /shadow/predictions`.
#[derive(Debug, Deserialize)]
pub struct ShadowRequest {
    /// The shadow experiment id.
    pub shadow_run_id: ShadowRunId,
    /// The mirrored main run.
    pub run_id: RunId,
    /// Target game.
    pub game_id: GameId,
    /// Expert whose primary slot is shadowed.
    pub expert_id: ExpertId,
}

/// Response body for `POST /shadow/predictions`.
#[derive(Debug, Serialize)]
pub struct ShadowResponse {
    /// Shadow assertion rows written.
    pub written: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /context-pack` -- build a context pack. Idempotent: identical
/// inputs produce identical packs within a run.
pub async fn context_pack(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ContextPackRequest>,
) -> Result<Json<ContextPack>, ApiError> {
    let playbook = state.playbook_for(&request.run_id).await?;
    let experts = ExpertRegistry::builtin(request.run_id.clone())?;
    let game = state.game(&request.game_id)?;

    let assembler = ContextAssembler::new(
        &state.pool,
        &experts,
        &state.categories,
        &state.embedder,
        state.briefs.as_ref(),
        &playbook,
    )
    .with_rate_limits(&state.rate_limits);
    let pack = assembler.build_context(&request.expert_id, &game).await?;
    Ok(Json(pack))
}

/// `POST /predictions` -- write-through a bundle. Validation is
/// recomputed server-side; a duplicate `(run, expert, game)` submit
/// returns the existing row without inserting.
pub async fn submit_prediction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictionsRequest>,
) -> Result<Json<PredictionsResponse>, ApiError> {
    let mut bundle = request.bundle;
    let playbook = state.playbook_for(&bundle.run_id).await?;
    let experts = ExpertRegistry::builtin(bundle.run_id.clone())?;
    let config = experts.get(&bundle.expert_id)?;
    let game = state.game(&bundle.game_id)?;

    let guardrails = Guardrails {
        stake_cap: config.stake_cap,
        total_stake_cap: config.stake_cap * Decimal::from(40),
        tool_budget: config.effective_tool_budget(playbook.tool_budget),
        risk_profile: config.risk_profile.clone(),
    };
    let violations = validate_assertions(
        &bundle.assertions,
        &state.categories,
        config,
        &guardrails,
        &game,
    );
    bundle.schema_valid = violations.is_empty();
    bundle.degraded = !violations.is_empty();

    let write = BundleStore::new(&state.pool).insert(&bundle).await?;
    Ok(Json(PredictionsResponse {
        id: write.bundle_id.to_string(),
        schema_valid: bundle.schema_valid,
        iterations: bundle.repair_iterations,
    }))
}

/// `POST /predictions/generate` -- run context assembly and bundle
/// generation for every registered expert concurrently.
pub async fn generate_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Vec<GeneratedSlot>>, ApiError> {
    let playbook = state.playbook_for(&request.run_id).await?;
    let experts = ExpertRegistry::builtin(request.run_id.clone())?;
    let game = state.game(&request.game_id)?;

    let assembler = ContextAssembler::new(
        &state.pool,
        &experts,
        &state.categories,
        &state.embedder,
        state.briefs.as_ref(),
        &playbook,
    )
    .with_rate_limits(&state.rate_limits);
    let generator = BundleGenerator::new(
        &state.pool,
        &state.prompts,
        &state.draft_backend,
        &state.critic_backend,
        &state.embedder,
        state.graph.as_ref(),
        &state.cost,
    );

    let results = generate_for_game(&assembler, &generator, &experts, &game, &playbook).await;
    let slots = results
        .into_iter()
        .map(|(expert_id, result)| match result {
            Ok(bundle) => GeneratedSlot {
                expert_id,
                schema_valid: Some(bundle.schema_valid),
                error: None,
            },
            Err(error) => GeneratedSlot {
                expert_id,
                schema_valid: None,
                error: Some(error.to_string()),
            },
        })
        .collect();
    Ok(Json(slots))
}

/// `POST /council/consensus` -- pure function of stored bundles and
/// rolling stats; never mutates state.
pub async fn council_consensus(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConsensusRequest>,
) -> Result<Json<ConsensusBundle>, ApiError> {
    let playbook = state.playbook_for(&request.run_id).await?;
    let game = state.game(&request.game_id)?;

    let council = CouncilSelector::new(&state.pool)
        .select(
            &request.run_id,
            &game,
            &state.categories,
            playbook.council_size,
            playbook.rolling_window_weeks,
        )
        .await?;

    let bundles = BundleStore::new(&state.pool)
        .for_game(&request.run_id, &request.game_id)
        .await?;

    let consensus = aggregate(
        &request.run_id,
        &request.game_id,
        &council,
        &bundles,
        &state.categories,
    );
    Ok(Json(consensus))
}

/// `POST /outcomes` -- settle a finalised game. Re-submission of the
/// same `(run, game)` is an idempotent no-op.
pub async fn submit_outcomes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OutcomesRequest>,
) -> Result<Json<OutcomesResponse>, ApiError> {
    let playbook = state.playbook_for(&request.run_id).await?;
    let experts = ExpertRegistry::builtin(request.run_id.clone())?;
    let mut game = state.game(&request.game_id)?;
    game.final_score = Some(request.r#final);
    game.status = GameStatus::Final;

    let report = OutcomeIngestor::new(&state.pool, state.graph.as_ref())
        .settle(
            &request.run_id,
            &game,
            request.resolved,
            &state.categories,
            &experts,
            &playbook,
        )
        .await?;
    Ok(Json(OutcomesResponse::from(report)))
}

/// `POST /shadow/predictions` -- run a shadow A/B pass for one expert.
/// Requires shadow generation to be enabled for the run and a shadow
/// backend to be configured.
pub async fn shadow_predictions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ShadowRequest>,
) -> Result<Json<ShadowResponse>, ApiError> {
    let playbook = state.playbook_for(&request.run_id).await?;
    if !playbook.shadow_enabled {
        return Err(ApiError::InvalidRequest(format!(
            "shadow generation disabled for run {}",
            request.run_id
        )));
    }
    let Some(shadow_backend) = state.shadow_backend.as_ref() else {
        return Err(ApiError::InvalidRequest(String::from(
            "no shadow backend configured",
        )));
    };

    let experts = ExpertRegistry::builtin(request.run_id.clone())?;
    let config = experts.get(&request.expert_id)?;
    let game = state.game(&request.game_id)?;

    let primary = BundleStore::new(&state.pool)
        .for_expert_game(&request.run_id, &request.expert_id, &request.game_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no primary bundle for {} on {}",
                request.expert_id, request.game_id
            ))
        })?;

    let assembler = ContextAssembler::new(
        &state.pool,
        &experts,
        &state.categories,
        &state.embedder,
        state.briefs.as_ref(),
        &playbook,
    )
    .with_rate_limits(&state.rate_limits);
    let pack = assembler.build_context(&request.expert_id, &game).await?;

    let generator = BundleGenerator::new(
        &state.pool,
        &state.prompts,
        &state.draft_backend,
        &state.critic_backend,
        &state.embedder,
        None,
        &state.cost,
    );
    let learned = gridcast_store::WeightsStore::new(&state.pool)
        .get(&request.run_id, &request.expert_id)
        .await?;
    let written = generator
        .shadow_pass(
            &pack,
            config,
            &learned,
            &primary,
            shadow_backend,
            &request.shadow_run_id,
        )
        .await?;
    Ok(Json(ShadowResponse { written }))
}

/// `GET /shadow/predictions/{shadow_run_id}` -- shadow rows for
/// experiment analysis only.
pub async fn shadow_rows(
    State(state): State<Arc<AppState>>,
    Path(shadow_run_id): Path<String>,
) -> Result<Json<Vec<ShadowAssertion>>, ApiError> {
    let rows = ShadowStore::new(&state.pool)
        .for_run(&ShadowRunId::new(&shadow_run_id))
        .await?;
    Ok(Json(rows))
}

/// `GET /shadow/telemetry/{shadow_run_id}` -- per-shadow-run summary.
pub async fn shadow_telemetry(
    State(state): State<Arc<AppState>>,
    Path(shadow_run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let telemetry = ShadowStore::new(&state.pool)
        .telemetry(&ShadowRunId::new(&shadow_run_id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("shadow run {shadow_run_id}")))?;

    Ok(Json(serde_json::json!({
        "shadow_run_id": telemetry.shadow_run_id.as_str(),
        "bundles": telemetry.bundles,
        "success_rate": telemetry.success_rate(),
        "avg_latency_ms": telemetry.avg_latency_ms(),
        "agreement_rate": telemetry.agreement_rate(),
        "total_cost": telemetry.total_cost.to_string(),
    })))
}

/// `GET /shadow/health` -- verifies the isolation flags are all false.
/// A violation is a correctness bug and surfaces as a 500.
pub async fn shadow_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ShadowStore::new(&state.pool).audit_isolation().await?;
    Ok(Json(serde_json::json!({ "status": "ok", "isolation": "intact" })))
}
