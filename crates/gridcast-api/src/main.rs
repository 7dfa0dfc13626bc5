//! Gridcast API entry point.
//!
//! Boots the full prediction service: structured logging, `PostgreSQL`
//! with migrations, the run playbook (created with defaults when the run
//! is new), LLM/embedding backends (deterministic stubs unless an
//! external backend is configured), the write-behind graph worker, and
//! the Axum surface.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gridcast_api::state::InMemoryGames;
use gridcast_api::{AppState, serve};
use gridcast_engine::{
    CostTracker, EmbeddingBackend, LlmBackend, PromptEngine, RateLimiter, create_backend,
};
use gridcast_graph::GraphWriter;
use gridcast_store::{BankrollStore, BriefCache, PlaybookStore, PostgresPool};
use gridcast_types::{CategoryRegistry, RunId, RunPlaybook};

mod config;

use config::ApiConfig;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step fails; the run never
/// boots partially.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("gridcast-api starting");

    let config = ApiConfig::from_env().map_err(anyhow::Error::msg)?;
    let run_id = RunId::new(&config.run_id);

    let postgres = PostgresPool::connect_url(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    postgres.run_migrations().await.context("running migrations")?;

    // The playbook is created once per run and immutable afterwards.
    let playbook_store = PlaybookStore::new(postgres.pool());
    let playbook = match playbook_store.get(&run_id).await {
        Ok(existing) => existing,
        Err(_) => {
            let fresh = RunPlaybook {
                run_id: run_id.clone(),
                ..RunPlaybook::default()
            };
            playbook_store.create(&fresh).await.context("creating playbook")?;
            fresh
        }
    };
    playbook.validate().context("validating playbook")?;
    info!(run_id = %run_id, council_size = playbook.council_size, "playbook active");

    // Seed bankrolls and gates so every expert starts eligible.
    let experts = gridcast_experts::ExpertRegistry::builtin(run_id.clone())
        .context("loading expert directory")?;
    let bankrolls = BankrollStore::new(postgres.pool());
    for expert in experts.list() {
        bankrolls.seed_expert(&run_id, &expert.expert_id).await?;
    }
    info!(experts = experts.len(), "expert registry seeded");

    let prompts = match &config.templates_dir {
        Some(dir) => PromptEngine::from_dir(dir),
        None => PromptEngine::embedded(),
    }
    .map_err(|e| anyhow::anyhow!("loading prompt templates: {e}"))?;

    let (draft_backend, critic_backend) = match &config.draft_backend {
        Some(backend_config) => (
            create_backend(backend_config),
            create_backend(backend_config),
        ),
        None => {
            info!("no LLM backend configured; using deterministic stubs");
            (
                LlmBackend::Stub(gridcast_engine::StubBackend::scripted(Vec::new())),
                LlmBackend::Stub(gridcast_engine::StubBackend::scripted(Vec::new())),
            )
        }
    };

    let briefs = match &config.cache_url {
        Some(url) => Some(BriefCache::connect(url).await.context("connecting cache")?),
        None => None,
    };

    let (graph, _graph_worker) = GraphWriter::spawn(postgres.pool().clone());

    let state = Arc::new(AppState {
        pool: postgres.pool().clone(),
        categories: CategoryRegistry::standard(),
        default_playbook: playbook,
        games: Arc::new(InMemoryGames::new()),
        draft_backend,
        critic_backend,
        shadow_backend: None,
        embedder: EmbeddingBackend::stub(),
        prompts,
        graph: Some(graph),
        briefs,
        rate_limits: std::sync::Mutex::new(RateLimiter::standard()),
        cost: CostTracker::free(),
    });

    serve(&config.bind_addr, state).await.context("serving API")
}
