//! Shared application state and the pluggable game source.
//!
//! External collaborators (game feed, odds, weather, injuries) reach the
//! core pre-merged into typed [`Game`] records through the [`GameSource`]
//! trait; the API never parses a feed itself. Tests and the pilot binary
//! use the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use sqlx::PgPool;

use gridcast_engine::{CostTracker, EmbeddingBackend, LlmBackend, PromptEngine, RateLimiter};
use gridcast_graph::GraphWriter;
use gridcast_store::{BriefCache, PlaybookStore};
use gridcast_types::{CategoryRegistry, Game, GameId, RunId, RunPlaybook};

use crate::error::ApiError;

/// A read-only provider of typed game records.
pub trait GameSource: Send + Sync {
    /// Look up a game by id.
    fn game(&self, game_id: &GameId) -> Option<Game>;
}

/// In-memory game source for tests and pilots.
#[derive(Default)]
pub struct InMemoryGames {
    games: RwLock<BTreeMap<GameId, Game>>,
}

impl InMemoryGames {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a game (feed updates flow through here).
    pub fn upsert(&self, game: Game) {
        if let Ok(mut games) = self.games.write() {
            games.insert(game.game_id.clone(), game);
        }
    }
}

impl GameSource for InMemoryGames {
    fn game(&self, game_id: &GameId) -> Option<Game> {
        self.games
            .read()
            .ok()
            .and_then(|games| games.get(game_id).cloned())
    }
}

/// Shared state behind every handler.
pub struct AppState {
    /// Primary storage.
    pub pool: PgPool,
    /// The 83-entry category registry.
    pub categories: CategoryRegistry,
    /// Playbook of the run this service was booted for.
    pub default_playbook: RunPlaybook,
    /// Game records from the external feed.
    pub games: Arc<dyn GameSource>,
    /// Draft model backend.
    pub draft_backend: LlmBackend,
    /// Critic model backend.
    pub critic_backend: LlmBackend,
    /// Shadow model backend, present when shadow generation is enabled.
    pub shadow_backend: Option<LlmBackend>,
    /// Embedding backend.
    pub embedder: EmbeddingBackend,
    /// Prompt templates.
    pub prompts: PromptEngine,
    /// Write-behind graph producer.
    pub graph: Option<GraphWriter>,
    /// Short-TTL live-brief cache.
    pub briefs: Option<BriefCache>,
    /// Per-expert tool rate limits.
    pub rate_limits: Mutex<RateLimiter>,
    /// LLM cost accumulator.
    pub cost: CostTracker,
}

impl AppState {
    /// Resolve the playbook governing `run_id`: the boot playbook when
    /// it matches, otherwise the persisted one.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::UnknownRun`] when no playbook exists.
    pub async fn playbook_for(&self, run_id: &RunId) -> Result<RunPlaybook, ApiError> {
        if self.default_playbook.run_id == *run_id {
            return Ok(self.default_playbook.clone());
        }
        PlaybookStore::new(&self.pool)
            .get(run_id)
            .await
            .map_err(|_| ApiError::UnknownRun(run_id.to_string()))
    }

    /// The game record for `game_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] when the feed has no such game.
    pub fn game(&self, game_id: &GameId) -> Result<Game, ApiError> {
        self.games
            .game(game_id)
            .ok_or_else(|| ApiError::NotFound(format!("game {game_id}")))
    }
}
