//! Integration tests for the Gridcast API endpoints.
//!
//! Tests drive the `Router` directly via `tower::ServiceExt` without a
//! TCP server. Paths that would touch `PostgreSQL` are exercised only up
//! to the point where handler-level validation rejects the request, so
//! no live database is needed.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use tower::ServiceExt;

use gridcast_api::state::InMemoryGames;
use gridcast_api::{AppState, build_router};
use gridcast_engine::{
    CostTracker, EmbeddingBackend, LlmBackend, PromptEngine, RateLimiter, StubBackend,
};
use gridcast_types::{
    CategoryRegistry, Game, GameId, GameStatus, MarketLines, RunId, RunPlaybook, TeamId,
};

fn test_game(id: &str) -> Game {
    Game {
        game_id: GameId::new(id),
        season: 2025,
        week: 5,
        date: Utc::now(),
        home_team: TeamId::new("KC"),
        away_team: TeamId::new("BUF"),
        venue: String::from("Arrowhead Stadium"),
        weather: None,
        market_lines: MarketLines {
            spread: -3.0,
            total: 47.5,
            moneyline_home: -160,
            moneyline_away: 140,
        },
        injuries: Vec::new(),
        status: GameStatus::Scheduled,
        final_score: None,
    }
}

fn make_test_state() -> Arc<AppState> {
    let games = InMemoryGames::new();
    games.upsert(test_game("2025-W5-KC-BUF"));

    // connect_lazy defers any actual connection; handlers under test
    // never reach the database.
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/gridcast_test")
        .unwrap();

    Arc::new(AppState {
        pool,
        categories: CategoryRegistry::standard(),
        default_playbook: RunPlaybook {
            run_id: RunId::new("pilot"),
            ..RunPlaybook::default()
        },
        games: Arc::new(games),
        draft_backend: LlmBackend::Stub(StubBackend::scripted(Vec::new())),
        critic_backend: LlmBackend::Stub(StubBackend::scripted(Vec::new())),
        shadow_backend: None,
        embedder: EmbeddingBackend::stub(),
        prompts: PromptEngine::embedded().unwrap(),
        graph: None,
        briefs: None,
        rate_limits: std::sync::Mutex::new(RateLimiter::standard()),
        cost: CostTracker::free(),
    })
}

fn json_post(path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn unknown_game_is_a_404() {
    let router = build_router(make_test_state());
    let request = json_post(
        "/context-pack",
        serde_json::json!({
            "run_id": "pilot",
            "expert_id": "conservative_analyzer",
            "game_id": "no-such-game"
        }),
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let router = build_router(make_test_state());
    let request = Request::builder()
        .method("POST")
        .uri("/context-pack")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shadow_predictions_require_shadow_enabled_run() {
    // The pilot playbook has shadow_enabled = false; the handler must
    // refuse before touching any storage.
    let router = build_router(make_test_state());
    let request = json_post(
        "/shadow/predictions",
        serde_json::json!({
            "shadow_run_id": "shadow-1",
            "run_id": "pilot",
            "game_id": "2025-W5-KC-BUF",
            "expert_id": "conservative_analyzer"
        }),
    );
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_a_404() {
    let router = build_router(make_test_state());
    let request = Request::builder()
        .method("GET")
        .uri("/definitely-not-a-route")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn error_payload_carries_message_and_status() {
    let router = build_router(make_test_state());
    let request = json_post(
        "/context-pack",
        serde_json::json!({
            "run_id": "pilot",
            "expert_id": "conservative_analyzer",
            "game_id": "no-such-game"
        }),
    );
    let response = router.oneshot(request).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), 1_024 * 1_024)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(payload.get("status").and_then(serde_json::Value::as_u64), Some(404));
    assert!(
        payload
            .get("error")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|msg| msg.contains("no-such-game"))
    );
}
