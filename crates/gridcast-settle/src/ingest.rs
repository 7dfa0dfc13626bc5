//! Outcome ingestion: the single-writer settlement pipeline.
//!
//! One call settles one `(run, game)` pair. The idempotency claim in
//! `settled_games` plus a transaction-scoped advisory lock guarantee a
//! single writer; a duplicate submission is a no-op. All primary-store
//! mutations -- outcome rows, calibration buckets, learned weights,
//! bankrolls, gates, learning memories, team/matchup aggregates --
//! commit in one transaction, and the graph mirror is enqueued only
//! after commit.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use gridcast_experts::{DecayEngine, ExpertRegistry, ema};
use gridcast_graph::{GraphUpdate, GraphWriter, settlement_update};
use gridcast_store::{
    BankrollStore, BundleStore, CalibrationStore, KnowledgeStore, MemoryStore, OutcomeRecord,
    OutcomeStore, WeightsStore,
};
use gridcast_store::calibration_store::CalibrationBucket;
use gridcast_types::{
    CategoryRegistry, ExpertId, Game, GameStatus, MemoryId, OutcomeId, PredictionBundle,
    RunId, RunPlaybook, Side, TeamKnowledge, well_known,
};

use crate::bankroll::settle_stake;
use crate::calibration::apply_grade;
use crate::error::SettleError;
use crate::grading::{Grade, ResolvedValues, derive_actuals, grade};
use crate::memories::{GradeTally, learning_memory};
use crate::revision::{ETA_DEFAULT, revise};

/// EMA rate for team-knowledge accuracy updates.
const TEAM_ACCURACY_LAMBDA: f64 = 0.25;

/// The result of one settlement submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReport {
    /// Graded assertion rows written.
    pub settled_assertions: usize,
    /// Experts whose state was updated.
    pub updated_experts: Vec<ExpertId>,
    /// True when the game was already settled (no-op).
    pub duplicate: bool,
}

impl SettlementReport {
    const fn duplicate() -> Self {
        Self {
            settled_assertions: 0,
            updated_experts: Vec::new(),
            duplicate: true,
        }
    }
}

/// Settles finalised games against stored bundles.
pub struct OutcomeIngestor<'a> {
    pool: &'a PgPool,
    graph: Option<&'a GraphWriter>,
}

impl<'a> OutcomeIngestor<'a> {
    /// Create an ingestor bound to a connection pool.
    pub const fn new(pool: &'a PgPool, graph: Option<&'a GraphWriter>) -> Self {
        Self { pool, graph }
    }

    /// Settle one finalised game.
    ///
    /// `resolved_overlay` carries feed-supplied stat resolutions merged
    /// over the score-derived actuals.
    ///
    /// # Errors
    ///
    /// Returns [`SettleError::GameNotFinal`] for a game without a final
    /// score and [`SettleError::Store`] on storage failure. A duplicate
    /// submission succeeds with `duplicate = true`.
    #[allow(clippy::too_many_lines)]
    pub async fn settle(
        &self,
        run_id: &RunId,
        game: &Game,
        resolved_overlay: ResolvedValues,
        registry: &CategoryRegistry,
        experts: &ExpertRegistry,
        playbook: &RunPlaybook,
    ) -> Result<SettlementReport, SettleError> {
        let Some(score) = game
            .final_score
            .filter(|_| game.status == GameStatus::Final)
        else {
            return Err(SettleError::GameNotFinal(game.game_id.clone()));
        };

        let outcome_store = OutcomeStore::new(self.pool);
        let Some(mut tx) = outcome_store.begin_settlement(run_id, &game.game_id).await? else {
            return Ok(SettlementReport::duplicate());
        };

        let mut actuals = derive_actuals(game, &score);
        actuals.extend(resolved_overlay);

        let bundles = BundleStore::new(self.pool)
            .for_game(run_id, &game.game_id)
            .await?;

        let bankroll_store = BankrollStore::new(self.pool);
        let calibration_store = CalibrationStore::new(self.pool);
        let weights_store = WeightsStore::new(self.pool);
        let knowledge_store = KnowledgeStore::new(self.pool);

        let now = Utc::now();
        let mut settled_assertions = 0_usize;
        let mut updated_experts = Vec::new();
        let mut graph_updates: Vec<GraphUpdate> = Vec::new();

        for bundle in &bundles {
            // Gate EMAs fold in every bundle, valid or not.
            let mut gate = bankroll_store.gate(run_id, &bundle.expert_id).await?;
            gate.observe(bundle.schema_valid, bundle.latency_ms);
            BankrollStore::upsert_gate_tx(&mut tx, run_id, &bundle.expert_id, &gate).await?;

            if !bundle.council_eligible() {
                continue;
            }
            let Ok(config) = experts.get(&bundle.expert_id) else {
                tracing::warn!(
                    expert_id = %bundle.expert_id,
                    "bundle from unregistered expert skipped"
                );
                continue;
            };

            let engine = DecayEngine::for_expert(config);
            let days_since_prediction = (now - bundle.created_at)
                .num_seconds()
                .max(0) as f64
                / 86_400.0;

            let cited_factors = self.cited_factor_index(run_id, bundle).await?;
            let mut weights = weights_store.get(run_id, &bundle.expert_id).await?;
            let mut bankroll = bankroll_store.bankroll(run_id, &bundle.expert_id).await?;

            let mut tally = GradeTally::default();
            let mut right_examples = Vec::new();
            let mut wrong_examples = Vec::new();

            let picked_side = bundle
                .assertion(well_known::WINNER)
                .and_then(|a| a.value.as_choice())
                .map(|c| if c == "AWAY" { Side::Away } else { Side::Home });

            for assertion in bundle.assertions.values() {
                let Some(graded) = grade(assertion, &actuals, registry) else {
                    continue;
                };

                let payout = settle_stake(
                    playbook.payoff,
                    assertion.category_id.as_str(),
                    assertion.stake,
                    &graded,
                    &game.market_lines,
                    picked_side,
                );
                bankroll.settle(payout);

                let outcome_id = OutcomeId::new();
                OutcomeStore::insert_tx(
                    &mut tx,
                    &OutcomeRecord {
                        outcome_id,
                        run_id: run_id.clone(),
                        expert_id: bundle.expert_id.clone(),
                        game_id: game.game_id.clone(),
                        category_id: assertion.category_id.clone(),
                        season: game.season,
                        week: game.week,
                        correct: graded.correct,
                        abs_error: graded.abs_error,
                        confidence: assertion.confidence,
                        stake: assertion.stake,
                        payout,
                        settled_at: now,
                    },
                )
                .await?;
                settled_assertions = settled_assertions.saturating_add(1);

                self.update_calibration(
                    &calibration_store,
                    &mut tx,
                    run_id,
                    bundle,
                    assertion.category_id.as_str(),
                    &graded,
                    &engine,
                    days_since_prediction,
                    registry,
                )
                .await?;

                // Belief revision over cited factors.
                if let Some(correct) = graded.correct {
                    let factors = assertion
                        .why
                        .iter()
                        .flat_map(|id| cited_factors.get(id).cloned().unwrap_or_default())
                        .collect::<Vec<String>>();
                    if !factors.is_empty() {
                        revise(
                            &mut weights,
                            &factors,
                            correct,
                            &engine,
                            days_since_prediction,
                            ETA_DEFAULT,
                        );
                    }

                    if correct {
                        tally.correct = tally.correct.saturating_add(1);
                        right_examples.push(assertion.category_id.to_string());
                    } else {
                        tally.incorrect = tally.incorrect.saturating_add(1);
                        wrong_examples.push(assertion.category_id.to_string());
                    }
                }

                graph_updates.push(settlement_update(
                    run_id,
                    bundle.bundle_id,
                    &assertion.category_id,
                    outcome_id,
                    &game.game_id,
                    graded.correct,
                    graded.abs_error,
                ));
            }

            // Memory formation and aggregates ride the same transaction
            // as the outcome rows they summarize.
            let memory = learning_memory(bundle, game, tally, &right_examples, &wrong_examples);
            MemoryStore::insert_tx(&mut tx, &memory).await?;

            self.update_team_knowledge(&knowledge_store, &mut tx, run_id, bundle, game, tally)
                .await?;
            KnowledgeStore::observe_matchup_tx(
                &mut tx,
                run_id,
                &bundle.expert_id,
                &game.home_team,
                &game.away_team,
                &serde_json::json!({
                    game.game_id.as_str(): { "correct": tally.correct, "incorrect": tally.incorrect }
                }),
            )
            .await?;

            WeightsStore::upsert_tx(&mut tx, run_id, &bundle.expert_id, &weights).await?;
            BankrollStore::upsert_bankroll_tx(&mut tx, run_id, &bundle.expert_id, &bankroll)
                .await?;

            updated_experts.push(bundle.expert_id.clone());
        }

        tx.commit().await?;

        if let Some(graph) = self.graph {
            for update in graph_updates {
                graph.enqueue(update)?;
            }
        }

        tracing::info!(
            run_id = %run_id,
            game_id = %game.game_id,
            settled_assertions,
            experts = updated_experts.len(),
            "game settled"
        );

        Ok(SettlementReport {
            settled_assertions,
            updated_experts,
            duplicate: false,
        })
    }

    /// Map cited memory ids to the factor tags their metadata carries.
    async fn cited_factor_index(
        &self,
        run_id: &RunId,
        bundle: &PredictionBundle,
    ) -> Result<BTreeMap<MemoryId, Vec<String>>, SettleError> {
        let cited: Vec<MemoryId> = bundle
            .assertions
            .values()
            .flat_map(|a| a.why.iter().copied())
            .collect();
        if cited.is_empty() {
            return Ok(BTreeMap::new());
        }

        let memories = MemoryStore::new(self.pool).fetch_by_ids(run_id, &cited).await?;
        Ok(memories
            .into_iter()
            .map(|memory| {
                let factors = memory
                    .metadata
                    .get("factors")
                    .and_then(serde_json::Value::as_array)
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(serde_json::Value::as_str)
                            .map(ToOwned::to_owned)
                            .collect()
                    })
                    .unwrap_or_default();
                (memory.memory_id, factors)
            })
            .collect())
    }

    #[allow(clippy::too_many_arguments)]
    async fn update_calibration(
        &self,
        store: &CalibrationStore<'_>,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        run_id: &RunId,
        bundle: &PredictionBundle,
        category_id: &str,
        graded: &Grade,
        engine: &DecayEngine,
        days_since_prediction: f64,
        registry: &CategoryRegistry,
    ) -> Result<(), SettleError> {
        let category_key = gridcast_types::CategoryId::new(category_id);
        let mut bucket = match store.get(run_id, &bundle.expert_id, &category_key).await? {
            Some(bucket) => bucket,
            None => {
                let (prior_mean, prior_stdev) = registry
                    .get(&category_key)
                    .map_or((0.0, 1.0), |c| {
                        (c.prior_mean.unwrap_or(0.0), c.sigma.unwrap_or(1.0))
                    });
                CalibrationBucket::fresh(
                    run_id.clone(),
                    bundle.expert_id.clone(),
                    category_key,
                    prior_mean,
                    prior_stdev,
                )
            }
        };

        apply_grade(&mut bucket, graded, engine, days_since_prediction);
        CalibrationStore::upsert_tx(tx, &bucket).await?;
        Ok(())
    }

    async fn update_team_knowledge(
        &self,
        store: &KnowledgeStore<'_>,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        run_id: &RunId,
        bundle: &PredictionBundle,
        game: &Game,
        tally: GradeTally,
    ) -> Result<(), SettleError> {
        for team in [&game.home_team, &game.away_team] {
            let existing = store.team(run_id, &bundle.expert_id, team).await?;
            let knowledge = existing.map_or_else(
                || TeamKnowledge {
                    run_id: run_id.clone(),
                    expert_id: bundle.expert_id.clone(),
                    team_id: team.clone(),
                    recent_performance: serde_json::json!({
                        "last_game": game.game_id.as_str(),
                    }),
                    trends: serde_json::Value::Null,
                    confidence_level: 0.5,
                    accuracy_rate: tally.accuracy(),
                    knowledge_embedding: None,
                    updated_at: Utc::now(),
                },
                |mut knowledge| {
                    knowledge.accuracy_rate =
                        ema(knowledge.accuracy_rate, tally.accuracy(), TEAM_ACCURACY_LAMBDA);
                    knowledge.confidence_level = ema(
                        knowledge.confidence_level,
                        tally.strength(),
                        TEAM_ACCURACY_LAMBDA,
                    );
                    knowledge.recent_performance = serde_json::json!({
                        "last_game": game.game_id.as_str(),
                    });
                    knowledge.updated_at = Utc::now();
                    knowledge
                },
            );
            KnowledgeStore::upsert_team_tx(tx, &knowledge).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_report_shape() {
        let report = SettlementReport::duplicate();
        assert!(report.duplicate);
        assert_eq!(report.settled_assertions, 0);
        assert!(report.updated_experts.is_empty());
    }
}
