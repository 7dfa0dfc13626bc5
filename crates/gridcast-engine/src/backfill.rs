//! Write-behind embedding backfill.
//!
//! Bundle generation computes only the `combined` embedding at write
//! time; settlement writes learning memories with no embeddings at all.
//! This job walks memories that still lack a dimension and fills all
//! four, making retrieval-eligible what the hot path deferred.

use sqlx::PgPool;

use gridcast_store::MemoryStore;
use gridcast_types::{EpisodicMemory, MemoryEmbeddings, RunId};

use crate::embed::EmbeddingBackend;
use crate::error::EngineError;

/// Default batch size per backfill pass.
const BACKFILL_BATCH: i64 = 64;

/// Fill missing embedding dimensions for up to one batch of memories.
///
/// Returns the number of memories updated; zero means the run is fully
/// embedded and the caller can back off.
///
/// # Errors
///
/// Returns [`EngineError`] on store or embedding failure; partially
/// processed batches are fine (each memory updates independently and the
/// next pass picks up the rest).
pub async fn backfill_embeddings(
    pool: &PgPool,
    embedder: &EmbeddingBackend,
    run_id: &RunId,
) -> Result<usize, EngineError> {
    let store = MemoryStore::new(pool);
    let pending = store.pending_embedding(run_id, BACKFILL_BATCH).await?;
    let mut updated = 0_usize;

    for memory in &pending {
        let embeddings = embed_memory(embedder, memory).await?;
        store.update_embeddings(memory.memory_id, &embeddings).await?;
        updated = updated.saturating_add(1);
    }

    if updated > 0 {
        tracing::debug!(run_id = %run_id, updated, "embedding backfill pass complete");
    }
    Ok(updated)
}

/// Compute all four embedding dimensions for one memory.
async fn embed_memory(
    embedder: &EmbeddingBackend,
    memory: &EpisodicMemory,
) -> Result<MemoryEmbeddings, EngineError> {
    let game_context_text = format!(
        "{} at {} season {} week {}",
        memory.away_team, memory.home_team, memory.season, memory.week
    );
    let prediction_text = memory.content.clone();
    let outcome_text = memory
        .metadata
        .get("correct")
        .map_or_else(
            || memory.content.clone(),
            |correct| format!("{} outcome {correct}", memory.content),
        );
    let combined_text = format!("{game_context_text}. {prediction_text}");

    Ok(MemoryEmbeddings {
        game_context: Some(embedder.embed(&game_context_text).await?),
        prediction: Some(embedder.embed(&prediction_text).await?),
        outcome: Some(embedder.embed(&outcome_text).await?),
        combined: Some(embedder.embed(&combined_text).await?),
    })
}
