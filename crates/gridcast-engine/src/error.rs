//! Error types for context assembly and bundle generation.

use gridcast_types::ExpertId;

/// Errors that can occur in the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Expert lookup or config failure.
    #[error(transparent)]
    Expert(#[from] gridcast_experts::ExpertError),

    /// A data-layer operation failed.
    #[error(transparent)]
    Store(#[from] gridcast_store::StoreError),

    /// A graph mirror operation failed.
    #[error(transparent)]
    Graph(#[from] gridcast_graph::GraphError),

    /// An LLM backend call failed after retries.
    #[error("llm backend error: {0}")]
    LlmBackend(String),

    /// An embedding backend call failed after retries.
    #[error("embedding backend error: {0}")]
    Embedding(String),

    /// A prompt template could not be loaded or rendered.
    #[error("template error: {0}")]
    Template(String),

    /// The model response could not be parsed into a draft.
    #[error("parse error: {0}")]
    Parse(String),

    /// An expert task exceeded its hard wall-clock deadline.
    #[error("expert {expert_id} exceeded deadline ({deadline_ms}ms)")]
    Timeout {
        /// The cancelled expert.
        expert_id: ExpertId,
        /// The deadline that was exceeded.
        deadline_ms: u64,
    },

    /// An expert task exhausted its tool budget.
    #[error("expert {expert_id} exceeded tool budget: {detail}")]
    ToolBudgetExceeded {
        /// The cancelled expert.
        expert_id: ExpertId,
        /// Which cap was hit.
        detail: String,
    },
}
