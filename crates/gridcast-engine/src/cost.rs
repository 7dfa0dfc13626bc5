//! LLM cost tracking.
//!
//! Thread-safe accumulator for token usage and estimated spend across
//! draft and critic calls. All monetary arithmetic uses
//! [`rust_decimal::Decimal`]; totals feed the shadow telemetry cost
//! fields and run-level summaries.

use std::sync::Mutex;

use rust_decimal::Decimal;

/// One million, the denominator for per-million-token pricing.
const ONE_MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Thread-safe LLM cost tracker.
///
/// Holds per-million-token pricing for the draft and critic tiers and
/// accumulates token counts and estimated cost. Safe to share via
/// `Arc<CostTracker>`.
pub struct CostTracker {
    draft_input_rate: Decimal,
    draft_output_rate: Decimal,
    critic_input_rate: Decimal,
    critic_output_rate: Decimal,
    inner: Mutex<CostInner>,
}

#[derive(Debug, Default)]
struct CostInner {
    total_calls: u64,
    total_input_tokens: u64,
    total_output_tokens: u64,
    total_estimated_cost: Decimal,
    draft_calls: u64,
    critic_calls: u64,
}

/// Snapshot of accumulated cost state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostSummary {
    /// Total LLM calls recorded.
    pub total_calls: u64,
    /// Total input tokens.
    pub total_input_tokens: u64,
    /// Total output tokens.
    pub total_output_tokens: u64,
    /// Estimated spend in dollars.
    pub total_estimated_cost: Decimal,
    /// Calls routed to the draft tier.
    pub draft_calls: u64,
    /// Calls routed to the critic tier.
    pub critic_calls: u64,
}

/// Which pricing tier a call used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostTier {
    /// Draft model pricing.
    Draft,
    /// Critic model pricing.
    Critic,
}

impl CostTracker {
    /// Create a tracker with per-million-token dollar rates.
    pub const fn new(
        draft_input_rate: Decimal,
        draft_output_rate: Decimal,
        critic_input_rate: Decimal,
        critic_output_rate: Decimal,
    ) -> Self {
        Self {
            draft_input_rate,
            draft_output_rate,
            critic_input_rate,
            critic_output_rate,
            inner: Mutex::new(CostInner {
                total_calls: 0,
                total_input_tokens: 0,
                total_output_tokens: 0,
                total_estimated_cost: Decimal::ZERO,
                draft_calls: 0,
                critic_calls: 0,
            }),
        }
    }

    /// A tracker with all rates zero (tests, stub backends).
    pub const fn free() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
    }

    /// Record one completed call.
    pub fn record_call(&self, tier: CostTier, input_tokens: u64, output_tokens: u64) {
        let (input_rate, output_rate) = match tier {
            CostTier::Draft => (self.draft_input_rate, self.draft_output_rate),
            CostTier::Critic => (self.critic_input_rate, self.critic_output_rate),
        };

        let input_cost = Decimal::from(input_tokens)
            .checked_mul(input_rate)
            .and_then(|c| c.checked_div(ONE_MILLION))
            .unwrap_or(Decimal::ZERO);
        let output_cost = Decimal::from(output_tokens)
            .checked_mul(output_rate)
            .and_then(|c| c.checked_div(ONE_MILLION))
            .unwrap_or(Decimal::ZERO);

        if let Ok(mut inner) = self.inner.lock() {
            inner.total_calls = inner.total_calls.saturating_add(1);
            inner.total_input_tokens = inner.total_input_tokens.saturating_add(input_tokens);
            inner.total_output_tokens = inner.total_output_tokens.saturating_add(output_tokens);
            inner.total_estimated_cost = inner
                .total_estimated_cost
                .saturating_add(input_cost)
                .saturating_add(output_cost);
            match tier {
                CostTier::Draft => inner.draft_calls = inner.draft_calls.saturating_add(1),
                CostTier::Critic => inner.critic_calls = inner.critic_calls.saturating_add(1),
            }
        }
    }

    /// Snapshot the accumulated state.
    pub fn summary(&self) -> CostSummary {
        self.inner.lock().map_or(
            CostSummary {
                total_calls: 0,
                total_input_tokens: 0,
                total_output_tokens: 0,
                total_estimated_cost: Decimal::ZERO,
                draft_calls: 0,
                critic_calls: 0,
            },
            |inner| CostSummary {
                total_calls: inner.total_calls,
                total_input_tokens: inner.total_input_tokens,
                total_output_tokens: inner.total_output_tokens,
                total_estimated_cost: inner.total_estimated_cost,
                draft_calls: inner.draft_calls,
                critic_calls: inner.critic_calls,
            },
        )
    }
}
