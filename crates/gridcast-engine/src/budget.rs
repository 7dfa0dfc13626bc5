//! Tool budgets and rate limits for expert tasks.
//!
//! Every suspension point (model call, embedding call, tool call) charges
//! the task's budget. A task that exceeds its call or time cap is
//! cancelled cooperatively: the next charge attempt reports exhaustion
//! and the generator aborts without persisting a partial bundle. Rate
//! limits for named tools are enforced per expert per run.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use gridcast_types::{ExpertId, ToolBudget};

use crate::error::EngineError;

/// Tracks one expert task's consumption against its budget.
#[derive(Debug)]
pub struct BudgetTracker {
    expert_id: ExpertId,
    budget: ToolBudget,
    calls_used: u32,
    time_used: Duration,
    started: Instant,
}

impl BudgetTracker {
    /// Start tracking a fresh task.
    pub fn new(expert_id: ExpertId, budget: ToolBudget) -> Self {
        Self {
            expert_id,
            budget,
            calls_used: 0,
            time_used: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Charge one call plus its observed duration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ToolBudgetExceeded`] when either cap is hit.
    pub fn charge(&mut self, elapsed: Duration) -> Result<(), EngineError> {
        self.calls_used = self.calls_used.saturating_add(1);
        self.time_used = self.time_used.saturating_add(elapsed);

        if self.calls_used > self.budget.max_calls {
            return Err(EngineError::ToolBudgetExceeded {
                expert_id: self.expert_id.clone(),
                detail: format!("{} calls > cap {}", self.calls_used, self.budget.max_calls),
            });
        }
        let used_ms = u64::try_from(self.time_used.as_millis()).unwrap_or(u64::MAX);
        if used_ms > self.budget.max_time_ms {
            return Err(EngineError::ToolBudgetExceeded {
                expert_id: self.expert_id.clone(),
                detail: format!("{used_ms}ms > cap {}ms", self.budget.max_time_ms),
            });
        }
        Ok(())
    }

    /// Remaining time before the cap, for annotating suspension points.
    pub fn remaining_time(&self) -> Duration {
        let cap = Duration::from_millis(self.budget.max_time_ms);
        cap.saturating_sub(self.time_used)
    }

    /// Wall-clock age of the task.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Calls consumed so far.
    pub const fn calls_used(&self) -> u32 {
        self.calls_used
    }

    /// The expert this tracker belongs to.
    pub const fn expert_id(&self) -> &ExpertId {
        &self.expert_id
    }
}

/// Minimum spacing between calls for a named tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Minimum interval between consecutive calls.
    pub min_interval: Duration,
}

/// Per-`(expert, tool)` rate limiting.
///
/// Defaults cover the external tools the orchestrator mediates: news
/// lookups at most 6/min and market polls at least 60 s apart.
#[derive(Debug)]
pub struct RateLimiter {
    limits: BTreeMap<String, RateLimit>,
    last_call: BTreeMap<(ExpertId, String), Instant>,
}

impl RateLimiter {
    /// A limiter with the standard tool limits.
    pub fn standard() -> Self {
        let limits = BTreeMap::from([
            (
                String::from("news"),
                RateLimit {
                    min_interval: Duration::from_secs(10),
                },
            ),
            (
                String::from("market"),
                RateLimit {
                    min_interval: Duration::from_secs(60),
                },
            ),
        ]);
        Self {
            limits,
            last_call: BTreeMap::new(),
        }
    }

    /// Try to take a call slot for `(expert, tool)`.
    ///
    /// Returns `false` when the tool's minimum interval has not elapsed;
    /// the caller should skip the tool call, not error.
    pub fn try_acquire(&mut self, expert_id: &ExpertId, tool: &str) -> bool {
        let Some(limit) = self.limits.get(tool) else {
            return true;
        };
        let key = (expert_id.clone(), tool.to_owned());
        let now = Instant::now();
        match self.last_call.get(&key) {
            Some(last) if now.duration_since(*last) < limit.min_interval => false,
            _ => {
                self.last_call.insert(key, now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_calls: u32, max_time_ms: u64) -> BudgetTracker {
        BudgetTracker::new(
            ExpertId::new("statistics_purist"),
            ToolBudget {
                max_calls,
                max_time_ms,
            },
        )
    }

    #[test]
    fn charges_within_budget_succeed() {
        let mut tracker = tracker(3, 10_000);
        assert!(tracker.charge(Duration::from_millis(100)).is_ok());
        assert!(tracker.charge(Duration::from_millis(100)).is_ok());
        assert_eq!(tracker.calls_used(), 2);
    }

    #[test]
    fn call_cap_is_enforced() {
        let mut tracker = tracker(2, 10_000);
        let _ = tracker.charge(Duration::ZERO);
        let _ = tracker.charge(Duration::ZERO);
        assert!(matches!(
            tracker.charge(Duration::ZERO),
            Err(EngineError::ToolBudgetExceeded { .. })
        ));
    }

    #[test]
    fn time_cap_is_enforced() {
        let mut tracker = tracker(10, 1_000);
        assert!(matches!(
            tracker.charge(Duration::from_millis(1_500)),
            Err(EngineError::ToolBudgetExceeded { .. })
        ));
    }

    #[test]
    fn remaining_time_saturates_at_zero() {
        let mut tracker = tracker(10, 500);
        let _ = tracker.charge(Duration::from_millis(800));
        assert_eq!(tracker.remaining_time(), Duration::ZERO);
    }

    #[test]
    fn rate_limiter_blocks_rapid_repeat() {
        let mut limiter = RateLimiter::standard();
        let expert = ExpertId::new("sharp_money_follower");
        assert!(limiter.try_acquire(&expert, "market"));
        assert!(!limiter.try_acquire(&expert, "market"));
        // A different expert has its own bucket.
        assert!(limiter.try_acquire(&ExpertId::new("value_hunter"), "market"));
    }

    #[test]
    fn unknown_tools_are_unlimited() {
        let mut limiter = RateLimiter::standard();
        let expert = ExpertId::new("value_hunter");
        assert!(limiter.try_acquire(&expert, "scoreboard"));
        assert!(limiter.try_acquire(&expert, "scoreboard"));
    }
}
