//! The run playbook: the single explicit configuration mapping a run
//! recognizes.
//!
//! Unknown keys are deserialization errors, not warnings
//! (`deny_unknown_fields`); every recognized option has a documented
//! default. The playbook is persisted as a JSON blob per run and treated
//! as immutable once the run starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{DemotionPolicy, GenerationMode, PayoffSchedule};
use crate::ids::{ExpertId, RunId};

/// Default council size N.
pub const DEFAULT_COUNCIL_SIZE: usize = 5;

/// Default rolling performance window in weeks.
pub const DEFAULT_ROLLING_WINDOW_WEEKS: u8 = 4;

/// Default requested K for context packs.
pub const DEFAULT_K_DESIRED: usize = 12;

/// Default maximum repair iterations.
pub const DEFAULT_REPAIR_MAX_ITERS: u8 = 2;

/// Default hard deadline per expert per game.
pub const DEFAULT_PER_EXPERT_DEADLINE_MS: u64 = 30_000;

/// Per-expert external-call budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields)]
pub struct ToolBudget {
    /// Maximum tool calls per expert per game.
    pub max_calls: u32,
    /// Maximum cumulative suspension time per expert per game.
    pub max_time_ms: u64,
}

impl Default for ToolBudget {
    fn default() -> Self {
        Self {
            max_calls: 10,
            max_time_ms: 20_000,
        }
    }
}

/// The active policy for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(deny_unknown_fields, default)]
pub struct RunPlaybook {
    /// The run this playbook governs.
    pub run_id: RunId,
    /// Council size N.
    pub council_size: usize,
    /// Rolling performance window W in weeks.
    pub rolling_window_weeks: u8,
    /// Bundle generation mode.
    pub mode: GenerationMode,
    /// Requested context-pack K, clamped to `[10, 20]` at validation.
    pub k_desired: usize,
    /// Maximum repair iterations.
    pub repair_max_iters: u8,
    /// Hard wall-clock deadline per expert per game.
    pub per_expert_deadline_ms: u64,
    /// Tool budget applied to every expert unless its config narrows it.
    pub tool_budget: ToolBudget,
    /// Whether shadow A/B generation is active.
    pub shadow_enabled: bool,
    /// Shadow model override per expert.
    pub shadow_models: BTreeMap<ExpertId, String>,
    /// Stake payoff schedule.
    pub payoff: PayoffSchedule,
    /// Eligibility demotion policy.
    pub demotion: DemotionPolicy,
}

impl Default for RunPlaybook {
    fn default() -> Self {
        Self {
            run_id: RunId::new("default"),
            council_size: DEFAULT_COUNCIL_SIZE,
            rolling_window_weeks: DEFAULT_ROLLING_WINDOW_WEEKS,
            mode: GenerationMode::Deliberate,
            k_desired: DEFAULT_K_DESIRED,
            repair_max_iters: DEFAULT_REPAIR_MAX_ITERS,
            per_expert_deadline_ms: DEFAULT_PER_EXPERT_DEADLINE_MS,
            tool_budget: ToolBudget::default(),
            shadow_enabled: false,
            shadow_models: BTreeMap::new(),
            payoff: PayoffSchedule::Flat,
            demotion: DemotionPolicy::WeekBoundary,
        }
    }
}

/// A playbook field that failed validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlaybookError {
    /// A numeric option is outside its legal range.
    #[error("playbook option `{field}` out of range: {detail}")]
    OutOfRange {
        /// The offending option name.
        field: &'static str,
        /// What was wrong.
        detail: String,
    },
}

impl RunPlaybook {
    /// Validate every option against its documented range.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybookError::OutOfRange`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PlaybookError> {
        if self.council_size == 0 || self.council_size > 15 {
            return Err(PlaybookError::OutOfRange {
                field: "council_size",
                detail: format!("{} not in [1, 15]", self.council_size),
            });
        }
        if self.rolling_window_weeks == 0 {
            return Err(PlaybookError::OutOfRange {
                field: "rolling_window_weeks",
                detail: String::from("must be positive"),
            });
        }
        if !(10..=20).contains(&self.k_desired) {
            return Err(PlaybookError::OutOfRange {
                field: "k_desired",
                detail: format!("{} not in [10, 20]", self.k_desired),
            });
        }
        if self.repair_max_iters > 2 {
            return Err(PlaybookError::OutOfRange {
                field: "repair_max_iters",
                detail: format!("{} exceeds 2", self.repair_max_iters),
            });
        }
        if self.per_expert_deadline_ms == 0 {
            return Err(PlaybookError::OutOfRange {
                field: "per_expert_deadline_ms",
                detail: String::from("must be positive"),
            });
        }
        if self.tool_budget.max_calls == 0 || self.tool_budget.max_time_ms == 0 {
            return Err(PlaybookError::OutOfRange {
                field: "tool_budget",
                detail: String::from("max_calls and max_time_ms must be positive"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_playbook_validates() {
        assert_eq!(RunPlaybook::default().validate(), Ok(()));
    }

    #[test]
    fn unknown_options_are_errors() {
        let json = r#"{"run_id": "r1", "surprise_option": true}"#;
        let parsed: Result<RunPlaybook, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn k_desired_out_of_range_is_named() {
        let playbook = RunPlaybook {
            k_desired: 25,
            ..RunPlaybook::default()
        };
        let err = playbook.validate();
        assert!(matches!(
            err,
            Err(PlaybookError::OutOfRange {
                field: "k_desired",
                ..
            })
        ));
    }

    #[test]
    fn repair_iters_capped_at_two() {
        let playbook = RunPlaybook {
            repair_max_iters: 3,
            ..RunPlaybook::default()
        };
        assert!(playbook.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"run_id": "pilot-1", "council_size": 7}"#;
        let parsed: RunPlaybook = serde_json::from_str(json).unwrap_or_default();
        assert_eq!(parsed.run_id, RunId::new("pilot-1"));
        assert_eq!(parsed.council_size, 7);
        assert_eq!(parsed.k_desired, DEFAULT_K_DESIRED);
        assert_eq!(parsed.payoff, PayoffSchedule::Flat);
    }
}
