//! The expert registry: resolve ids to configs, enumerate the active set.
//!
//! The fifteen built-in personalities ship as embedded YAML; operators can
//! load an alternative directory from disk with identical validation. A
//! registry is built once per run and never mutated afterwards --
//! reconfiguration means building a new registry for a new run.

use std::collections::BTreeMap;

use gridcast_types::{ExpertId, RunId};

use crate::config::ExpertConfig;
use crate::error::ExpertError;

/// The built-in expert directory (15 personalities).
const BUILTIN_DIRECTORY: &str = include_str!("../experts.yml");

/// Number of personalities in the built-in directory.
pub const BUILTIN_EXPERT_COUNT: usize = 15;

/// Immutable, run-scoped directory of expert configurations.
#[derive(Debug, Clone)]
pub struct ExpertRegistry {
    run_id: RunId,
    experts: BTreeMap<ExpertId, ExpertConfig>,
}

impl ExpertRegistry {
    /// Build a registry for `run_id` from a YAML directory string.
    ///
    /// # Errors
    ///
    /// Returns [`ExpertError::Parse`] on malformed YAML,
    /// [`ExpertError::Directory`] on duplicates or an empty directory, and
    /// [`ExpertError::ConfigInvalid`] for the first config that fails
    /// validation.
    pub fn from_yaml(run_id: RunId, yaml: &str) -> Result<Self, ExpertError> {
        let configs: Vec<ExpertConfig> = serde_yml::from_str(yaml)?;
        if configs.is_empty() {
            return Err(ExpertError::Directory(String::from(
                "expert directory is empty",
            )));
        }

        let mut experts = BTreeMap::new();
        for config in configs {
            config.validate()?;
            let id = config.expert_id.clone();
            if experts.insert(id.clone(), config).is_some() {
                return Err(ExpertError::Directory(format!(
                    "duplicate expert id: {id}"
                )));
            }
        }

        tracing::info!(
            run_id = %run_id,
            expert_count = experts.len(),
            "expert registry loaded"
        );

        Ok(Self { run_id, experts })
    }

    /// Build a registry for `run_id` from the built-in directory.
    ///
    /// # Errors
    ///
    /// Only fails if the embedded directory is corrupt, which the test
    /// suite guards against.
    pub fn builtin(run_id: RunId) -> Result<Self, ExpertError> {
        Self::from_yaml(run_id, BUILTIN_DIRECTORY)
    }

    /// The run this registry is scoped to.
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Resolve an expert id to its config.
    ///
    /// # Errors
    ///
    /// Returns [`ExpertError::UnknownExpert`] if absent.
    pub fn get(&self, expert_id: &ExpertId) -> Result<&ExpertConfig, ExpertError> {
        self.experts
            .get(expert_id)
            .ok_or_else(|| ExpertError::UnknownExpert(expert_id.clone()))
    }

    /// The active set, ordered by `expert_id` for determinism.
    pub fn list(&self) -> Vec<&ExpertConfig> {
        self.experts.values().collect()
    }

    /// Number of registered experts.
    pub fn len(&self) -> usize {
        self.experts.len()
    }

    /// Whether the registry is empty (never true after construction).
    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }

    /// Whether an expert id is registered.
    pub fn contains(&self, expert_id: &ExpertId) -> bool {
        self.experts.contains_key(expert_id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use gridcast_types::CategoryFamily;

    use super::*;

    fn registry() -> ExpertRegistry {
        ExpertRegistry::builtin(RunId::new("test-run")).unwrap_or_else(|e| {
            // The embedded directory must always load; surface the reason.
            panic!("builtin directory failed to load: {e}")
        })
    }

    #[test]
    fn builtin_directory_has_fifteen_experts() {
        assert_eq!(registry().len(), BUILTIN_EXPERT_COUNT);
    }

    #[test]
    fn builtin_directory_validates() {
        let reg = registry();
        for config in reg.list() {
            assert!(config.validate().is_ok(), "{} invalid", config.expert_id);
        }
    }

    #[test]
    fn list_is_ordered_by_expert_id() {
        let reg = registry();
        let ids: Vec<&str> = reg.list().iter().map(|c| c.expert_id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn get_unknown_expert_fails() {
        let reg = registry();
        let missing = ExpertId::new("nonexistent_expert");
        assert!(matches!(
            reg.get(&missing),
            Err(ExpertError::UnknownExpert(_))
        ));
    }

    #[test]
    fn scenario_experts_are_present() {
        let reg = registry();
        for id in [
            "conservative_analyzer",
            "momentum_rider",
            "weather_specialist",
        ] {
            assert!(reg.contains(&ExpertId::new(id)), "missing {id}");
        }
    }

    #[test]
    fn conservative_analyzer_confidence_range() {
        let reg = registry();
        let config = reg.get(&ExpertId::new("conservative_analyzer")).ok();
        assert_eq!(config.map(|c| c.confidence_range), Some([0.55, 0.70]));
    }

    #[test]
    fn momentum_rider_temporal_parameters() {
        let reg = registry();
        let config = reg.get(&ExpertId::new("momentum_rider")).ok();
        let temporal = config.map(|c| c.temporal.clone());
        assert!(temporal.as_ref().is_some_and(|t| (t.half_life_days - 45.0).abs() < 1e-9));
        assert!(temporal.as_ref().is_some_and(|t| (t.similarity_weight - 0.4).abs() < 1e-9));
        assert!(temporal.as_ref().is_some_and(|t| (t.temporal_weight - 0.6).abs() < 1e-9));
    }

    #[test]
    fn weather_specialist_has_long_half_life() {
        let reg = registry();
        let config = reg.get(&ExpertId::new("weather_specialist")).ok();
        assert!(config.is_some_and(|c| (c.temporal.half_life_days - 730.0).abs() < 1e-9));
    }

    #[test]
    fn category_overrides_parse() {
        let reg = registry();
        let config = reg.get(&ExpertId::new("sharp_money_follower")).ok();
        assert!(config.is_some_and(|c| {
            c.temporal
                .category_half_life
                .contains_key(&CategoryFamily::Markets)
        }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let yaml = r"
- expert_id: twin
  display_name: Twin A
  personality: conservative
  voice: a
  analytical_focus: { fundamentals: 0.5 }
  temporal: { half_life_days: 90, similarity_weight: 0.6, temporal_weight: 0.4 }
  confidence_range: [0.5, 0.7]
  traits: { risk_tolerance: 0.5, contrarianism: 0.5, optimism: 0.5, analytics_trust: 0.5 }
  stake_cap: '2.0'
  risk_profile: cautious
- expert_id: twin
  display_name: Twin B
  personality: conservative
  voice: b
  analytical_focus: { fundamentals: 0.5 }
  temporal: { half_life_days: 90, similarity_weight: 0.6, temporal_weight: 0.4 }
  confidence_range: [0.5, 0.7]
  traits: { risk_tolerance: 0.5, contrarianism: 0.5, optimism: 0.5, analytics_trust: 0.5 }
  stake_cap: '2.0'
  risk_profile: cautious
";
        let result = ExpertRegistry::from_yaml(RunId::new("r"), yaml);
        assert!(matches!(result, Err(ExpertError::Directory(_))));
    }

    #[test]
    fn empty_directory_is_rejected() {
        let result = ExpertRegistry::from_yaml(RunId::new("r"), "[]");
        assert!(matches!(result, Err(ExpertError::Directory(_))));
    }
}
