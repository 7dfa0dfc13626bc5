//! Error types for expert configuration and lookup.

use gridcast_types::ExpertId;

/// Errors that can occur when loading or resolving expert configurations.
#[derive(Debug, thiserror::Error)]
pub enum ExpertError {
    /// A referenced expert does not exist in the registry.
    #[error("unknown expert: {0}")]
    UnknownExpert(ExpertId),

    /// A configuration failed validation. Names the first offending field.
    #[error("invalid config for expert `{expert_id}`: field `{field}`: {detail}")]
    ConfigInvalid {
        /// The expert whose config is invalid.
        expert_id: ExpertId,
        /// The first offending field.
        field: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// The expert directory YAML could not be parsed.
    #[error("expert directory parse error: {0}")]
    Parse(#[from] serde_yml::Error),

    /// The directory contained duplicate or missing entries.
    #[error("expert directory invalid: {0}")]
    Directory(String),
}
