//! Type-safe identifier wrappers.
//!
//! Domain identifiers (runs, experts, games, teams, categories) are stable
//! strings assigned by configuration or external feeds; row identifiers
//! (memories, bundles, outcomes) are UUID v7 (time-ordered) for efficient
//! database indexing. Every identifier gets its own newtype so the compiler
//! rejects accidental mixing.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around an owned `String` identifier.
macro_rules! define_str_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
        )]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a string slice as this identifier type.
            pub fn new(id: &str) -> Self {
                Self(id.to_owned())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
        )]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_str_id! {
    /// Experiment scope. Every persisted row carries one; reads never cross it.
    RunId
}

define_str_id! {
    /// Shadow experiment scope, distinct from the main run it mirrors.
    ShadowRunId
}

define_str_id! {
    /// Stable identifier of an expert personality (e.g. `conservative_analyzer`).
    ExpertId
}

define_str_id! {
    /// External identifier of a single NFL game.
    GameId
}

define_str_id! {
    /// Team abbreviation as used by the game feed (e.g. `KC`, `BUF`).
    TeamId
}

define_str_id! {
    /// Identifier of a prediction category in the 83-entry registry.
    CategoryId
}

define_row_id! {
    /// Unique identifier for an episodic memory row.
    MemoryId
}

define_row_id! {
    /// Unique identifier for a persisted prediction bundle.
    BundleId
}

define_row_id! {
    /// Unique identifier for a graded outcome row.
    OutcomeId
}

impl TeamId {
    /// Role-agnostic matchup key: `min(a,b) + "|" + max(a,b)`.
    ///
    /// Mirrors the generated column used for head-to-head aggregation, so
    /// `(KC, BUF)` and `(BUF, KC)` collapse to the same key.
    pub fn matchup_key(&self, other: &Self) -> String {
        if self.0 <= other.0 {
            format!("{}|{}", self.0, other.0)
        } else {
            format!("{}|{}", other.0, self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_ids_round_trip_serde() {
        let id = ExpertId::new("conservative_analyzer");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"conservative_analyzer\""));
        let back: Result<ExpertId, _> = serde_json::from_str("\"conservative_analyzer\"");
        assert_eq!(back.ok(), Some(id));
    }

    #[test]
    fn row_ids_are_time_ordered_uuids() {
        let first = MemoryId::new();
        let second = MemoryId::new();
        assert_ne!(first.into_inner(), Uuid::nil());
        // v7 ids are monotonically non-decreasing within a process.
        assert!(first <= second);
    }

    #[test]
    fn matchup_key_is_role_agnostic() {
        let kc = TeamId::new("KC");
        let buf = TeamId::new("BUF");
        assert_eq!(kc.matchup_key(&buf), "BUF|KC");
        assert_eq!(buf.matchup_key(&kc), "BUF|KC");
    }

    #[test]
    fn display_matches_inner() {
        let id = GameId::new("2025-W5-KC-BUF");
        assert_eq!(id.to_string(), "2025-W5-KC-BUF");
    }
}
