//! Critic pass: turn validation failures into a bounded repair diff.

use serde_json::json;

use gridcast_types::ExpertPersona;

use crate::validate::Violation;

/// Maximum violations reported to the repair model per iteration.
pub const MAX_REPORTED_VIOLATIONS: usize = 10;

/// Trim a violation list to the first K for the repair prompt.
///
/// Category-scoped violations come first (they are directly repairable);
/// global violations follow.
pub fn critique(violations: &[Violation]) -> Vec<Violation> {
    let mut ordered: Vec<Violation> = violations
        .iter()
        .filter(|v| v.category_id.is_some())
        .cloned()
        .collect();
    ordered.extend(violations.iter().filter(|v| v.category_id.is_none()).cloned());
    ordered.truncate(MAX_REPORTED_VIOLATIONS);
    ordered
}

/// Build the critic prompt context from the trimmed violation list.
pub fn critic_context(persona: &ExpertPersona, violations: &[Violation]) -> serde_json::Value {
    json!({
        "persona": {
            "display_name": persona.display_name,
            "personality": persona.personality,
            "voice": persona.voice,
        },
        "guardrails": { "stake_cap": "per your limits" },
        "violations": violations,
    })
}

#[cfg(test)]
mod tests {
    use gridcast_types::CategoryId;

    use super::*;

    fn violation(scoped: bool, rule: &'static str) -> Violation {
        Violation {
            category_id: scoped.then(|| CategoryId::new("winner")),
            rule,
            detail: String::from("detail"),
        }
    }

    #[test]
    fn critique_caps_at_ten() {
        let violations: Vec<Violation> =
            (0..25).map(|_| violation(true, "missing_category")).collect();
        assert_eq!(critique(&violations).len(), MAX_REPORTED_VIOLATIONS);
    }

    #[test]
    fn scoped_violations_come_first() {
        let violations = vec![
            violation(false, "total_stake_exceeds_cap"),
            violation(true, "missing_category"),
        ];
        let trimmed = critique(&violations);
        assert!(trimmed.first().is_some_and(|v| v.category_id.is_some()));
    }
}
