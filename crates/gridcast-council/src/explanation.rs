//! Templated consensus explanations.
//!
//! Every category consensus carries exactly three sentences: the winning
//! value and its weight, the top dissents (or their absence), and the
//! weighted confidence across the contributing members.

use gridcast_types::{AssertionValue, Category, Dissent};

/// Render an assertion value for prose.
fn render_value(value: &AssertionValue) -> String {
    match value {
        AssertionValue::Choice(c) => c.clone(),
        AssertionValue::Numeric(n) => format!("{n:.1}"),
        AssertionValue::Percentage(p) => format!("{:.0}%", p * 100.0),
    }
}

/// Build the three-sentence explanation for one category consensus.
pub fn explain(
    category: &Category,
    value: &AssertionValue,
    agreement: f64,
    dissents: &[Dissent],
    confidence: f64,
    members: usize,
) -> String {
    let first = format!(
        "Council favours {} on {} with weight {agreement:.2}.",
        render_value(value),
        category.id,
    );

    let second = match dissents {
        [] => String::from("No member dissented."),
        [only] => format!(
            "One dissent: {} backs {} at weight {:.2}.",
            only.expert_id,
            render_value(&only.value),
            only.weight,
        ),
        [first_d, second_d, ..] => format!(
            "Top dissents: {} backs {} (weight {:.2}) and {} backs {} (weight {:.2}).",
            first_d.expert_id,
            render_value(&first_d.value),
            first_d.weight,
            second_d.expert_id,
            render_value(&second_d.value),
            second_d.weight,
        ),
    };

    let third = format!(
        "Weighted confidence is {confidence:.2} across {members} contributing members."
    );

    format!("{first} {second} {third}")
}

#[cfg(test)]
mod tests {
    use gridcast_types::{CategoryFamily, CategoryId, ExpertId, PredType};

    use super::*;

    fn category() -> Category {
        Category {
            id: CategoryId::new("winner"),
            family: CategoryFamily::Markets,
            pred_type: PredType::Enum,
            sigma: None,
            choices: Some(vec![String::from("HOME"), String::from("AWAY")]),
            range: None,
            prior_mean: None,
        }
    }

    fn dissent(id: &str, weight: f64) -> Dissent {
        Dissent {
            expert_id: ExpertId::new(id),
            weight,
            value: AssertionValue::Choice(String::from("AWAY")),
            confidence: 0.55,
        }
    }

    #[test]
    fn explanation_names_value_weight_and_dissenter() {
        let text = explain(
            &category(),
            &AssertionValue::Choice(String::from("HOME")),
            0.85,
            &[dissent("contrarian_rebel", 0.15)],
            0.61,
            5,
        );
        assert!(text.contains("HOME"));
        assert!(text.contains("contrarian_rebel"));
        assert!(text.contains("0.85"));
        assert!(text.contains("0.15"));
        assert!(text.contains("5 contributing members"));
    }

    #[test]
    fn no_dissent_sentence() {
        let text = explain(
            &category(),
            &AssertionValue::Choice(String::from("HOME")),
            1.0,
            &[],
            0.6,
            4,
        );
        assert!(text.contains("No member dissented."));
    }

    #[test]
    fn two_dissents_are_both_named() {
        let text = explain(
            &category(),
            &AssertionValue::Choice(String::from("HOME")),
            0.6,
            &[dissent("a", 0.25), dissent("b", 0.15)],
            0.6,
            5,
        );
        assert!(text.contains("a backs"));
        assert!(text.contains("b backs"));
    }

    #[test]
    fn percentage_values_render_as_percent() {
        let text = explain(
            &category(),
            &AssertionValue::Percentage(0.62),
            0.9,
            &[],
            0.6,
            5,
        );
        assert!(text.contains("62%"));
    }
}
