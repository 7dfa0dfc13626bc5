//! LLM response parsing into typed draft bundles.
//!
//! The model returns raw text (ideally JSON). This module extracts and
//! converts it into typed [`Assertion`]s. Recovery strategies run in
//! order before giving up:
//!
//! 1. Direct `serde_json` deserialization
//! 2. Extract JSON from a markdown code block
//! 3. Strip trailing commas and retry
//!
//! Per-assertion oddities (an unparseable stake, a malformed memory id)
//! degrade softly -- the assertion survives with a defaulted field and
//! schema validation decides its fate.

use rust_decimal::Decimal;
use uuid::Uuid;

use gridcast_types::{Assertion, AssertionValue, CategoryId, MemoryId, Side};

use crate::error::EngineError;

/// Maximum rationale length retained per assertion.
const MAX_RATIONALE_LEN: usize = 500;

/// The overall summary block of a parsed draft.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedOverall {
    /// Predicted winner.
    pub winner: Side,
    /// Confidence in the winner call.
    pub confidence: f64,
    /// Headline sentence.
    pub headline: String,
}

/// A fully parsed draft response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDraft {
    /// The overall block, when the model provided one.
    pub overall: Option<ParsedOverall>,
    /// All assertions that survived conversion.
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, serde::Deserialize)]
struct RawDraft {
    #[serde(default)]
    overall: Option<RawOverall>,
    #[serde(default)]
    assertions: Vec<RawAssertion>,
}

#[derive(Debug, serde::Deserialize)]
struct RawOverall {
    winner: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    headline: String,
}

#[derive(Debug, serde::Deserialize)]
struct RawAssertion {
    category_id: String,
    value: serde_json::Value,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    stake: serde_json::Value,
    #[serde(default)]
    why: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Parse a draft response (overall + assertions).
///
/// # Errors
///
/// Returns [`EngineError::Parse`] when no recovery strategy yields JSON
/// with an `assertions` array.
pub fn parse_draft(raw: &str) -> Result<ParsedDraft, EngineError> {
    let parsed: RawDraft = parse_with_recovery(raw)?;
    Ok(ParsedDraft {
        overall: parsed.overall.and_then(convert_overall),
        assertions: parsed
            .assertions
            .into_iter()
            .filter_map(convert_assertion)
            .collect(),
    })
}

/// Parse a repair response (assertions only; overall ignored if present).
///
/// # Errors
///
/// Returns [`EngineError::Parse`] when no recovery strategy succeeds.
pub fn parse_repair(raw: &str) -> Result<Vec<Assertion>, EngineError> {
    let parsed: RawDraft = parse_with_recovery(raw)?;
    Ok(parsed
        .assertions
        .into_iter()
        .filter_map(convert_assertion)
        .collect())
}

fn parse_with_recovery(raw: &str) -> Result<RawDraft, EngineError> {
    let trimmed = raw.trim();

    // Strategy 1: direct parse.
    if let Ok(parsed) = serde_json::from_str::<RawDraft>(trimmed) {
        return Ok(parsed);
    }

    // Strategy 2: extract from a markdown code block.
    if let Some(inner) = extract_json_from_codeblock(trimmed)
        && let Ok(parsed) = serde_json::from_str::<RawDraft>(inner)
    {
        return Ok(parsed);
    }

    // Strategy 3: strip trailing commas and retry.
    let cleaned = strip_trailing_commas(trimmed);
    if let Ok(parsed) = serde_json::from_str::<RawDraft>(&cleaned) {
        return Ok(parsed);
    }

    // Strategy 4: code block then comma strip.
    if let Some(inner) = extract_json_from_codeblock(trimmed) {
        let cleaned_inner = strip_trailing_commas(inner);
        if let Ok(parsed) = serde_json::from_str::<RawDraft>(&cleaned_inner) {
            return Ok(parsed);
        }
    }

    Err(EngineError::Parse(format!(
        "all parse strategies failed for response of {} chars",
        trimmed.len()
    )))
}

fn convert_overall(raw: RawOverall) -> Option<ParsedOverall> {
    let winner = match raw.winner.to_uppercase().as_str() {
        "HOME" => Side::Home,
        "AWAY" => Side::Away,
        _ => return None,
    };
    Some(ParsedOverall {
        winner,
        confidence: raw.confidence.clamp(0.0, 1.0),
        headline: raw.headline,
    })
}

fn convert_assertion(raw: RawAssertion) -> Option<Assertion> {
    let value: AssertionValue = serde_json::from_value(raw.value).ok()?;
    let why = raw
        .why
        .iter()
        .filter_map(|s| Uuid::parse_str(s).ok())
        .map(MemoryId::from)
        .collect();
    let rationale = raw.rationale.map(|mut text| {
        text.truncate(MAX_RATIONALE_LEN);
        text
    });
    Some(Assertion {
        category_id: CategoryId::from(raw.category_id),
        value,
        confidence: raw.confidence,
        stake: parse_stake(&raw.stake),
        why,
        rationale,
    })
}

/// Stakes arrive as `"1.5"` strings (the documented format) or bare
/// numbers from sloppier models. Unparseable stakes default to zero.
fn parse_stake(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(Decimal::ZERO),
        serde_json::Value::Number(n) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Extract JSON from a fenced markdown code block.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let fence_start = text.find("```")?;
    let after_fence = text.get(fence_start.checked_add(3)?..)?;
    // Skip a language tag (e.g. "json") up to the first newline.
    let body_start = after_fence.find('\n').map_or(0, |i| i.saturating_add(1));
    let body = after_fence.get(body_start..)?;
    let fence_end = body.find("```")?;
    Some(body.get(..fence_end)?.trim())
}

/// Remove commas immediately preceding a closing bracket or brace.
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut pending_comma = false;
    for ch in text.chars() {
        match ch {
            ',' => {
                if pending_comma {
                    result.push(',');
                }
                pending_comma = true;
            }
            '}' | ']' => {
                pending_comma = false;
                result.push(ch);
            }
            other => {
                if pending_comma && !other.is_whitespace() {
                    result.push(',');
                    pending_comma = false;
                }
                result.push(other);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_json() -> String {
        serde_json::json!({
            "overall": {"winner": "HOME", "confidence": 0.62, "headline": "Home holds."},
            "assertions": [
                {"category_id": "winner",
                 "value": {"kind": "choice", "value": "HOME"},
                 "confidence": 0.62, "stake": "1.5",
                 "why": ["0198c1c2-0000-7000-8000-000000000001"],
                 "rationale": "line move"},
                {"category_id": "total_full_game",
                 "value": {"kind": "numeric", "value": 47.0},
                 "confidence": 0.55, "stake": 1.0,
                 "why": []}
            ]
        })
        .to_string()
    }

    #[test]
    fn direct_parse_succeeds() {
        let draft = parse_draft(&draft_json());
        assert!(draft.is_ok());
        let draft = draft.unwrap_or(ParsedDraft {
            overall: None,
            assertions: Vec::new(),
        });
        assert_eq!(draft.assertions.len(), 2);
        assert!(draft.overall.is_some_and(|o| o.winner == Side::Home));
    }

    #[test]
    fn code_block_parse_succeeds() {
        let wrapped = format!("Here is my bundle:\n```json\n{}\n```", draft_json());
        let draft = parse_draft(&wrapped);
        assert!(draft.is_ok());
    }

    #[test]
    fn trailing_commas_are_recovered() {
        let sloppy = r#"{"assertions": [
            {"category_id": "winner",
             "value": {"kind": "choice", "value": "HOME"},
             "confidence": 0.6, "stake": "1.0", "why": [],}
        ],}"#;
        let draft = parse_draft(sloppy);
        assert!(draft.is_ok());
    }

    #[test]
    fn garbage_fails_all_strategies() {
        assert!(parse_draft("I think the home team wins!").is_err());
    }

    #[test]
    fn numeric_stake_is_accepted() {
        let draft = parse_draft(&draft_json()).ok();
        let stake = draft
            .and_then(|d| d.assertions.into_iter().find(|a| a.category_id.as_str() == "total_full_game"))
            .map(|a| a.stake);
        assert_eq!(stake, Some(Decimal::ONE));
    }

    #[test]
    fn invalid_memory_ids_are_dropped() {
        let json = serde_json::json!({
            "assertions": [
                {"category_id": "winner",
                 "value": {"kind": "choice", "value": "HOME"},
                 "confidence": 0.6, "stake": "1.0",
                 "why": ["not-a-uuid", "0198c1c2-0000-7000-8000-000000000001"]}
            ]
        })
        .to_string();
        let draft = parse_draft(&json).ok();
        let why_len = draft
            .and_then(|d| d.assertions.into_iter().next())
            .map(|a| a.why.len());
        assert_eq!(why_len, Some(1));
    }

    #[test]
    fn unknown_winner_string_drops_overall() {
        let json = serde_json::json!({
            "overall": {"winner": "DRAW", "confidence": 0.5, "headline": ""},
            "assertions": []
        })
        .to_string();
        let draft = parse_draft(&json).ok();
        assert!(draft.is_some_and(|d| d.overall.is_none()));
    }

    #[test]
    fn rationale_is_truncated() {
        let long = "x".repeat(2_000);
        let json = serde_json::json!({
            "assertions": [
                {"category_id": "winner",
                 "value": {"kind": "choice", "value": "HOME"},
                 "confidence": 0.6, "stake": "1.0", "why": [],
                 "rationale": long}
            ]
        })
        .to_string();
        let draft = parse_draft(&json).ok();
        let len = draft
            .and_then(|d| d.assertions.into_iter().next())
            .and_then(|a| a.rationale)
            .map(|r| r.len());
        assert_eq!(len, Some(MAX_RATIONALE_LEN));
    }
}
