//! Fail-soft parser for raw analysis output.
//!
//! The completion service is asked for strict JSON but regularly wraps it in
//! markdown code fences or returns prose. This parser never fails: anything
//! that does not parse degrades to the all-absent [`ParsedAnalysis`], which
//! keeps the backfill pass idempotent and the execution loop total.

use serde_json::Value as JsonValue;

use crate::models::ParsedAnalysis;

/// Parse raw analysis text into structured fields.
///
/// Pure and deterministic: identical input always yields identical output.
pub fn parse(raw: &str) -> ParsedAnalysis {
    let cleaned = strip_code_fence(raw);

    let value: JsonValue = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(_) => return ParsedAnalysis::default(),
    };

    let quality_score = score_field(&value, "quality_score");
    let relevance = score_field(&value, "relevance");
    let completeness = score_field(&value, "completeness");
    let clarity = score_field(&value, "clarity");

    let present: Vec<f64> = [quality_score, relevance, completeness, clarity]
        .into_iter()
        .flatten()
        .collect();
    let avg_score = if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    };

    let issues = string_list(&value, "issues");
    let improvements = string_list(&value, "improvements");
    let missing_data = value
        .get("missing_data")
        .and_then(JsonValue::as_array)
        .map(|arr| collect_strings(arr));

    let issue_count = issues.len() as i32;

    ParsedAnalysis {
        quality_score,
        relevance,
        completeness,
        clarity,
        avg_score,
        sentiment: string_field(&value, "sentiment"),
        summary_text: string_field(&value, "summary"),
        issues,
        improvements,
        missing_data,
        issue_count,
    }
}

/// Strip one leading and one trailing markdown code fence, if present.
/// A leading fence may carry a language tag (e.g. ```json).
fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }

    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

fn score_field(value: &JsonValue, key: &str) -> Option<f64> {
    value.get(key).and_then(JsonValue::as_f64)
}

fn string_field(value: &JsonValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

/// Coerce a field to a string list; absent or wrong-shaped values become empty.
fn string_list(value: &JsonValue, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(JsonValue::as_array)
        .map(|arr| collect_strings(arr))
        .unwrap_or_default()
}

fn collect_strings(arr: &[JsonValue]) -> Vec<String> {
    arr.iter()
        .filter_map(|e| e.as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = r#"{
        "quality_score": 8,
        "relevance": 9,
        "completeness": 7,
        "clarity": 8,
        "sentiment": "positive",
        "summary": "Accurate and on-topic reply.",
        "issues": ["slightly verbose"],
        "improvements": ["tighten the opening sentence"],
        "missing_data": []
    }"#;

    #[test]
    fn test_well_formed_input() {
        let parsed = parse(WELL_FORMED);
        assert_eq!(parsed.quality_score, Some(8.0));
        assert_eq!(parsed.relevance, Some(9.0));
        assert_eq!(parsed.completeness, Some(7.0));
        assert_eq!(parsed.clarity, Some(8.0));
        assert_eq!(parsed.avg_score, Some(8.0));
        assert_eq!(parsed.sentiment.as_deref(), Some("positive"));
        assert_eq!(
            parsed.summary_text.as_deref(),
            Some("Accurate and on-topic reply.")
        );
        assert_eq!(parsed.issues, vec!["slightly verbose"]);
        assert_eq!(parsed.improvements, vec!["tighten the opening sentence"]);
        assert_eq!(parsed.missing_data, Some(vec![]));
        assert_eq!(parsed.issue_count, 1);
    }

    #[test]
    fn test_unstructured_input_returns_all_absent() {
        let parsed = parse("not structured data");
        assert_eq!(parsed, ParsedAnalysis::default());
    }

    #[test]
    fn test_empty_input_returns_all_absent() {
        assert_eq!(parse(""), ParsedAnalysis::default());
        assert_eq!(parse("   \n  "), ParsedAnalysis::default());
    }

    #[test]
    fn test_language_tagged_fence_is_stripped() {
        let raw = format!("```json\n{}\n```", WELL_FORMED);
        let parsed = parse(&raw);
        assert_eq!(parsed.quality_score, Some(8.0));
        assert_eq!(parsed.issue_count, 1);
    }

    #[test]
    fn test_bare_fence_is_stripped() {
        let raw = format!("```\n{}\n```", WELL_FORMED);
        let parsed = parse(&raw);
        assert_eq!(parsed.avg_score, Some(8.0));
    }

    #[test]
    fn test_partial_scores_average_present_subset() {
        let parsed = parse(r#"{"quality_score": 4, "clarity": 6}"#);
        assert_eq!(parsed.quality_score, Some(4.0));
        assert_eq!(parsed.relevance, None);
        assert_eq!(parsed.completeness, None);
        assert_eq!(parsed.avg_score, Some(5.0));
    }

    #[test]
    fn test_no_scores_means_no_average() {
        let parsed = parse(r#"{"sentiment": "neutral"}"#);
        assert_eq!(parsed.avg_score, None);
        assert_eq!(parsed.sentiment.as_deref(), Some("neutral"));
        assert!(!parsed.is_empty());
    }

    #[test]
    fn test_non_numeric_score_is_absent() {
        let parsed = parse(r#"{"quality_score": "eight", "relevance": 6}"#);
        assert_eq!(parsed.quality_score, None);
        assert_eq!(parsed.avg_score, Some(6.0));
    }

    #[test]
    fn test_wrong_shaped_issues_coerce_to_empty() {
        let parsed = parse(r#"{"quality_score": 5, "issues": "just a string"}"#);
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.issue_count, 0);
    }

    #[test]
    fn test_non_string_list_entries_are_dropped() {
        let parsed = parse(r#"{"issues": ["real issue", 42, null]}"#);
        assert_eq!(parsed.issues, vec!["real issue"]);
        assert_eq!(parsed.issue_count, 1);
    }

    #[test]
    fn test_absent_missing_data_stays_absent() {
        let parsed = parse(r#"{"quality_score": 5}"#);
        assert_eq!(parsed.missing_data, None);
    }

    #[test]
    fn test_truncated_json_returns_all_absent() {
        let parsed = parse(r#"{"quality_score": 8, "issues": ["unterminat"#);
        assert_eq!(parsed, ParsedAnalysis::default());
    }

    #[test]
    fn test_deterministic() {
        let raw = format!("```json\n{}\n```", WELL_FORMED);
        assert_eq!(parse(&raw), parse(&raw));
    }
}
