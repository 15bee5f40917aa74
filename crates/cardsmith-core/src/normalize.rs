//! Response normalization for model output
//!
//! Models are asked for bare JSON but routinely wrap it in markdown fences,
//! prose, or emit raw control characters inside the `html` string. Parsing
//! runs in three tiers: direct parse, targeted re-escape of the `html`
//! field, and finally a manual field scan that recovers a single design.

use serde_json::Value;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{GenError, GenResult};
use crate::types::{BlogSummary, GenerationResult};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("valid regex"));

static HTML_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)"html"\s*:\s*"(.*?)"\s*[,}]"#).expect("valid regex"));

static ANALYSIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""analysis"\s*:\s*"([^"]*)""#).expect("valid regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""title"\s*:\s*"([^"]*)""#).expect("valid regex"));

static HTML_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""html"\s*:\s*""#).expect("valid regex"));

/// Extract the JSON candidate span from raw model output
///
/// Strips a markdown code fence if present, then takes the first balanced
/// top-level object. Brace matching is string-aware so braces inside HTML
/// attribute values do not terminate the span early.
pub fn extract_candidate(raw: &str) -> Option<&str> {
    let text = match FENCE_RE.captures(raw) {
        Some(caps) => caps.get(1).map_or(raw, |m| m.as_str()),
        None => raw,
    };

    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    // Unbalanced: fall back to everything from the first brace
    Some(&text[start..])
}

/// Re-escape raw control characters inside the `html` string and reparse
fn reparse_with_escaped_html(candidate: &str) -> Option<Value> {
    let caps = HTML_FIELD_RE.captures(candidate)?;
    let whole = caps.get(0)?;
    let html = caps.get(1)?.as_str();
    if !html.chars().any(|c| c.is_control()) {
        return None;
    }

    let escaped = html
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t");
    let terminator = whole
        .as_str()
        .chars()
        .next_back()
        .unwrap_or('}');
    let replacement = format!("\"html\": \"{escaped}\"{terminator}");
    let cleaned = candidate.replacen(whole.as_str(), &replacement, 1);
    serde_json::from_str(&cleaned).ok()
}

/// Scan out the `html` string body starting right after its opening quote
///
/// Escape-aware: escape sequences are kept verbatim so the recovered text
/// matches what a correct JSON parse would have seen pre-unescaping.
fn scan_html_field(candidate: &str) -> Option<String> {
    let start = HTML_START_RE.find(candidate)?.end();
    let mut html = String::new();
    let mut escaped = false;
    for c in candidate[start..].chars() {
        if escaped {
            html.push(c);
            escaped = false;
        } else if c == '\\' {
            html.push(c);
            escaped = true;
        } else if c == '"' {
            break;
        } else {
            html.push(c);
        }
    }
    Some(html)
}

/// Manually rebuild a single-design result from recognizable fields
///
/// Lossy: a multi-design response collapses to its first design. Succeeds
/// only when a title and non-empty html can both be recovered.
fn rebuild_from_fields(candidate: &str) -> Option<Value> {
    let title = TITLE_RE.captures(candidate)?.get(1)?.as_str();
    let html = scan_html_field(candidate)?;
    if html.is_empty() {
        return None;
    }
    let analysis = ANALYSIS_RE
        .captures(candidate)
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str());

    Some(serde_json::json!({
        "analysis": analysis,
        "designs": [{ "title": title, "html": html }],
    }))
}

/// Parse a candidate span through all three tiers
///
/// The error message always carries the tier-1 parse error; later tiers
/// are recovery heuristics, not better diagnostics.
pub fn parse_value(candidate: &str) -> GenResult<Value> {
    let first_error = match serde_json::from_str(candidate) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    debug!(error = %first_error, "direct parse failed, trying html re-escape");
    if let Some(value) = reparse_with_escaped_html(candidate) {
        return Ok(value);
    }

    debug!("re-escape failed, trying manual field extraction");
    if let Some(value) = rebuild_from_fields(candidate) {
        return Ok(value);
    }

    Err(GenError::format(first_error.to_string()))
}

/// Parse raw model output into a design-generation result
pub fn parse_design_response(raw: &str) -> GenResult<GenerationResult> {
    let candidate = extract_candidate(raw)
        .ok_or_else(|| GenError::format("no JSON object found in response"))?;
    let value = parse_value(candidate)?;
    let result: GenerationResult =
        serde_json::from_value(value).map_err(|err| GenError::format(err.to_string()))?;
    if result.designs.is_empty() {
        // Structurally fine, semantically useless
        return Err(GenError::validation("no designs generated"));
    }
    Ok(result)
}

/// Parse raw model output into a blog summary
pub fn parse_summary_response(raw: &str) -> GenResult<BlogSummary> {
    let candidate = extract_candidate(raw)
        .ok_or_else(|| GenError::format("no JSON object found in response"))?;
    let value = parse_value(candidate)?;
    serde_json::from_value(value).map_err(|err| GenError::format(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier1_direct_parse() {
        let raw = r#"{"analysis":"clean","designs":[{"title":"A","html":"<div></div>"}]}"#;
        let result = parse_design_response(raw).unwrap();
        assert_eq!(result.analysis, "clean");
        assert_eq!(result.designs[0].title, "A");
    }

    #[test]
    fn test_strips_code_fence_and_prose() {
        let raw = "Here you go:\n```json\n{\"analysis\":\"x\",\"designs\":[{\"title\":\"A\",\"html\":\"<p/>\"}]}\n```\nEnjoy!";
        let result = parse_design_response(raw).unwrap();
        assert_eq!(result.designs.len(), 1);
    }

    #[test]
    fn test_balanced_scan_ignores_braces_in_strings() {
        let raw = r#"{"analysis":"a","designs":[{"title":"T","html":"<div style=\"color:red\">{}</div>"}]} trailing"#;
        let result = parse_design_response(raw).unwrap();
        assert!(result.designs[0].html.contains("{}"));
    }

    #[test]
    fn test_tier2_reescapes_control_characters_in_html() {
        // Raw newline and tab inside the html string make tier 1 fail
        let raw = "{\"analysis\":\"a\",\"designs\":[{\"title\":\"T\",\"html\":\"<div>\n\t<p>hi</p>\n</div>\"}]}";
        let result = parse_design_response(raw).unwrap();
        assert_eq!(result.designs[0].html, "<div>\n\t<p>hi</p>\n</div>");
    }

    #[test]
    fn test_tier3_recovers_single_design() {
        // Unescaped quotes inside html defeat tiers 1 and 2
        let raw = r#"{"analysis":"broken","designs":[{"title":"T","html":"<div class="card">x</div>"}]}"#;
        let result = parse_design_response(raw).unwrap();
        assert_eq!(result.analysis, "broken");
        assert_eq!(result.designs.len(), 1);
        assert_eq!(result.designs[0].title, "T");
        assert!(result.designs[0].html.starts_with("<div class="));
    }

    #[test]
    fn test_tier3_tolerates_missing_analysis() {
        let raw = r#"{"designs":[{"title":"T","html":"<div class="card">x</div>"}]}"#;
        let result = parse_design_response(raw).unwrap();
        assert!(result.analysis.is_empty());
        assert_eq!(result.designs[0].title, "T");
    }

    #[test]
    fn test_error_carries_first_parse_failure() {
        let err = parse_design_response("{nonsense").unwrap_err();
        match err {
            GenError::Format(_) => {}
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_no_json_at_all() {
        assert!(parse_design_response("sorry, I cannot help with that").is_err());
    }

    #[test]
    fn test_empty_designs_rejected_as_validation() {
        let raw = r#"{"analysis":"thought about it","designs":[]}"#;
        match parse_design_response(raw).unwrap_err() {
            GenError::Validation(msg) => assert_eq!(msg, "no designs generated"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_summary_parse() {
        let raw = "```json\n{\"title\":\"Five Rust Tips\",\"summary\":\"Short and sweet.\"}\n```";
        let summary = parse_summary_response(raw).unwrap();
        assert_eq!(summary.title, "Five Rust Tips");
        assert_eq!(summary.summary, "Short and sweet.");
    }
}
