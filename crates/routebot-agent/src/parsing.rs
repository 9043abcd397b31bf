//! Decision parsing: turns free-form model output into a typed decision.
//!
//! Models wrap JSON in code fences, add prose around it, leave trailing
//! commas, and use the older field names (`tool_name`, `parameters`,
//! `reasoning`, `selected_server`). All of that is accepted; anything else is
//! a [`ParseError`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap());


/// Why model output could not be turned into a decision.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("response contained no JSON object")]
    NoJson,

    #[error("malformed JSON: {0}")]
    InvalidJson(String),

    #[error("field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A decision exactly as the model stated it, before registry checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    pub capability: Option<String>,
    pub server: Option<String>,
    pub arguments: Map<String, Value>,
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
    pub requires_clarification: bool,
    pub clarification_question: Option<String>,
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default, alias = "tool_name", alias = "tool", alias = "chosen_capability")]
    capability: Option<Value>,
    #[serde(default, alias = "selected_server", alias = "server_id")]
    server: Option<Value>,
    #[serde(default, alias = "parameters", alias = "args")]
    arguments: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
    #[serde(default, alias = "reasoning", alias = "reason")]
    rationale: Option<String>,
    #[serde(default)]
    requires_clarification: Option<Value>,
    #[serde(default, alias = "question")]
    clarification_question: Option<String>,
}

/// Parse model output into a [`ParsedDecision`].
pub fn parse_decision(text: &str) -> Result<ParsedDecision, ParseError> {
    let json = extract_json(text).ok_or(ParseError::NoJson)?;
    let raw: RawDecision = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(first) => {
            let repaired = strip_trailing_commas(json);
            serde_json::from_str(&repaired).map_err(|_| ParseError::InvalidJson(first.to_string()))?
        }
    };

    let arguments = match raw.arguments {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ParseError::InvalidField {
                field: "arguments",
                reason: format!("expected an object, got {other}"),
            })
        }
    };

    Ok(ParsedDecision {
        capability: name_field(raw.capability),
        server: name_field(raw.server),
        arguments,
        confidence: confidence_field(raw.confidence)?,
        rationale: raw.rationale.unwrap_or_default().trim().to_string(),
        requires_clarification: flag_field(raw.requires_clarification),
        clarification_question: raw
            .clarification_question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
    })
}

/// Locate the JSON object in model output.
///
/// Prefers the contents of a code fence; otherwise takes the first balanced
/// `{...}` span, ignoring braces inside string literals.
pub fn extract_json(text: &str) -> Option<&str> {
    let body = FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let start = body.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]`, leaving string literals alone.
fn strip_trailing_commas(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in json.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
        } else if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = json[i + 1..].trim_start().chars().next();
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// Names arrive as strings, or as `null`/`"none"` for "no choice".
fn name_field(value: Option<Value>) -> Option<String> {
    let name = match value? {
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    match name.to_ascii_lowercase().as_str() {
        "" | "null" | "none" | "n/a" => None,
        _ => Some(name),
    }
}

fn confidence_field(value: Option<Value>) -> Result<f64, ParseError> {
    let invalid = |reason: String| ParseError::InvalidField {
        field: "confidence",
        reason,
    };
    let n = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(n.to_string()))?,
        Some(Value::String(s)) => {
            let text = s.trim();
            let (digits, scale) = match text.strip_suffix('%') {
                Some(pct) => (pct.trim_end(), 100.0),
                None => (text, 1.0),
            };
            digits
                .parse::<f64>()
                .map_err(|_| invalid(format!("not a number: {s:?}")))?
                / scale
        }
        Some(other) => return Err(invalid(format!("not a number: {other}"))),
    };
    if !n.is_finite() {
        return Err(invalid(format!("not finite: {n}")));
    }
    Ok(n.clamp(0.0, 1.0))
}

fn flag_field(value: Option<Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
