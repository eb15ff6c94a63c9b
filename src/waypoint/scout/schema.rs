// SPDX-License-Identifier: MIT

//! JSON extraction, repair and schema validation for dry-run responses
//!
//! Local models answer in whatever shape they feel like: clean JSON,
//! JSON buried in prose, or Python-flavored dicts with single quotes
//! and `True`/`False`/`None` literals. This module always produces a
//! usable judgment: parse failures degrade to deterministic fallback
//! values instead of erroring, so the scout pipeline never stalls on a
//! malformed response.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Schema for stage-1 relevance evaluation responses
pub static PATH_EVALUATION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "required": ["relevance_score", "confidence", "reasoning"],
        "fields": {
            "relevance_score": {"type": "number", "min": 0.0, "max": 1.0},
            "confidence":      {"type": "number", "min": 0.0, "max": 1.0},
            "reasoning":       {"type": "string", "max_len": 2000},
            "complexity":      {"type": "string", "enum": ["low", "medium", "high"]},
            "risk_factors":    {"type": "array", "max_items": 10}
        },
        "aliases": {
            "relevance": "relevance_score",
            "risks": "risk_factors"
        }
    })
});

/// Schema for stage-2 validation responses
pub static PATH_VALIDATION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "required": ["is_valid"],
        "fields": {
            "is_valid":         {"type": "boolean"},
            "efficiency_score": {"type": "number", "min": 0.0, "max": 1.0},
            "confidence":       {"type": "number", "min": 0.0, "max": 1.0},
            "risk_assessment":  {"type": "string", "max_len": 500}
        },
        "aliases": {
            "valid": "is_valid",
            "validation_score": "efficiency_score"
        }
    })
});

/// Stage-1 judgment of how well a path fits the question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEvaluation {
    pub relevance_score: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub complexity: String,
    pub risk_factors: Vec<String>,
}

impl PathEvaluation {
    /// Deterministic stand-in when the model's answer cannot be used
    pub fn fallback(reason: &str) -> Self {
        Self {
            relevance_score: 0.3,
            confidence: 0.3,
            reasoning: format!("fallback: evaluation failed ({reason})"),
            complexity: "low".to_string(),
            risk_factors: vec!["evaluation_failure".to_string()],
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.risk_factors.iter().any(|r| r == "evaluation_failure")
    }

    fn from_normalized(fields: &Map<String, Value>) -> Self {
        Self {
            relevance_score: fields
                .get("relevance_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.5),
            confidence: fields.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
            reasoning: fields
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            complexity: fields
                .get("complexity")
                .and_then(Value::as_str)
                .unwrap_or("medium")
                .to_string(),
            risk_factors: fields
                .get("risk_factors")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        }
    }
}

/// Stage-2 judgment of a path's efficiency and risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub efficiency_score: f64,
    pub confidence: f64,
    pub risk_assessment: String,
}

impl ValidationResult {
    /// Stand-in when validation could not be parsed; leans permissive
    /// because stage-1 already carries the scoring weight
    pub fn fallback(reason: &str) -> Self {
        Self {
            is_valid: true,
            efficiency_score: 0.5,
            confidence: 0.3,
            risk_assessment: format!("validation unavailable: {reason}"),
        }
    }

    fn from_normalized(fields: &Map<String, Value>) -> Self {
        Self {
            is_valid: fields.get("is_valid").and_then(Value::as_bool).unwrap_or(true),
            efficiency_score: fields
                .get("efficiency_score")
                .and_then(Value::as_f64)
                .unwrap_or(0.5),
            confidence: fields.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
            risk_assessment: fields
                .get("risk_assessment")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Parse a stage-1 response, falling back instead of failing
pub fn parse_evaluation(text: &str) -> PathEvaluation {
    let value = match extract_json(text) {
        Some(v) => v,
        None => {
            log::warn!("no JSON object found in evaluation response");
            return PathEvaluation::fallback("no JSON in response");
        }
    };
    match validate_against(&value, &PATH_EVALUATION_SCHEMA) {
        Ok(fields) => PathEvaluation::from_normalized(&fields),
        Err(violations) => {
            log::warn!("evaluation response failed validation: {}", violations.join("; "));
            PathEvaluation::fallback(&violations.join("; "))
        }
    }
}

/// Parse a stage-2 response, falling back instead of failing
pub fn parse_validation(text: &str) -> ValidationResult {
    let value = match extract_json(text) {
        Some(v) => v,
        None => {
            log::warn!("no JSON object found in validation response");
            return ValidationResult::fallback("no JSON in response");
        }
    };
    match validate_against(&value, &PATH_VALIDATION_SCHEMA) {
        Ok(fields) => ValidationResult::from_normalized(&fields),
        Err(violations) => {
            log::warn!("validation response failed validation: {}", violations.join("; "));
            ValidationResult::fallback(&violations.join("; "))
        }
    }
}

/// Pull the first JSON object out of free text
///
/// Tries a direct parse, then a balanced-brace scan for an embedded
/// object, then quote/literal repair on that block.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let block = first_json_block(text)?;
    if let Ok(v) = serde_json::from_str::<Value>(&block) {
        return Some(v);
    }

    let repaired = repair_json(&block);
    serde_json::from_str::<Value>(&repaired).ok()
}

/// Rewrite Python-flavored pseudo-JSON into strict JSON
///
/// Single-quoted strings become double-quoted (inner double quotes get
/// escaped, escaped single quotes get unescaped) and the bare words
/// `True`/`False`/`None` become `true`/`false`/`null`.
pub fn repair_json(text: &str) -> String {
    enum Mode {
        Plain,
        InDouble,
        InSingle,
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut mode = Mode::Plain;
    let mut escaped = false;
    let mut word = String::new();

    for c in text.chars() {
        match mode {
            Mode::InDouble => {
                out.push(c);
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    mode = Mode::Plain;
                }
            }
            Mode::InSingle => {
                if escaped {
                    if c == '\'' {
                        out.push('\'');
                    } else {
                        out.push('\\');
                        out.push(c);
                    }
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '\'' {
                    out.push('"');
                    mode = Mode::Plain;
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    out.push(c);
                }
            }
            Mode::Plain => {
                if c.is_ascii_alphabetic() {
                    word.push(c);
                    continue;
                }
                flush_literal(&mut out, &mut word);
                match c {
                    '\'' => {
                        out.push('"');
                        mode = Mode::InSingle;
                    }
                    '"' => {
                        out.push('"');
                        mode = Mode::InDouble;
                    }
                    _ => out.push(c),
                }
            }
        }
    }
    flush_literal(&mut out, &mut word);
    out
}

fn flush_literal(out: &mut String, word: &mut String) {
    if word.is_empty() {
        return;
    }
    match word.as_str() {
        "True" => out.push_str("true"),
        "False" => out.push_str("false"),
        "None" => out.push_str("null"),
        other => out.push_str(other),
    }
    word.clear();
}

/// First balanced `{...}` block, quote-aware for both quote styles
fn first_json_block(text: &str) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|&c| c == '{')?;
    let mut depth = 0usize;
    let mut in_str: Option<char> = None;
    let mut escaped = false;

    for (offset, &c) in chars[start..].iter().enumerate() {
        match in_str {
            Some(quote) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == quote {
                    in_str = None;
                }
            }
            None => match c {
                '"' | '\'' => in_str = Some(c),
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(chars[start..=start + offset].iter().collect());
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Field-by-field validation and normalization against a schema
///
/// Applies key aliases, checks required fields, coerces numeric strings
/// and boolean strings, clamps numbers into their bounds, truncates
/// over-long strings and over-full arrays, and checks enum membership.
/// Violations are collected, not first-error-wins.
pub fn validate_against(value: &Value, schema: &Value) -> Result<Map<String, Value>, Vec<String>> {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return Err(vec!["response is not a JSON object".to_string()]),
    };

    let aliases = schema.get("aliases").and_then(Value::as_object);
    let mut working: Map<String, Value> = Map::new();
    for (key, val) in obj {
        let canonical = aliases
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
            .unwrap_or(key);
        working.entry(canonical.to_string()).or_insert_with(|| val.clone());
    }

    let mut errors = Vec::new();
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for req in required.iter().filter_map(Value::as_str) {
            if !working.contains_key(req) {
                errors.push(format!("missing required field '{req}'"));
            }
        }
    }

    let mut normalized = Map::new();
    let empty = Map::new();
    let fields = schema.get("fields").and_then(Value::as_object).unwrap_or(&empty);
    for (name, rules) in fields {
        let raw = match working.get(name) {
            Some(v) => v,
            None => continue,
        };
        let kind = rules.get("type").and_then(Value::as_str).unwrap_or("string");
        match kind {
            "number" => match coerce_number(raw) {
                Some(n) => {
                    let min = rules.get("min").and_then(Value::as_f64).unwrap_or(f64::MIN);
                    let max = rules.get("max").and_then(Value::as_f64).unwrap_or(f64::MAX);
                    normalized.insert(name.clone(), json!(n.clamp(min, max)));
                }
                None => errors.push(format!("field '{name}' is not numeric")),
            },
            "boolean" => match coerce_bool(raw) {
                Some(b) => {
                    normalized.insert(name.clone(), json!(b));
                }
                None => errors.push(format!("field '{name}' is not a boolean")),
            },
            "string" => match coerce_string(raw) {
                Some(mut s) => {
                    if let Some(max_len) = rules.get("max_len").and_then(Value::as_u64) {
                        s = s.chars().take(max_len as usize).collect();
                    }
                    if let Some(allowed) = rules.get("enum").and_then(Value::as_array) {
                        match allowed
                            .iter()
                            .filter_map(Value::as_str)
                            .find(|a| a.eq_ignore_ascii_case(&s))
                        {
                            Some(canonical) => s = canonical.to_string(),
                            None => {
                                errors.push(format!("field '{name}' has value '{s}' outside its enum"));
                                continue;
                            }
                        }
                    }
                    normalized.insert(name.clone(), json!(s));
                }
                None => errors.push(format!("field '{name}' is not a string")),
            },
            "array" => {
                let items: Vec<Value> = match raw {
                    Value::Array(a) => a.clone(),
                    // a bare scalar is tolerated as a one-element list
                    Value::String(s) => vec![json!(s)],
                    _ => {
                        errors.push(format!("field '{name}' is not an array"));
                        continue;
                    }
                };
                let cap = rules
                    .get("max_items")
                    .and_then(Value::as_u64)
                    .map(|m| m as usize)
                    .unwrap_or(usize::MAX);
                let strings: Vec<Value> = items
                    .into_iter()
                    .take(cap)
                    .map(|v| match v {
                        Value::String(s) => json!(s),
                        other => json!(other.to_string()),
                    })
                    .collect();
                normalized.insert(name.clone(), json!(strings));
            }
            _ => {
                normalized.insert(name.clone(), raw.clone());
            }
        }
    }

    if errors.is_empty() {
        Ok(normalized)
    } else {
        Err(errors)
    }
}

fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
