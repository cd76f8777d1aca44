//! Condition evaluation against an execution context.
//!
//! Conditions are tenant-authored data, so the evaluator is total: it never
//! returns an error and never panics. Anything malformed (unknown operator,
//! type mismatch, invalid regex, excessive nesting) evaluates to `false` so
//! the guarded step is skipped rather than the execution failing.

use flowkit_types::condition::ConditionSpec;
use serde_json::{Map, Value};

/// Maximum rule tree nesting. Anything deeper evaluates to `false`.
const MAX_CONDITION_DEPTH: usize = 32;

/// Evaluate a step's condition against the execution context.
///
/// `None` means unguarded, which is always `true`.
pub fn evaluate(conditions: Option<&ConditionSpec>, context: &Map<String, Value>) -> bool {
    match conditions {
        None => true,
        Some(spec) => evaluate_node(spec, context, 0),
    }
}

fn evaluate_node(spec: &ConditionSpec, context: &Map<String, Value>, depth: usize) -> bool {
    if depth >= MAX_CONDITION_DEPTH {
        tracing::warn!(depth, "condition tree exceeds depth limit, evaluating false");
        return false;
    }
    match spec {
        ConditionSpec::Group { combinator, rules } => {
            // An empty group is vacuously true.
            if rules.is_empty() {
                return true;
            }
            if combinator.eq_ignore_ascii_case("or") {
                rules.iter().any(|r| evaluate_node(r, context, depth + 1))
            } else {
                // "and", plus any unknown combinator.
                rules.iter().all(|r| evaluate_node(r, context, depth + 1))
            }
        }
        ConditionSpec::Rule {
            field,
            operator,
            value,
        } => {
            let actual = resolve_path(context, field);
            apply_operator(operator, actual, value)
        }
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Resolve a dot-separated path into the context. Missing segments and
/// non-object intermediates resolve to `Null`.
fn resolve_path<'a>(context: &'a Map<String, Value>, path: &str) -> &'a Value {
    let mut segments = path.split('.');
    let first = match segments.next() {
        Some(s) => s,
        None => return &Value::Null,
    };
    let mut current = match context.get(first) {
        Some(v) => v,
        None => return &Value::Null,
    };
    for segment in segments {
        current = match current {
            Value::Object(map) => match map.get(segment) {
                Some(v) => v,
                None => return &Value::Null,
            },
            _ => return &Value::Null,
        };
    }
    current
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn apply_operator(operator: &str, actual: &Value, expected: &Value) -> bool {
    match operator {
        "equals" => actual == expected,
        "not_equals" => actual != expected,
        "greater_than" => compare(actual, expected).map(|o| o.is_gt()).unwrap_or(false),
        "less_than" => compare(actual, expected).map(|o| o.is_lt()).unwrap_or(false),
        "greater_than_or_equals" => compare(actual, expected).map(|o| o.is_ge()).unwrap_or(false),
        "less_than_or_equals" => compare(actual, expected).map(|o| o.is_le()).unwrap_or(false),
        "contains" => contains(actual, expected),
        "not_contains" => !contains(actual, expected),
        "starts_with" => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        "ends_with" => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
        "is_empty" => is_empty(actual),
        "is_not_empty" => !is_empty(actual),
        "in" => match expected {
            Value::Array(items) => items.contains(actual),
            _ => false,
        },
        "not_in" => match expected {
            Value::Array(items) => !items.contains(actual),
            _ => false,
        },
        "matches" => match (actual, expected) {
            (Value::String(a), Value::String(pattern)) => match regex::Regex::new(pattern) {
                Ok(re) => re.is_match(a),
                Err(err) => {
                    tracing::warn!(pattern = %pattern, error = %err, "invalid condition regex");
                    false
                }
            },
            _ => false,
        },
        other => {
            tracing::warn!(operator = %other, "unknown condition operator");
            false
        }
    }
}

/// Ordering for the relational operators. Numbers compare numerically,
/// strings lexicographically. Mixed or unordered types have no ordering.
fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(e)) => {
            let a = a.as_f64()?;
            let e = e.as_f64()?;
            a.partial_cmp(&e)
        }
        (Value::String(a), Value::String(e)) => Some(a.as_str().cmp(e.as_str())),
        _ => None,
    }
}

/// Substring match for strings, element membership for arrays.
fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(a) => match expected {
            Value::String(e) => a.contains(e.as_str()),
            _ => false,
        },
        Value::Array(items) => items.contains(expected),
        _ => false,
    }
}

/// Null, empty string, empty array, and empty object are empty. Missing
/// paths resolve to `Null`, so `is_empty` on an absent field is `true`.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
