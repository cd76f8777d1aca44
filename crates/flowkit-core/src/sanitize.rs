//! Output sanitization for persisted step results.
//!
//! Step handlers can return arbitrarily large JSON. Before a result is
//! written to a step log it is capped so a single noisy handler cannot
//! bloat the execution history.

use serde_json::Value;

/// Maximum characters kept per string value.
const MAX_STRING_LEN: usize = 10_000;

/// Maximum elements kept per array.
const MAX_ARRAY_LEN: usize = 100;

/// Recursively cap string and array sizes in a step output value.
/// Object keys and nesting are preserved.
pub fn sanitize_output(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(truncate_chars(s, MAX_STRING_LEN)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .take(MAX_ARRAY_LEN)
                .map(sanitize_output)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_output(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Truncate to at most `max` characters, respecting char boundaries.
fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => {
            let mut truncated = s;
            truncated.truncate(byte_idx);
            truncated
        }
        None => s,
    }
}
