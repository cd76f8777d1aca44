//! Condition rule tree for guarding workflow steps.
//!
//! A condition is either a single rule (`{field, operator, value}`) or a
//! group (`{combinator, rules}`) nesting further conditions. Operators and
//! combinators are deliberately kept as plain strings: step conditions are
//! tenant-authored data, and an unknown operator must degrade to a false
//! rule rather than make the whole workflow undeserializable. The evaluator
//! in flowkit-core owns the operator table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A boolean rule tree evaluated against an execution's context.
///
/// Untagged: an object with `combinator` parses as a group, anything with
/// `field`/`operator` as a rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConditionSpec {
    /// A group of nested conditions joined by `and`/`or`.
    Group {
        /// `"and"` or `"or"`; anything else is treated as `and`.
        combinator: String,
        /// Nested rules or groups. An empty group evaluates to `true`.
        #[serde(default)]
        rules: Vec<ConditionSpec>,
    },
    /// A single `{field, operator, value}` comparison.
    Rule {
        /// Dot-separated path into the execution context.
        field: String,
        /// Operator name (see the evaluator's operator table).
        operator: String,
        /// Expected value; absent for unary operators like `is_empty`.
        #[serde(default)]
        value: Value,
    },
}
