//! ABAC attribute values and the condition predicate tree.
//!
//! When a tuple carries a `conditions` expression, the graph traversal
//! engine evaluates it against a context map of request/user attributes
//! supplied by the caller. Unknown operators or missing attributes treat
//! the condition as unsatisfied rather than erroring — ABAC failures are
//! denials, not exceptions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar attribute value used in ABAC contexts and conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A UTF-8 string.
    String(String),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// A list of values, used as the right-hand side of `In`.
    List(Vec<Value>),
}

impl Value {
    fn partial_cmp_num(&self, other: &Value) -> Option<std::cmp::Ordering> {
        let (a, b) = (self.as_f64()?, other.as_f64()?);
        a.partial_cmp(&b)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Attribute context passed to condition evaluation: user attributes,
/// request attributes, and anything else the caller supplies.
pub type AttributeContext = HashMap<String, Value>;

/// A small predicate tree: `and` / `or` / `not` / `eq` / `lt` / `gt` / `in`.
///
/// Evaluation against a missing attribute or an unknown operator is always
/// `false` — conditions fail closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    /// All sub-conditions must hold.
    And(Vec<Condition>),
    /// At least one sub-condition must hold.
    Or(Vec<Condition>),
    /// The sub-condition must not hold.
    Not(Box<Condition>),
    /// `context[key] == value`.
    Eq {
        /// Attribute name to look up in the context.
        key: String,
        /// Value to compare against.
        value: Value,
    },
    /// `context[key] < value` (numeric values only).
    Lt {
        /// Attribute name to look up in the context.
        key: String,
        /// Value to compare against.
        value: Value,
    },
    /// `context[key] > value` (numeric values only).
    Gt {
        /// Attribute name to look up in the context.
        key: String,
        /// Value to compare against.
        value: Value,
    },
    /// `context[key] in values`.
    In {
        /// Attribute name to look up in the context.
        key: String,
        /// Candidate set.
        values: Vec<Value>,
    },
}

impl Condition {
    /// Evaluate this condition against an attribute context.
    ///
    /// A missing key or a type mismatch across `Lt`/`Gt` resolves to
    /// `false` rather than propagating an error.
    pub fn evaluate(&self, ctx: &AttributeContext) -> bool {
        match self {
            Condition::And(cs) => cs.iter().all(|c| c.evaluate(ctx)),
            Condition::Or(cs) => cs.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(c) => !c.evaluate(ctx),
            Condition::Eq { key, value } => ctx.get(key) == Some(value),
            Condition::Lt { key, value } => ctx
                .get(key)
                .and_then(|v| v.partial_cmp_num(value))
                .map(|o| o == std::cmp::Ordering::Less)
                .unwrap_or(false),
            Condition::Gt { key, value } => ctx
                .get(key)
                .and_then(|v| v.partial_cmp_num(value))
                .map(|o| o == std::cmp::Ordering::Greater)
                .unwrap_or(false),
            Condition::In { key, values } => {
                ctx.get(key).map(|v| values.contains(v)).unwrap_or(false)
            }
        }
    }
}
