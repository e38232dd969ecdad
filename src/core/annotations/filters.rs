//! Attribute Predicate Evaluator
//!
//! Evaluates one attribute-match clause (operator + comparison value)
//! against a concrete attribute value bag. Used by the predicate query
//! engine and by external filtering UIs.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::AttrValue;

// =============================================================================
// Operators
// =============================================================================

/// Comparison operator of one clause.
///
/// An operator the wire format does not recognize deserializes to
/// `Defined`, which degrades the clause to an existence check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    /// Inclusive `[low, high]` range; value is a 2-element list
    Range,
    /// Set membership; value is a list
    In,
    /// Existence check (fallback for unrecognized operators)
    Defined,
}

impl FilterOp {
    /// Wire symbol of the operator
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Equal => "=",
            FilterOp::NotEqual => "!=",
            FilterOp::GreaterThan => ">",
            FilterOp::LessThan => "<",
            FilterOp::GreaterOrEqual => ">=",
            FilterOp::LessOrEqual => "<=",
            FilterOp::Range => "range",
            FilterOp::In => "in",
            FilterOp::Defined => "defined",
        }
    }
}

impl From<String> for FilterOp {
    fn from(symbol: String) -> Self {
        match symbol.as_str() {
            "=" => FilterOp::Equal,
            "!=" => FilterOp::NotEqual,
            ">" => FilterOp::GreaterThan,
            "<" => FilterOp::LessThan,
            ">=" => FilterOp::GreaterOrEqual,
            "<=" => FilterOp::LessOrEqual,
            "range" => FilterOp::Range,
            "in" => FilterOp::In,
            _ => FilterOp::Defined,
        }
    }
}

impl From<FilterOp> for String {
    fn from(op: FilterOp) -> Self {
        op.symbol().to_string()
    }
}

/// Comparison value of one clause: a scalar, or a list for `range`/`in`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClauseValue {
    Single(AttrValue),
    List(Vec<AttrValue>),
}

impl ClauseValue {
    fn single(&self) -> Option<&AttrValue> {
        match self {
            ClauseValue::Single(v) => Some(v),
            ClauseValue::List(_) => None,
        }
    }

    fn list(&self) -> Option<&[AttrValue]> {
        match self {
            ClauseValue::List(l) => Some(l),
            ClauseValue::Single(_) => None,
        }
    }
}

// =============================================================================
// Clauses
// =============================================================================

/// One attribute-match clause: `bag[key] <op> val`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeClause {
    /// Attribute key looked up in the value bag
    pub key: String,
    pub op: FilterOp,
    pub val: ClauseValue,
}

impl AttributeClause {
    pub fn new(key: &str, op: FilterOp, val: impl Into<AttrValue>) -> Self {
        Self {
            key: key.to_string(),
            op,
            val: ClauseValue::Single(val.into()),
        }
    }

    pub fn list(key: &str, op: FilterOp, val: Vec<AttrValue>) -> Self {
        Self {
            key: key.to_string(),
            op,
            val: ClauseValue::List(val),
        }
    }

    /// Tests the clause against a concrete value
    pub fn matches(&self, value: &AttrValue) -> bool {
        match self.op {
            FilterOp::Equal => self.val.single().is_some_and(|v| loose_eq(value, v)),
            FilterOp::NotEqual => self.val.single().is_some_and(|v| !loose_eq(value, v)),
            FilterOp::GreaterThan => self.ordered(value, |o| o == Ordering::Greater),
            FilterOp::LessThan => self.ordered(value, |o| o == Ordering::Less),
            FilterOp::GreaterOrEqual => self.ordered(value, |o| o != Ordering::Less),
            FilterOp::LessOrEqual => self.ordered(value, |o| o != Ordering::Greater),
            FilterOp::Range => self.val.list().is_some_and(|bounds| match bounds {
                [low, high] => {
                    typed_ordering(value, low).is_some_and(|o| o != Ordering::Less)
                        && typed_ordering(value, high).is_some_and(|o| o != Ordering::Greater)
                }
                _ => false,
            }),
            FilterOp::In => self
                .val
                .list()
                .is_some_and(|list| list.iter().any(|v| loose_eq(value, v))),
            FilterOp::Defined => true,
        }
    }

    fn ordered(&self, value: &AttrValue, accept: impl Fn(Ordering) -> bool) -> bool {
        self.val
            .single()
            .and_then(|v| typed_ordering(value, v))
            .is_some_and(accept)
    }
}

/// Tests every clause against the bag with AND semantics.
///
/// A clause whose key is absent from the bag fails the whole set.
pub fn evaluate_all(clauses: &[AttributeClause], bag: &HashMap<String, AttrValue>) -> bool {
    clauses
        .iter()
        .all(|clause| bag.get(&clause.key).is_some_and(|value| clause.matches(value)))
}

/// Like [`evaluate_all`], but a user's override bag shadows the defaults
/// for keys it defines.
pub fn evaluate_all_scoped(
    clauses: &[AttributeClause],
    bag: &HashMap<String, AttrValue>,
    user_bag: Option<&HashMap<String, AttrValue>>,
) -> bool {
    clauses.iter().all(|clause| {
        let value = user_bag
            .and_then(|u| u.get(&clause.key))
            .or_else(|| bag.get(&clause.key));
        value.is_some_and(|v| clause.matches(v))
    })
}

// =============================================================================
// Comparison Semantics
// =============================================================================

/// Loose coercing equality: number 5 matches string "5", bools coerce to
/// 0/1 against numbers. Matches the persistence layer's historical
/// equality semantics; relational operators stay typed.
fn loose_eq(a: &AttrValue, b: &AttrValue) -> bool {
    match (a, b) {
        (AttrValue::Text(x), AttrValue::Text(y)) => x == y,
        (AttrValue::Number(x), AttrValue::Number(y)) => x == y,
        (AttrValue::Bool(x), AttrValue::Bool(y)) => x == y,
        (AttrValue::Number(n), AttrValue::Text(s)) | (AttrValue::Text(s), AttrValue::Number(n)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        (AttrValue::Bool(b), AttrValue::Number(n)) | (AttrValue::Number(n), AttrValue::Bool(b)) => {
            (if *b { 1.0 } else { 0.0 }) == *n
        }
        _ => false,
    }
}

/// Typed ordering: numeric for numbers, lexicographic for strings.
/// Mixed types are incomparable.
fn typed_ordering(a: &AttrValue, b: &AttrValue) -> Option<Ordering> {
    match (a, b) {
        (AttrValue::Number(x), AttrValue::Number(y)) => x.partial_cmp(y),
        (AttrValue::Text(x), AttrValue::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================
