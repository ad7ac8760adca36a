//! Filter predicates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl Op {
    /// Whether the operator bounds from below (`>`, `>=`).
    #[must_use]
    pub const fn is_lower(self) -> bool {
        matches!(self, Self::Gt | Self::Gte)
    }

    /// Whether the operator bounds from above (`<`, `<=`).
    #[must_use]
    pub const fn is_upper(self) -> bool {
        matches!(self, Self::Lt | Self::Lte)
    }

    /// Whether the bound excludes its own value.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Self::Gt | Self::Lt)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        };
        write!(f, "{s}")
    }
}

/// `field op value`. The value must be keyable when the query runs.
#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::disallowed_methods)] // Clone needed so builders can be reused
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Predicate {
    #[must_use]
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}
