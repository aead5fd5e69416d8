//! Clause model: the structural pieces a scope accumulates before rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DomainError;
use crate::value::CqlValue;

// =============================================================================
// CONSISTENCY
// =============================================================================

/// Replica acknowledgement level for a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Consistency {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

impl Consistency {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::One => "ONE",
            Self::Two => "TWO",
            Self::Three => "THREE",
            Self::Quorum => "QUORUM",
            Self::All => "ALL",
            Self::LocalQuorum => "LOCAL_QUORUM",
            Self::EachQuorum => "EACH_QUORUM",
            Self::LocalOne => "LOCAL_ONE",
        }
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Consistency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ANY" => Ok(Self::Any),
            "ONE" => Ok(Self::One),
            "TWO" => Ok(Self::Two),
            "THREE" => Ok(Self::Three),
            "QUORUM" => Ok(Self::Quorum),
            "ALL" => Ok(Self::All),
            "LOCAL_QUORUM" => Ok(Self::LocalQuorum),
            "EACH_QUORUM" => Ok(Self::EachQuorum),
            "LOCAL_ONE" => Ok(Self::LocalOne),
            _ => Err(DomainError::UnknownConsistency(s.to_string())),
        }
    }
}

// =============================================================================
// PREDICATES
// =============================================================================

/// Comparison operators for structured predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,  // =
    Gt,  // >
    Gte, // >=
    Lt,  // <
    Lte, // <=
}

impl Operator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A single WHERE predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        operator: Operator,
        value: CqlValue,
    },
    In {
        column: String,
        values: Vec<CqlValue>,
    },
    /// Verbatim CQL with `?` placeholders bound positionally.
    Raw {
        fragment: String,
        values: Vec<CqlValue>,
    },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Self::Compare {
            column: column.into(),
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    pub fn gt(column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        Self::Compare {
            column: column.into(),
            operator: Operator::Gt,
            value: value.into(),
        }
    }

    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CqlValue>,
    {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn raw(fragment: impl Into<String>, values: Vec<CqlValue>) -> Self {
        Self::Raw {
            fragment: fragment.into(),
            values,
        }
    }

    /// Column the predicate tests, if it is structured.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Compare { column, .. } | Self::In { column, .. } => Some(column),
            Self::Raw { .. } => None,
        }
    }

    /// True for `=` and `IN` tests on `column`; ranges and raw fragments never restrict.
    pub fn restricts(&self, column: &str) -> bool {
        match self {
            Self::Compare {
                column: c,
                operator: Operator::Eq,
                ..
            }
            | Self::In { column: c, .. } => c == column,
            _ => false,
        }
    }

    pub fn is_empty_in(&self) -> bool {
        matches!(self, Self::In { values, .. } if values.is_empty())
    }

    /// Values this predicate pins `column` to, if it restricts it.
    pub fn restricted_values(&self, column: &str) -> Option<Vec<CqlValue>> {
        match self {
            Self::Compare {
                column: c,
                operator: Operator::Eq,
                value,
            } if c == column => Some(vec![value.clone()]),
            Self::In { column: c, values } if c == column => Some(values.clone()),
            _ => None,
        }
    }

    /// Append the CQL text to `out`, pushing raw bind values onto `binds`.
    pub(crate) fn render_into(&self, out: &mut String, binds: &mut Vec<CqlValue>) {
        match self {
            Self::Compare {
                column,
                operator,
                value,
            } => {
                out.push_str(column);
                out.push(' ');
                out.push_str(operator.as_str());
                out.push(' ');
                out.push_str(&value.to_cql_literal());
            }
            Self::In { column, values } => {
                let literals: Vec<String> = values.iter().map(CqlValue::to_cql_literal).collect();
                out.push_str(column);
                out.push_str(" IN (");
                out.push_str(&literals.join(", "));
                out.push(')');
            }
            Self::Raw { fragment, values } => {
                out.push_str(fragment);
                binds.extend(values.iter().cloned());
            }
        }
    }
}

// =============================================================================
// USING OPTIONS
// =============================================================================

/// Statement-level options rendered in a `USING` clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsingOptions {
    pub consistency: Option<Consistency>,
    pub ttl: Option<Duration>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl UsingOptions {
    pub const fn is_empty(&self) -> bool {
        self.consistency.is_none() && self.ttl.is_none() && self.timestamp.is_none()
    }

    /// Options set on `other` take precedence.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            consistency: other.consistency.or(self.consistency),
            ttl: other.ttl.or(self.ttl),
            timestamp: other.timestamp.or(self.timestamp),
        }
    }

    /// `USING CONSISTENCY .. AND TTL .. AND TIMESTAMP ..`, or `None` when empty.
    ///
    /// TTL renders in whole seconds; the timestamp in epoch microseconds.
    pub fn render(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(3);
        if let Some(consistency) = self.consistency {
            parts.push(format!("CONSISTENCY {consistency}"));
        }
        if let Some(ttl) = self.ttl {
            parts.push(format!("TTL {}", ttl.as_secs()));
        }
        if let Some(timestamp) = self.timestamp {
            parts.push(format!("TIMESTAMP {}", timestamp.timestamp_micros()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(format!("USING {}", parts.join(" AND ")))
        }
    }
}

// =============================================================================
// CLAUSES
// =============================================================================

/// One structural piece of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Select(Vec<String>),
    Where(Predicate),
    Consistency(Consistency),
    Limit(NonZeroU32),
    Using(UsingOptions),
}

/// Accumulated clauses, one slot per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClauseSet {
    columns: Vec<String>,
    using: UsingOptions,
    predicates: Vec<Predicate>,
    limit: Option<NonZeroU32>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulating policy: columns and predicates append, scalars overwrite.
    pub fn apply(&mut self, clause: Clause) {
        match clause {
            Clause::Select(columns) => {
                for column in columns {
                    if !self.columns.contains(&column) {
                        self.columns.push(column);
                    }
                }
            }
            Clause::Where(predicate) => self.predicates.push(predicate),
            Clause::Consistency(level) => self.using.consistency = Some(level),
            Clause::Limit(limit) => self.limit = Some(limit),
            Clause::Using(options) => self.using = self.using.merge(&options),
        }
    }

    /// Replacing policy: the clause becomes the only value in its category.
    pub fn replace(&mut self, clause: Clause) {
        match clause {
            Clause::Select(columns) => {
                self.columns.clear();
                self.apply(Clause::Select(columns));
            }
            Clause::Where(predicate) => self.predicates = vec![predicate],
            Clause::Using(options) => self.using = options,
            other => self.apply(other),
        }
    }

    /// Concatenate two clause sets; scalar options from `other` win.
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        self.apply(Clause::Select(other.columns.clone()));
        self.predicates.extend(other.predicates.iter().cloned());
        self.using = self.using.merge(&other.using);
        if other.limit.is_some() {
            self.limit = other.limit;
        }
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub const fn using(&self) -> &UsingOptions {
        &self.using
    }

    pub const fn limit(&self) -> Option<NonZeroU32> {
        self.limit
    }

    pub fn clear_limit(&mut self) {
        self.limit = None;
    }

    pub fn clear_predicates(&mut self) {
        self.predicates.clear();
    }

    /// Swap the predicate at `index` in place, keeping its position. Out of range is a no-op.
    pub fn replace_predicate(&mut self, index: usize, predicate: Predicate) {
        if let Some(slot) = self.predicates.get_mut(index) {
            *slot = predicate;
        }
    }

    /// Any `=`/`IN` predicate on `column`.
    pub fn restricts(&self, column: &str) -> bool {
        self.predicates.iter().any(|p| p.restricts(column))
    }

    /// True when every predicate restricts `column` (and there is at least one).
    pub fn only_restricts(&self, column: &str) -> bool {
        !self.predicates.is_empty() && self.predicates.iter().all(|p| p.restricts(column))
    }

    pub fn has_empty_in(&self) -> bool {
        self.predicates.iter().any(Predicate::is_empty_in)
    }
}
