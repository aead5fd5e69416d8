//! # Connection Module
//!
//! The `execute` primitive every scope and batch funnels into, and the row
//! types it returns. Implementations can be swapped (ScyllaDB, test double).

#[cfg(feature = "scylla")]
pub mod scylla_impl;

use async_trait::async_trait;
use cqlscope_domain::CqlValue;
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;

#[cfg(feature = "scylla")]
pub use scylla_impl::ScyllaConnection;

/// A pooled wire connection to the cluster.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute one statement with positional bind values.
    async fn execute(&self, cql: &str, values: &[CqlValue]) -> Result<RowSet>;

    /// Discard every pooled connection so the next statement opens a fresh one.
    async fn reset(&self) -> Result<()>;
}

pub type SharedConnection = Arc<dyn Connection>;

// =============================================================================
// ROWS
// =============================================================================

/// One result row: column names mapped to values, in result order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, CqlValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, CqlValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&CqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &CqlValue> {
        self.columns.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Flatten into a JSON object of plain values.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl<S: Into<String>> FromIterator<(S, CqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, CqlValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(name, value)| (name.into(), value)).collect(),
        }
    }
}

fn value_to_json(value: &CqlValue) -> serde_json::Value {
    use serde_json::Value;

    match value {
        CqlValue::Null => Value::Null,
        CqlValue::Boolean(b) => Value::Bool(*b),
        CqlValue::Int(i) => Value::from(*i),
        CqlValue::Double(d) => serde_json::Number::from_f64(*d).map_or(Value::Null, Value::Number),
        CqlValue::Text(s) => Value::String(s.clone()),
        CqlValue::Uuid(u) => Value::String(u.to_string()),
        CqlValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
        CqlValue::List(items) => Value::Array(items.iter().map(value_to_json).collect()),
    }
}

/// Rows returned by one `execute` call. Single pass: iterate by value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl FromIterator<Row> for RowSet {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
