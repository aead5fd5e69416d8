//! Statement renderer.
//!
//! Pure functions from an [`Operation`], a table name and a [`ClauseSet`] to
//! CQL text plus positional bind values. Category order is fixed regardless of
//! how the clauses were accumulated:
//!
//! ```text
//! SELECT <cols|*> FROM <table> [USING ..] [WHERE .. AND ..] [LIMIT n]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clause::{ClauseSet, Predicate, UsingOptions};
use crate::value::CqlValue;

/// CQL text and the values bound to its `?` placeholders, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<CqlValue>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(cql: impl Into<String>, values: Vec<CqlValue>) -> Self {
        Self {
            cql: cql.into(),
            values,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql)
    }
}

/// What kind of statement to render.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Select,
    /// `SELECT COUNT(*)` over the same restrictions.
    Count,
    Insert(Vec<(String, CqlValue)>),
    Update(Vec<(String, CqlValue)>),
    /// Columns to delete; empty deletes whole rows.
    Delete(Vec<String>),
    Truncate,
}

/// Render `operation` against `table` with the accumulated `clauses`.
pub fn render(operation: &Operation, table: &str, clauses: &ClauseSet) -> Statement {
    let mut values = Vec::new();
    let cql = match operation {
        Operation::Select => {
            let columns = if clauses.columns().is_empty() {
                "*".to_string()
            } else {
                clauses.columns().join(", ")
            };
            render_read(&columns, table, clauses, &mut values)
        }
        Operation::Count => render_read("COUNT(*)", table, clauses, &mut values),
        Operation::Insert(row) => render_insert(table, row, clauses.using(), &mut values),
        Operation::Update(assignments) => {
            render_update(table, assignments, clauses, &mut values)
        }
        Operation::Delete(columns)
            if columns.is_empty() && clauses.predicates().is_empty() =>
        {
            format!("TRUNCATE {table}")
        }
        Operation::Delete(columns) => render_delete(table, columns, clauses, &mut values),
        Operation::Truncate => format!("TRUNCATE {table}"),
    };

    Statement { cql, values }
}

/// Wrap write statements in a single `BEGIN BATCH .. APPLY BATCH`, one line each.
pub fn render_batch(statements: &[Statement], using: &UsingOptions) -> Statement {
    let mut cql = String::from("BEGIN BATCH");
    if let Some(using) = using.render() {
        cql.push(' ');
        cql.push_str(&using);
    }
    cql.push('\n');

    let mut values = Vec::new();
    for statement in statements {
        cql.push_str("  ");
        cql.push_str(&statement.cql);
        cql.push_str(";\n");
        values.extend(statement.values.iter().cloned());
    }
    cql.push_str("APPLY BATCH");

    Statement { cql, values }
}

fn render_read(
    projection: &str,
    table: &str,
    clauses: &ClauseSet,
    values: &mut Vec<CqlValue>,
) -> String {
    let mut cql = format!("SELECT {projection} FROM {table}");
    push_using(&mut cql, clauses.using());
    push_where(&mut cql, clauses.predicates(), values);
    if let Some(limit) = clauses.limit() {
        cql.push_str(&format!(" LIMIT {limit}"));
    }
    cql
}

fn render_insert(
    table: &str,
    row: &[(String, CqlValue)],
    using: &UsingOptions,
    values: &mut Vec<CqlValue>,
) -> String {
    let columns: Vec<&str> = row.iter().map(|(column, _)| column.as_str()).collect();
    let placeholders = vec!["?"; row.len()].join(", ");
    values.extend(row.iter().map(|(_, value)| value.clone()));

    let mut cql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    push_using(&mut cql, using);
    cql
}

fn render_update(
    table: &str,
    assignments: &[(String, CqlValue)],
    clauses: &ClauseSet,
    values: &mut Vec<CqlValue>,
) -> String {
    let mut cql = format!("UPDATE {table}");
    push_using(&mut cql, clauses.using());

    let sets: Vec<String> = assignments
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect();
    values.extend(assignments.iter().map(|(_, value)| value.clone()));
    cql.push_str(" SET ");
    cql.push_str(&sets.join(", "));

    push_where(&mut cql, clauses.predicates(), values);
    cql
}

fn render_delete(
    table: &str,
    columns: &[String],
    clauses: &ClauseSet,
    values: &mut Vec<CqlValue>,
) -> String {
    let mut cql = if columns.is_empty() {
        format!("DELETE FROM {table}")
    } else {
        format!("DELETE {} FROM {table}", columns.join(", "))
    };
    push_using(&mut cql, clauses.using());
    push_where(&mut cql, clauses.predicates(), values);
    cql
}

fn push_using(cql: &mut String, using: &UsingOptions) {
    if let Some(using) = using.render() {
        cql.push(' ');
        cql.push_str(&using);
    }
}

fn push_where(cql: &mut String, predicates: &[Predicate], values: &mut Vec<CqlValue>) {
    for (i, predicate) in predicates.iter().enumerate() {
        cql.push_str(if i == 0 { " WHERE " } else { " AND " });
        predicate.render_into(cql, values);
    }
}
