//! # cqlscope console
//!
//! Builds a [`Scope`] from command-line flags so a query can be inspected
//! (`--dry-run`) or run against the configured cluster.
//!
//! Values given on the command line are typed by shape: `null`, `true`/`false`,
//! integers, floats, UUIDs and RFC 3339 instants are recognised; anything else
//! (or anything wrapped in single quotes) is text.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use cqlscope_domain::{render, Consistency, CqlValue, Operation};
use cqlscope_persistence::{Connection, Keyspace, PersistenceError, Result, RowSet, Scope};
use uuid::Uuid;

#[derive(Parser, Debug, Clone)]
#[command(name = "cqlscope")]
#[command(about = "Render or run a scoped CQL query")]
pub struct Cli {
    /// Table to query
    #[arg(short, long)]
    pub table: String,

    /// Primary key column
    #[arg(short, long, default_value = "id")]
    pub key: String,

    /// Columns to select (comma separated, repeatable)
    #[arg(short, long, value_delimiter = ',')]
    pub select: Vec<String>,

    /// Equality filter, `column=value` (repeatable)
    #[arg(short = 'w', long = "where", value_parser = parse_filter)]
    pub filters: Vec<(String, CqlValue)>,

    /// IN filter, `column=v1,v2,...` (repeatable)
    #[arg(long = "in", value_parser = parse_in_filter)]
    pub in_filters: Vec<(String, Vec<CqlValue>)>,

    /// Consistency level (ONE, QUORUM, LOCAL_QUORUM, ...)
    #[arg(short, long)]
    pub consistency: Option<Consistency>,

    /// Maximum rows to return
    #[arg(short, long)]
    pub limit: Option<u32>,

    /// Print the row count instead of rows
    #[arg(long)]
    pub count: bool,

    /// Print the CQL without connecting
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Apply every flag to a fresh scope over `keyspace`.
    pub fn scope(&self, keyspace: &Keyspace) -> Scope {
        let mut scope = keyspace.table(self.table.clone(), self.key.clone());
        if !self.select.is_empty() {
            scope = scope.select(self.select.iter().cloned());
        }
        for (column, value) in &self.filters {
            scope = scope.where_eq(column.clone(), value.clone());
        }
        for (column, values) in &self.in_filters {
            scope = scope.where_in(column.clone(), values.iter().cloned());
        }
        if let Some(level) = self.consistency {
            scope = scope.consistency(level);
        }
        if let Some(limit) = self.limit {
            scope = scope.limit(limit);
        }
        scope
    }

    /// Statement text the command would send.
    pub fn render(&self, scope: &Scope) -> String {
        if self.count {
            render(&Operation::Count, scope.table(), scope.clauses()).cql
        } else {
            scope.to_cql()
        }
    }
}

/// Connection for `--dry-run`: renders fine, refuses to execute.
#[derive(Debug, Default)]
pub struct OfflineConnection;

#[async_trait]
impl Connection for OfflineConnection {
    async fn execute(&self, _cql: &str, _values: &[CqlValue]) -> Result<RowSet> {
        Err(PersistenceError::Connection(
            "dry run: no cluster connection".to_string(),
        ))
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Type a command-line literal by its shape.
pub fn parse_value(raw: &str) -> CqlValue {
    let raw = raw.trim();
    if let Some(text) = raw
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return CqlValue::Text(text.to_string());
    }
    if raw.eq_ignore_ascii_case("null") {
        return CqlValue::Null;
    }
    if let Ok(flag) = raw.parse::<bool>() {
        return CqlValue::Boolean(flag);
    }
    if let Ok(int) = raw.parse::<i64>() {
        return CqlValue::Int(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return CqlValue::Double(float);
    }
    if let Ok(id) = Uuid::parse_str(raw) {
        return CqlValue::Uuid(id);
    }
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return CqlValue::Timestamp(instant.with_timezone(&Utc));
    }
    CqlValue::Text(raw.to_string())
}

fn split_pair(raw: &str) -> std::result::Result<(&str, &str), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected column=value, got `{raw}`"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in `{raw}`"));
    }
    Ok((column, value))
}

/// `column=value`
///
/// # Errors
///
/// Returns a message when there is no `=` or no column name.
pub fn parse_filter(raw: &str) -> std::result::Result<(String, CqlValue), String> {
    let (column, value) = split_pair(raw)?;
    Ok((column.to_string(), parse_value(value)))
}

/// `column=v1,v2,...`; an empty right-hand side is an empty list.
///
/// # Errors
///
/// Returns a message when there is no `=` or no column name.
pub fn parse_in_filter(raw: &str) -> std::result::Result<(String, Vec<CqlValue>), String> {
    let (column, values) = split_pair(raw)?;
    let values = if values.trim().is_empty() {
        Vec::new()
    } else {
        values.split(',').map(parse_value).collect()
    };
    Ok((column.to_string(), values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlscope_persistence::{KeyspaceConfig, RetryPolicy};
    use std::sync::Arc;

    fn offline() -> Keyspace {
        let config = KeyspaceConfig {
            retry: RetryPolicy::raise(),
            ..KeyspaceConfig::default()
        };
        Keyspace::new(Arc::new(OfflineConnection), &config)
    }

    #[test]
    fn test_parse_value_shapes() {
        assert_eq!(parse_value("42"), CqlValue::Int(42));
        assert_eq!(parse_value("2.5"), CqlValue::Double(2.5));
        assert_eq!(parse_value("true"), CqlValue::Boolean(true));
        assert_eq!(parse_value("NULL"), CqlValue::Null);
        assert_eq!(parse_value("'42'"), CqlValue::from("42"));
        assert_eq!(parse_value("Hey"), CqlValue::from("Hey"));

        let id = Uuid::new_v4();
        assert_eq!(parse_value(&id.to_string()), CqlValue::Uuid(id));
        assert!(matches!(
            parse_value("2024-01-01T00:00:00Z"),
            CqlValue::Timestamp(_)
        ));
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            parse_filter("title=Hey").unwrap(),
            ("title".to_string(), CqlValue::from("Hey"))
        );
        assert_eq!(
            parse_in_filter("id=1,2").unwrap(),
            ("id".to_string(), vec![CqlValue::Int(1), CqlValue::Int(2)])
        );
        assert_eq!(parse_in_filter("id=").unwrap().1, Vec::<CqlValue>::new());
        assert!(parse_filter("title").is_err());
        assert!(parse_filter("=Hey").is_err());
    }

    #[test]
    fn test_flags_build_scope() {
        let cli = Cli::try_parse_from([
            "cqlscope",
            "--table",
            "posts",
            "--select",
            "id,title",
            "--where",
            "title=Hey",
            "--consistency",
            "quorum",
            "--limit",
            "3",
        ])
        .unwrap();

        let scope = cli.scope(&offline());
        assert_eq!(
            cli.render(&scope),
            "SELECT id, title FROM posts USING CONSISTENCY QUORUM WHERE title = 'Hey' LIMIT 3"
        );
    }

    #[test]
    fn test_count_renders_count_statement() {
        let cli = Cli::try_parse_from([
            "cqlscope", "-t", "posts", "--in", "blog=a,b", "--count",
        ])
        .unwrap();

        let scope = cli.scope(&offline());
        assert_eq!(
            cli.render(&scope),
            "SELECT COUNT(*) FROM posts WHERE blog IN ('a', 'b')"
        );
    }

    #[tokio::test]
    async fn test_offline_connection_refuses_to_execute() {
        let scope = offline().table("posts", "id");
        let err = scope.all().await.unwrap_err();
        assert!(matches!(err, PersistenceError::Connection(_)));
    }
}
