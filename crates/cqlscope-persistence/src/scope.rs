//! # Scope
//!
//! Chainable accumulator of query clauses over one table.
//!
//! ```text
//! keyspace.table("posts", "id")        ┐
//!     .select(["id", "title"])         │  pure: clauses accumulate,
//!     .where_eq("title", "Hey")        │  to_cql() renders on demand
//!     .consistency(Quorum)             │
//!     .limit(3)                        ┘
//!     .all().await?                    ── terminal: validate, then execute
//! ```
//!
//! Terminal operations validate the clause set before touching the network,
//! short-circuit empty `IN` lists, and fan multi-valued `IN` lists out into one
//! query per value on the row-fetch path.

use chrono::{DateTime, Utc};
use cqlscope_domain::{
    render, Clause, ClauseSet, Consistency, CqlValue, Operation, Predicate, Statement,
    UsingOptions,
};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::connection::Row;
use crate::error::{PersistenceError, Result};
use crate::keyspace::{Keyspace, Writer};

/// A chainable, renderable, enumerable query over one table.
#[derive(Clone)]
pub struct Scope {
    keyspace: Keyspace,
    table: String,
    key: String,
    clauses: ClauseSet,
}

/// Rows a scoped write applies to.
enum Targets {
    /// No restriction at all
    Everything,
    /// Keys pinned by the scope's own predicates; one statement suffices
    Scoped(Vec<CqlValue>),
    /// Keys read back with a key-only SELECT; one statement per key
    Materialized(Vec<CqlValue>),
}

impl Scope {
    pub(crate) const fn new(
        keyspace: Keyspace,
        table: String,
        key: String,
        clauses: ClauseSet,
    ) -> Self {
        Self {
            keyspace,
            table,
            key,
            clauses,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_column(&self) -> &str {
        &self.key
    }

    pub const fn clauses(&self) -> &ClauseSet {
        &self.clauses
    }

    // =========================================================================
    // CHAINING
    // =========================================================================

    /// Add columns to the selection.
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses
            .apply(Clause::Select(columns.into_iter().map(Into::into).collect()));
        self
    }

    /// Replace the selection.
    #[must_use]
    pub fn select_only<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses
            .replace(Clause::Select(columns.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<CqlValue>) -> Self {
        self.where_predicate(Predicate::eq(column, value))
    }

    #[must_use]
    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CqlValue>,
    {
        self.where_predicate(Predicate::is_in(column, values))
    }

    /// Raw CQL fragment with `?` placeholders, bound in declaration order.
    #[must_use]
    pub fn where_cql(self, fragment: impl Into<String>, values: Vec<CqlValue>) -> Self {
        self.where_predicate(Predicate::raw(fragment, values))
    }

    #[must_use]
    pub fn where_predicate(mut self, predicate: Predicate) -> Self {
        self.clauses.apply(Clause::Where(predicate));
        self
    }

    /// Replace every predicate with `predicate`.
    #[must_use]
    pub fn where_only(mut self, predicate: Predicate) -> Self {
        self.clauses.replace(Clause::Where(predicate));
        self
    }

    #[must_use]
    pub fn consistency(mut self, level: Consistency) -> Self {
        self.clauses.apply(Clause::Consistency(level));
        self
    }

    /// `0` clears the limit.
    #[must_use]
    pub fn limit(mut self, count: u32) -> Self {
        match NonZeroU32::new(count) {
            Some(limit) => self.clauses.apply(Clause::Limit(limit)),
            None => self.clauses.clear_limit(),
        }
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.clauses.apply(Clause::Using(UsingOptions {
            ttl: Some(ttl),
            ..UsingOptions::default()
        }));
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.clauses.apply(Clause::Using(UsingOptions {
            timestamp: Some(timestamp),
            ..UsingOptions::default()
        }));
        self
    }

    /// Combine with another scope's clauses; its scalar options win.
    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        self.clauses = self.clauses.merge(&other.clauses);
        self
    }

    // =========================================================================
    // RENDERING
    // =========================================================================

    pub fn to_statement(&self) -> Statement {
        render(&Operation::Select, &self.table, &self.clauses)
    }

    /// Rendered SELECT text. Pure; no network call.
    pub fn to_cql(&self) -> String {
        self.to_statement().cql
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Every matching row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn all(&self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.each(|row| rows.push(row)).await?;
        Ok(rows)
    }

    /// Call `f` with each matching row, in request order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn each<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        self.validate()?;
        if self.short_circuits() {
            return Ok(());
        }
        self.stream_rows(&self.clauses, f).await
    }

    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn first(&self) -> Result<Option<Row>> {
        let rows = self.clone().limit(1).all().await?;
        Ok(rows.into_iter().next())
    }

    /// `SELECT COUNT(*)` over the scope. Illegal with a key restriction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` before any network call when the key is restricted.
    pub async fn count(&self) -> Result<u64> {
        self.validate()?;
        if self.clauses.restricts(&self.key) {
            return Err(PersistenceError::InvalidQuery(format!(
                "cannot count rows while restricting key column {}",
                self.key
            )));
        }
        if self.short_circuits() {
            return Ok(0);
        }

        let mut total = 0;
        for clauses in fan_out(&self.clauses) {
            let statement = render(&Operation::Count, &self.table, &clauses);
            let rows = self.keyspace.execute(&statement).await?;
            let count = rows
                .first()
                .and_then(|row| row.get("count").or_else(|| row.values().next()))
                .and_then(CqlValue::as_int)
                .ok_or_else(|| {
                    PersistenceError::Connection("COUNT returned no count column".to_string())
                })?;
            total += u64::try_from(count).unwrap_or(0);
        }
        Ok(total)
    }

    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn any(&self) -> Result<bool> {
        Ok(self.first().await?.is_some())
    }

    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn none(&self) -> Result<bool> {
        Ok(!self.any().await?)
    }

    /// Exactly one row matches.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clause combinations, or the execute error.
    pub async fn one(&self) -> Result<bool> {
        Ok(self.clone().limit(2).all().await?.len() == 1)
    }

    /// Row whose key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches.
    pub async fn find(&self, key: impl Into<CqlValue>) -> Result<Row> {
        let key = key.into();
        let label = key.to_cql_literal();
        self.clone()
            .where_eq(self.key.clone(), key)
            .first()
            .await?
            .ok_or_else(|| PersistenceError::NotFound {
                table: self.table.clone(),
                key: label,
            })
    }

    /// Page through matching rows, `batch_size` at a time, in key order.
    ///
    /// Each page is `WHERE key > last_key LIMIT batch_size`. A page whose first
    /// row repeats the previous page's last key has that row dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for a zero batch size or illegal clauses, or the execute error.
    pub async fn find_in_batches<F>(&self, batch_size: u32, mut f: F) -> Result<()>
    where
        F: FnMut(Vec<Row>),
    {
        let size = NonZeroU32::new(batch_size).ok_or_else(|| {
            PersistenceError::InvalidQuery("batch size must be positive".to_string())
        })?;
        self.validate()?;
        if self.short_circuits() {
            return Ok(());
        }

        let mut base = self.clauses.clone();
        base.apply(Clause::Limit(size));
        if !base.columns().is_empty() {
            base.apply(Clause::Select(vec![self.key.clone()]));
        }

        let mut last_key: Option<CqlValue> = None;
        loop {
            let mut clauses = base.clone();
            if let Some(last) = &last_key {
                clauses.apply(Clause::Where(Predicate::gt(self.key.clone(), last.clone())));
            }

            let mut page = Vec::new();
            self.stream_rows(&clauses, |row| page.push(row)).await?;
            let fetched = page.len();

            if let (Some(last), Some(first)) = (&last_key, page.first()) {
                if first.get(&self.key) == Some(last) {
                    page.remove(0);
                }
            }

            let Some(next_key) = page.last().and_then(|row| row.get(&self.key)).cloned() else {
                break;
            };
            debug!(table = %self.table, rows = page.len(), "Yielding batch");
            f(page);

            if fetched < size.get() as usize {
                break;
            }
            last_key = Some(next_key);
        }
        Ok(())
    }

    /// Row-at-a-time form of [`Self::find_in_batches`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::find_in_batches`].
    pub async fn find_each<F>(&self, batch_size: u32, mut f: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        self.find_in_batches(batch_size, |rows| rows.into_iter().for_each(&mut f))
            .await
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Apply `assignments` to every matching row.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses or no assignments, or the execute error.
    pub async fn update_all(&self, assignments: Vec<(String, CqlValue)>) -> Result<()> {
        let mut keyspace = self.keyspace.clone();
        self.update_all_into(&mut keyspace, assignments).await
    }

    /// [`Self::update_all`], writing through `writer` (e.g. a batch).
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses or no assignments, or the writer's error.
    pub async fn update_all_into(
        &self,
        writer: &mut dyn Writer,
        assignments: Vec<(String, CqlValue)>,
    ) -> Result<()> {
        if assignments.is_empty() {
            return Err(PersistenceError::InvalidQuery(
                "update_all needs at least one assignment".to_string(),
            ));
        }
        self.validate()?;
        if self.short_circuits() {
            return Ok(());
        }

        let targets = self.resolve_targets(false).await?;
        self.write_targets(writer, &Operation::Update(assignments), targets)
            .await
    }

    /// Delete every matching row; `TRUNCATE` when the scope is unrestricted.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses, or the execute error.
    pub async fn delete_all(&self) -> Result<()> {
        let mut keyspace = self.keyspace.clone();
        self.delete_all_into(&mut keyspace).await
    }

    /// [`Self::delete_all`], writing through `writer` (e.g. a batch).
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses, or the writer's error.
    pub async fn delete_all_into(&self, writer: &mut dyn Writer) -> Result<()> {
        self.validate()?;
        if self.short_circuits() {
            return Ok(());
        }

        let targets = self.resolve_targets(true).await?;
        self.write_targets(writer, &Operation::Delete(Vec::new()), targets)
            .await
    }

    /// Load every matching row, delete each by key, and hand the rows back so
    /// the caller can run its own callbacks on them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses, or the execute error.
    pub async fn destroy_all(&self) -> Result<Vec<Row>> {
        let mut keyspace = self.keyspace.clone();
        self.destroy_all_into(&mut keyspace).await
    }

    /// [`Self::destroy_all`], writing the deletes through `writer`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for illegal clauses, or the writer's error.
    pub async fn destroy_all_into(&self, writer: &mut dyn Writer) -> Result<Vec<Row>> {
        let scope = if self.clauses.columns().is_empty() {
            self.clone()
        } else {
            self.clone().select([self.key.clone()])
        };
        let rows = scope.all().await?;

        let operation = Operation::Delete(Vec::new());
        for row in &rows {
            if let Some(key) = row.get(&self.key) {
                writer
                    .write(self.render_keyed(&operation, vec![key.clone()]))
                    .await?;
            }
        }
        Ok(rows)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Reject clause combinations the server would refuse or that need no query.
    fn validate(&self) -> Result<()> {
        let columns = self.clauses.columns();
        if columns.is_empty() || !self.clauses.restricts(&self.key) {
            return Ok(());
        }

        if columns.len() == 1 && columns[0] == self.key {
            return Err(PersistenceError::InvalidQuery(format!(
                "selecting only key column {} while restricting it",
                self.key
            )));
        }
        if !columns.contains(&self.key) {
            return Err(PersistenceError::InvalidQuery(format!(
                "key column {} must be selected when restricting it",
                self.key
            )));
        }
        Ok(())
    }

    fn short_circuits(&self) -> bool {
        let empty = self.clauses.has_empty_in();
        if empty {
            debug!(table = %self.table, "Empty IN restriction, skipping query");
        }
        empty
    }

    async fn stream_rows<F>(&self, clauses: &ClauseSet, mut f: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        let limit = clauses.limit().map(|l| l.get() as usize);
        let mut yielded = 0;

        for clauses in fan_out(clauses) {
            if limit.is_some_and(|l| yielded >= l) {
                break;
            }
            let statement = render(&Operation::Select, &self.table, &clauses);
            for row in self.keyspace.execute(&statement).await? {
                if limit.is_some_and(|l| yielded >= l) {
                    break;
                }
                f(row);
                yielded += 1;
            }
        }
        Ok(())
    }

    async fn resolve_targets(&self, allow_truncate: bool) -> Result<Targets> {
        if self.clauses.predicates().is_empty() && allow_truncate {
            return Ok(Targets::Everything);
        }
        if self.clauses.only_restricts(&self.key) {
            return Ok(Targets::Scoped(self.scoped_keys()));
        }

        let mut clauses = self.clauses.clone();
        clauses.replace(Clause::Select(vec![self.key.clone()]));
        let mut keys = Vec::new();
        self.stream_rows(&clauses, |row| {
            if let Some(key) = row.get(&self.key) {
                keys.push(key.clone());
            }
        })
        .await?;
        debug!(table = %self.table, keys = keys.len(), "Materialized write targets");
        Ok(Targets::Materialized(keys))
    }

    async fn write_targets(
        &self,
        writer: &mut dyn Writer,
        operation: &Operation,
        targets: Targets,
    ) -> Result<()> {
        match targets {
            Targets::Everything => {
                let statement = render(&Operation::Truncate, &self.table, &ClauseSet::new());
                writer.write(statement).await
            }
            Targets::Scoped(keys) if keys.is_empty() => Ok(()),
            Targets::Scoped(keys) => writer.write(self.render_keyed(operation, keys)).await,
            Targets::Materialized(keys) => {
                for key in keys {
                    writer.write(self.render_keyed(operation, vec![key])).await?;
                }
                Ok(())
            }
        }
    }

    /// Keys allowed by every key predicate, in the first predicate's order.
    fn scoped_keys(&self) -> Vec<CqlValue> {
        let mut sets = self
            .clauses
            .predicates()
            .iter()
            .filter_map(|p| p.restricted_values(&self.key));
        let Some(first) = sets.next() else {
            return Vec::new();
        };
        let rest: Vec<Vec<CqlValue>> = sets.collect();
        first
            .into_iter()
            .filter(|key| rest.iter().all(|set| set.contains(key)))
            .collect()
    }

    fn render_keyed(&self, operation: &Operation, keys: Vec<CqlValue>) -> Statement {
        let predicate = match <[CqlValue; 1]>::try_from(keys) {
            Ok([key]) => Predicate::eq(self.key.clone(), key),
            Err(keys) => Predicate::is_in(self.key.clone(), keys),
        };
        let mut clauses = ClauseSet::new();
        clauses.apply(Clause::Using(self.clauses.using().clone()));
        clauses.apply(Clause::Where(predicate));
        render(operation, &self.table, &clauses)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("table", &self.table)
            .field("key", &self.key)
            .field("clauses", &self.clauses)
            .finish_non_exhaustive()
    }
}

/// Split every multi-valued `IN` into one clause set per value, in value order.
fn fan_out(clauses: &ClauseSet) -> Vec<ClauseSet> {
    let mut pending = vec![clauses.clone()];
    let mut expanded = Vec::new();

    while let Some(set) = pending.pop() {
        let split = set.predicates().iter().enumerate().find_map(|(i, p)| match p {
            Predicate::In { column, values } if values.len() > 1 => {
                Some((i, column.clone(), values.clone()))
            }
            _ => None,
        });

        match split {
            Some((index, column, values)) => {
                for value in values.into_iter().rev() {
                    let mut next = set.clone();
                    next.replace_predicate(index, Predicate::eq(column.clone(), value));
                    pending.push(next);
                }
            }
            None => expanded.push(set),
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Batch, BatchOptions};
    use crate::testing::{keyed, keyspace, row, MockConnection};
    use tokio_test::{assert_err, assert_ok};

    fn posts(conn: &std::sync::Arc<MockConnection>) -> Scope {
        keyspace(conn).table("posts", "id")
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter()
            .filter_map(|r| r.get("id").and_then(CqlValue::as_int))
            .collect()
    }

    // ===== RENDERING =====

    #[test]
    fn test_end_to_end_select() {
        let conn = MockConnection::new();
        let scope = posts(&conn)
            .select(["id", "title"])
            .where_eq("title", "Hey")
            .consistency(Consistency::Quorum)
            .limit(3);

        assert_eq!(
            scope.to_cql(),
            "SELECT id, title FROM posts USING CONSISTENCY QUORUM WHERE title = 'Hey' LIMIT 3"
        );
        assert_eq!(scope.to_cql(), scope.to_cql());
        assert_eq!(conn.calls(), 0);
    }

    #[test]
    fn test_chain_order_does_not_change_rendering() {
        let conn = MockConnection::new();
        let forward = posts(&conn)
            .select(["id"])
            .where_eq("blog", "tech")
            .consistency(Consistency::One)
            .limit(10);
        let backward = posts(&conn)
            .limit(10)
            .consistency(Consistency::One)
            .where_eq("blog", "tech")
            .select(["id"]);

        assert_eq!(forward.to_cql(), backward.to_cql());
    }

    #[test]
    fn test_replacing_chain_methods() {
        let conn = MockConnection::new();
        let scope = posts(&conn)
            .select(["id", "title"])
            .select_only(["body"])
            .where_eq("blog", "tech")
            .where_only(Predicate::eq("blog", "news"))
            .limit(5)
            .limit(0);

        assert_eq!(scope.to_cql(), "SELECT body FROM posts WHERE blog = 'news'");
    }

    #[test]
    fn test_merge_prefers_right_scalars() {
        let conn = MockConnection::new();
        let left = posts(&conn).where_eq("blog", "tech").consistency(Consistency::One);
        let right = posts(&conn).where_eq("author", "ann").consistency(Consistency::All);

        assert_eq!(
            left.merge(&right).to_cql(),
            "SELECT * FROM posts USING CONSISTENCY ALL WHERE blog = 'tech' AND author = 'ann'"
        );
    }

    #[test]
    fn test_raw_fragment_binds_in_order() {
        let conn = MockConnection::new();
        let statement = posts(&conn)
            .where_cql("views > ?", vec![CqlValue::Int(10)])
            .to_statement();

        assert_eq!(statement.cql, "SELECT * FROM posts WHERE views > ?");
        assert_eq!(statement.values, vec![CqlValue::Int(10)]);
    }

    // ===== VALIDATION =====

    #[tokio::test]
    async fn test_key_restriction_requires_key_in_selection() {
        let conn = MockConnection::new();

        let err = assert_err!(posts(&conn).select(["title"]).where_eq("id", 1).all().await);
        assert!(matches!(err, PersistenceError::InvalidQuery(_)));

        let err = assert_err!(posts(&conn).select(["id"]).where_eq("id", 1).all().await);
        assert!(matches!(err, PersistenceError::InvalidQuery(_)));

        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_count_with_key_restriction_fails_fast() {
        let conn = MockConnection::new();
        let err = assert_err!(posts(&conn).where_in("id", [1, 2]).count().await);

        assert!(matches!(err, PersistenceError::InvalidQuery(_)));
        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_in_never_touches_network() {
        let conn = MockConnection::new();
        let scope = posts(&conn).where_in("id", Vec::<i64>::new());

        assert!(assert_ok!(scope.all().await).is_empty());
        assert_eq!(assert_ok!(posts(&conn).where_in("blog", Vec::<&str>::new()).count().await), 0);
        assert!(assert_ok!(scope.none().await));
        assert_ok!(scope.delete_all().await);
        assert_ok!(scope.update_all(vec![("title".into(), "x".into())]).await);
        assert_eq!(conn.calls(), 0);
    }

    // ===== READS =====

    #[tokio::test]
    async fn test_multi_valued_in_fans_out_depth_first() {
        let conn = MockConnection::new();
        posts(&conn)
            .where_in("blog", ["a", "b"])
            .where_in("tag", [1, 2])
            .all()
            .await
            .unwrap();

        assert_eq!(
            conn.cql(),
            [
                "SELECT * FROM posts WHERE blog = 'a' AND tag = 1",
                "SELECT * FROM posts WHERE blog = 'a' AND tag = 2",
                "SELECT * FROM posts WHERE blog = 'b' AND tag = 1",
                "SELECT * FROM posts WHERE blog = 'b' AND tag = 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_fan_out_stops_at_limit() {
        let conn = MockConnection::new();
        conn.push_rows(keyed(&[1, 2]));
        conn.push_rows(keyed(&[3, 4]));

        let rows = posts(&conn)
            .where_in("blog", ["a", "b", "c"])
            .limit(3)
            .all()
            .await
            .unwrap();

        assert_eq!(ids(&rows), [1, 2, 3]);
        assert_eq!(conn.calls(), 2);
        assert!(conn.cql().iter().all(|cql| cql.ends_with("LIMIT 3")));
    }

    #[tokio::test]
    async fn test_execute_error_reaches_caller_unchanged() {
        let conn = MockConnection::new();
        conn.push_error(PersistenceError::Connection("broken pipe".into()));

        let err = assert_err!(posts(&conn).all().await);
        assert_eq!(err, PersistenceError::Connection("broken pipe".into()));
    }

    #[tokio::test]
    async fn test_first_one_and_any() {
        let conn = MockConnection::new();
        conn.push_rows(keyed(&[1]));
        let first = posts(&conn).first().await.unwrap();
        assert_eq!(first.and_then(|r| r.get("id").cloned()), Some(CqlValue::Int(1)));
        assert_eq!(conn.cql(), ["SELECT * FROM posts LIMIT 1"]);

        conn.push_rows(keyed(&[1, 2]));
        assert!(!posts(&conn).one().await.unwrap());
        conn.push_rows(keyed(&[1]));
        assert!(posts(&conn).one().await.unwrap());
        assert_eq!(conn.cql()[1], "SELECT * FROM posts LIMIT 2");

        assert!(!posts(&conn).any().await.unwrap());
    }

    #[tokio::test]
    async fn test_count_sums_fanned_out_queries() {
        let conn = MockConnection::new();
        conn.push_rows(vec![row(&[("count", CqlValue::Int(2))])]);
        conn.push_rows(vec![row(&[("count", CqlValue::Int(3))])]);

        let total = posts(&conn).where_in("blog", ["a", "b"]).count().await.unwrap();

        assert_eq!(total, 5);
        assert_eq!(
            conn.cql(),
            [
                "SELECT COUNT(*) FROM posts WHERE blog = 'a'",
                "SELECT COUNT(*) FROM posts WHERE blog = 'b'",
            ]
        );
    }

    #[tokio::test]
    async fn test_find_missing_key_is_not_found() {
        let conn = MockConnection::new();
        let err = assert_err!(posts(&conn).find(7).await);

        assert_eq!(
            err,
            PersistenceError::NotFound {
                table: "posts".into(),
                key: "7".into(),
            }
        );
        assert_eq!(conn.cql(), ["SELECT * FROM posts WHERE id = 7 LIMIT 1"]);
    }

    #[tokio::test]
    async fn test_find_returns_row() {
        let conn = MockConnection::new();
        conn.push_rows(vec![row(&[("id", CqlValue::Int(7)), ("title", "Hey".into())])]);

        let found = posts(&conn).find(7).await.unwrap();
        assert_eq!(found.get("title"), Some(&CqlValue::from("Hey")));
    }

    #[tokio::test]
    async fn test_find_in_batches_pages_by_key_and_drops_repeats() {
        let conn = MockConnection::new();
        conn.push_rows(keyed(&[1, 2]));
        conn.push_rows(keyed(&[2, 3]));
        conn.push_rows(Vec::new());

        let mut batches = Vec::new();
        posts(&conn)
            .find_in_batches(2, |rows| batches.push(ids(&rows)))
            .await
            .unwrap();

        assert_eq!(batches, [vec![1, 2], vec![3]]);
        assert_eq!(
            conn.cql(),
            [
                "SELECT * FROM posts LIMIT 2",
                "SELECT * FROM posts WHERE id > 2 LIMIT 2",
                "SELECT * FROM posts WHERE id > 3 LIMIT 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_find_each_stops_on_short_page() {
        let conn = MockConnection::new();
        conn.push_rows(keyed(&[1, 2, 3]));
        conn.push_rows(keyed(&[4]));

        let mut seen = Vec::new();
        posts(&conn)
            .select(["title"])
            .find_each(3, |row| seen.extend(row.get("id").and_then(CqlValue::as_int)))
            .await
            .unwrap();

        assert_eq!(seen, [1, 2, 3, 4]);
        assert_eq!(conn.calls(), 2);
        assert_eq!(conn.cql()[0], "SELECT title, id FROM posts LIMIT 3");
    }

    #[tokio::test]
    async fn test_find_in_batches_rejects_zero_size() {
        let conn = MockConnection::new();
        let err = assert_err!(posts(&conn).find_in_batches(0, |_| {}).await);

        assert!(matches!(err, PersistenceError::InvalidQuery(_)));
        assert_eq!(conn.calls(), 0);
    }

    // ===== WRITES =====

    #[tokio::test]
    async fn test_delete_all_without_restriction_truncates() {
        let conn = MockConnection::new();
        posts(&conn).delete_all().await.unwrap();

        assert_eq!(conn.cql(), ["TRUNCATE posts"]);
    }

    #[tokio::test]
    async fn test_key_scoped_writes_use_one_statement() {
        let conn = MockConnection::new();
        posts(&conn)
            .where_in("id", [1, 2])
            .update_all(vec![("title".into(), "New".into())])
            .await
            .unwrap();
        posts(&conn).where_eq("id", 3).delete_all().await.unwrap();

        assert_eq!(
            conn.cql(),
            [
                "UPDATE posts SET title = ? WHERE id IN (1, 2)",
                "DELETE FROM posts WHERE id = 3",
            ]
        );
        assert_eq!(conn.executed()[0].values, vec![CqlValue::from("New")]);
    }

    #[tokio::test]
    async fn test_unkeyed_delete_materializes_keys_first() {
        let conn = MockConnection::new();
        conn.push_rows(keyed(&[4, 5]));

        posts(&conn).where_eq("blog", "tech").delete_all().await.unwrap();

        assert_eq!(
            conn.cql(),
            [
                "SELECT id FROM posts WHERE blog = 'tech'",
                "DELETE FROM posts WHERE id = 4",
                "DELETE FROM posts WHERE id = 5",
            ]
        );
    }

    #[tokio::test]
    async fn test_update_carries_scope_using_options() {
        let conn = MockConnection::new();
        posts(&conn)
            .ttl(Duration::from_secs(60))
            .where_eq("id", 1)
            .update_all(vec![("title".into(), "New".into())])
            .await
            .unwrap();

        assert_eq!(
            conn.cql(),
            ["UPDATE posts USING TTL 60 SET title = ? WHERE id = 1"]
        );
    }

    #[tokio::test]
    async fn test_update_all_requires_assignments() {
        let conn = MockConnection::new();
        let err = assert_err!(posts(&conn).where_eq("id", 1).update_all(Vec::new()).await);

        assert!(matches!(err, PersistenceError::InvalidQuery(_)));
        assert_eq!(conn.calls(), 0);
    }

    #[tokio::test]
    async fn test_writes_into_batch_are_buffered() {
        let conn = MockConnection::new();
        let keyspace = keyspace(&conn);
        let scope = keyspace.table("posts", "id").where_in("id", [1, 2]);

        keyspace
            .batch(BatchOptions::default(), async |batch: &mut Batch| {
                scope
                    .update_all_into(batch, vec![("title".into(), "New".into())])
                    .await?;
                scope.delete_all_into(batch).await
            })
            .await
            .unwrap();

        assert_eq!(
            conn.cql(),
            ["BEGIN BATCH\n  UPDATE posts SET title = ? WHERE id IN (1, 2);\n  DELETE FROM posts WHERE id IN (1, 2);\nAPPLY BATCH"]
        );
    }

    #[tokio::test]
    async fn test_destroy_all_returns_loaded_rows() {
        let conn = MockConnection::new();
        conn.push_rows(vec![
            row(&[("id", CqlValue::Int(1)), ("title", "a".into())]),
            row(&[("id", CqlValue::Int(2)), ("title", "b".into())]),
        ]);

        let destroyed = posts(&conn)
            .where_eq("blog", "tech")
            .destroy_all()
            .await
            .unwrap();

        assert_eq!(ids(&destroyed), [1, 2]);
        assert_eq!(
            conn.cql(),
            [
                "SELECT * FROM posts WHERE blog = 'tech'",
                "DELETE FROM posts WHERE id = 1",
                "DELETE FROM posts WHERE id = 2",
            ]
        );
    }
}
