//! Scripted in-memory connection for unit tests.

use async_trait::async_trait;
use cqlscope_domain::{CqlValue, Statement};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::KeyspaceConfig;
use crate::connection::{Connection, Row, RowSet};
use crate::error::{PersistenceError, Result};
use crate::keyspace::Keyspace;
use crate::strategy::RetryPolicy;

/// Records every statement and replays queued results in order.
/// With nothing queued it answers with `fail_always`'s error, or an empty row set.
#[derive(Default)]
pub struct MockConnection {
    responses: Mutex<VecDeque<Result<RowSet>>>,
    persistent_error: Mutex<Option<PersistenceError>>,
    executed: Mutex<Vec<Statement>>,
    events: Mutex<Vec<&'static str>>,
}

impl MockConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(Ok(RowSet::new(rows)));
    }

    pub fn push_error(&self, err: PersistenceError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn fail_always(&self, err: PersistenceError) {
        *self.persistent_error.lock().unwrap() = Some(err);
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    pub fn cql(&self) -> Vec<String> {
        self.executed().into_iter().map(|s| s.cql).collect()
    }

    pub fn calls(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    pub fn resets(&self) -> usize {
        self.events().iter().filter(|e| **e == "reset").count()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, cql: &str, values: &[CqlValue]) -> Result<RowSet> {
        self.executed
            .lock()
            .unwrap()
            .push(Statement::with_values(cql, values.to_vec()));
        self.events.lock().unwrap().push("execute");

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        match self.persistent_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(RowSet::empty()),
        }
    }

    async fn reset(&self) -> Result<()> {
        self.events.lock().unwrap().push("reset");
        Ok(())
    }
}

pub fn keyspace_with(conn: &Arc<MockConnection>, retry: RetryPolicy) -> Keyspace {
    let config = KeyspaceConfig {
        retry,
        ..KeyspaceConfig::default()
    };
    Keyspace::new(conn.clone(), &config)
}

pub fn keyspace(conn: &Arc<MockConnection>) -> Keyspace {
    keyspace_with(conn, RetryPolicy::raise())
}

pub fn row(columns: &[(&str, CqlValue)]) -> Row {
    columns
        .iter()
        .map(|(name, value)| (*name, value.clone()))
        .collect()
}

pub fn keyed(ids: &[i64]) -> Vec<Row> {
    ids.iter().map(|id| row(&[("id", CqlValue::Int(*id))])).collect()
}
