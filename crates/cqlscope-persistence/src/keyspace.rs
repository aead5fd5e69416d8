//! Keyspace facade: the single entry point that owns the pooled connection.
//!
//! Every scope and batch holds a cheap clone of a [`Keyspace`]; there is no
//! ambient "current connection".

use async_trait::async_trait;
use cqlscope_domain::{Clause, ClauseSet, Consistency, Statement};
use std::future::Future;
use std::ops::AsyncFnOnce;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::batch::{Batch, BatchOptions};
use crate::config::KeyspaceConfig;
use crate::connection::{Connection, RowSet, SharedConnection};
use crate::error::{PersistenceError, Result};
use crate::scope::Scope;
use crate::strategy::{RetryDecision, RetryPolicy};

/// Destination for rendered write statements: executed now, or buffered.
#[async_trait]
pub trait Writer: Send {
    async fn write(&mut self, statement: Statement) -> Result<()>;
}

/// Handle on a keyspace and its connection pool.
#[derive(Clone)]
pub struct Keyspace {
    inner: Arc<KeyspaceInner>,
}

struct KeyspaceInner {
    connection: SharedConnection,
    permits: Semaphore,
    retry: RetryPolicy,
    default_consistency: Option<Consistency>,
    slowlog_threshold: Option<Duration>,
}

impl Keyspace {
    /// Wrap an existing connection with the given settings.
    pub fn new(connection: SharedConnection, config: &KeyspaceConfig) -> Self {
        Self {
            inner: Arc::new(KeyspaceInner {
                connection,
                permits: Semaphore::new(config.max_in_flight.max(1)),
                retry: config.retry,
                default_consistency: config.default_consistency,
                slowlog_threshold: config.slowlog_threshold,
            }),
        }
    }

    /// Connect to the configured ScyllaDB cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the keyspace does not exist.
    #[cfg(feature = "scylla")]
    pub async fn connect(config: &KeyspaceConfig) -> Result<Self> {
        let connection = crate::connection::ScyllaConnection::new(config.cluster.clone()).await?;
        Ok(Self::new(Arc::new(connection), config))
    }

    /// Start a scope over `table`, whose primary key column is `key`.
    pub fn table(&self, table: impl Into<String>, key: impl Into<String>) -> Scope {
        let mut clauses = ClauseSet::new();
        if let Some(level) = self.inner.default_consistency {
            clauses.apply(Clause::Consistency(level));
        }
        Scope::new(self.clone(), table.into(), key.into(), clauses)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    pub fn default_consistency(&self) -> Option<Consistency> {
        self.inner.default_consistency
    }

    /// Run `f` with a connection handle, holding a pool permit until it finishes.
    ///
    /// The permit is released on every exit path, including errors.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub async fn with_connection<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(SharedConnection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| PersistenceError::Connection("connection pool closed".to_string()))?;
        f(Arc::clone(&self.inner.connection)).await
    }

    /// Execute one statement under the configured retry policy.
    ///
    /// # Errors
    ///
    /// Returns the last error unchanged once the policy gives up.
    pub async fn execute(&self, statement: &Statement) -> Result<RowSet> {
        let retry = &self.inner.retry;
        let mut retries_remaining = retry.max_retries;

        loop {
            debug!(cql = %statement.cql, binds = statement.values.len(), "Executing statement");
            let started = Instant::now();
            let attempt = self
                .with_connection(|conn| async move {
                    conn.execute(&statement.cql, &statement.values).await
                })
                .await;

            let err = match attempt {
                Ok(rows) => {
                    self.log_if_slow(statement, started.elapsed());
                    return Ok(rows);
                }
                Err(err) => err,
            };

            match retry.handle_error(&err, retries_remaining) {
                RetryDecision::Raise => {
                    warn!(error = %err, policy = %retry.policy, "Statement failed");
                    return Err(err);
                }
                RetryDecision::Retry { delay, clear_pool } => {
                    warn!(
                        error = %err,
                        retries_remaining,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Statement failed, retrying"
                    );
                    if clear_pool {
                        if let Err(reset_err) = self.reset().await {
                            warn!(error = %reset_err, "Failed to reset connection pool");
                        }
                    }
                    sleep(delay).await;
                    retries_remaining -= 1;
                }
            }
        }
    }

    /// Discard pooled connections. Holds no permit.
    ///
    /// # Errors
    ///
    /// Propagates the connection's reset failure.
    pub async fn reset(&self) -> Result<()> {
        self.inner.connection.reset().await
    }

    /// Open an explicit batch. Writes pushed into it are buffered until
    /// `apply`, or until the auto-apply threshold is reached.
    pub fn begin_batch(&self, mut options: BatchOptions) -> Batch {
        if options.using.consistency.is_none() {
            options.using.consistency = self.inner.default_consistency;
        }
        Batch::new(self.clone(), options)
    }

    /// Run `f` against a fresh batch and apply it when `f` succeeds.
    ///
    /// When `f` fails, buffered statements are discarded and the error returned.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` or from the final flush.
    pub async fn batch<F, T>(&self, options: BatchOptions, f: F) -> Result<T>
    where
        F: AsyncFnOnce(&mut Batch) -> Result<T>,
    {
        let mut batch = self.begin_batch(options);
        match f(&mut batch).await {
            Ok(value) => {
                batch.apply().await?;
                Ok(value)
            }
            Err(err) => {
                let discarded = batch.discard();
                if discarded > 0 {
                    warn!(discarded, error = %err, "Batch block failed, discarding buffered statements");
                }
                Err(err)
            }
        }
    }

    fn log_if_slow(&self, statement: &Statement, elapsed: Duration) {
        if let Some(threshold) = self.inner.slowlog_threshold {
            if elapsed >= threshold {
                warn!(
                    cql = %statement.cql,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Slow statement"
                );
            }
        }
    }
}

#[async_trait]
impl Writer for Keyspace {
    async fn write(&mut self, statement: Statement) -> Result<()> {
        self.execute(&statement).await.map(|_| ())
    }
}
