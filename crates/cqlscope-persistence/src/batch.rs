//! Batch accumulator.
//!
//! Buffers write statements for one unit of work and flushes them as a single
//! `BEGIN BATCH .. APPLY BATCH`. A batch is not a transaction: if a flush fails
//! part way through an auto-applied sequence, partitions already flushed stay
//! applied and the failed partition is dropped.

use async_trait::async_trait;
use cqlscope_domain::{
    render, render_batch, Clause, ClauseSet, CqlValue, Operation, Predicate, Statement,
    UsingOptions,
};
use std::mem;
use std::num::NonZeroUsize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::keyspace::{Keyspace, Writer};

/// Options for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Flush automatically once this many statements are buffered
    pub auto_apply: Option<NonZeroUsize>,
    /// Options rendered on the `BEGIN BATCH` line
    pub using: UsingOptions,
}

impl BatchOptions {
    pub fn auto_apply(count: usize) -> Self {
        Self {
            auto_apply: NonZeroUsize::new(count),
            ..Self::default()
        }
    }
}

/// Ordered buffer of write statements owned by a single unit of work.
pub struct Batch {
    keyspace: Keyspace,
    options: BatchOptions,
    buffer: Vec<Statement>,
    flushes: usize,
}

impl Batch {
    pub(crate) fn new(keyspace: Keyspace, options: BatchOptions) -> Self {
        Self {
            keyspace,
            options,
            buffer: Vec::new(),
            flushes: 0,
        }
    }

    /// Buffer one statement, flushing if the auto-apply threshold is reached.
    ///
    /// # Errors
    ///
    /// Returns the execute error of an auto-apply flush.
    pub async fn push(&mut self, statement: Statement) -> Result<()> {
        self.buffer.push(statement);
        if let Some(threshold) = self.options.auto_apply {
            if self.buffer.len() >= threshold.get() {
                self.flush().await?;
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the execute error of an auto-apply flush.
    pub async fn insert(&mut self, table: &str, row: Vec<(String, CqlValue)>) -> Result<()> {
        let statement = render(&Operation::Insert(row), table, &ClauseSet::new());
        self.push(statement).await
    }

    /// # Errors
    ///
    /// Returns the execute error of an auto-apply flush.
    pub async fn update(
        &mut self,
        table: &str,
        assignments: Vec<(String, CqlValue)>,
        predicate: Predicate,
    ) -> Result<()> {
        let mut clauses = ClauseSet::new();
        clauses.apply(Clause::Where(predicate));
        let statement = render(&Operation::Update(assignments), table, &clauses);
        self.push(statement).await
    }

    /// # Errors
    ///
    /// Returns the execute error of an auto-apply flush.
    pub async fn delete(&mut self, table: &str, predicate: Predicate) -> Result<()> {
        let mut clauses = ClauseSet::new();
        clauses.apply(Clause::Where(predicate));
        let statement = render(&Operation::Delete(Vec::new()), table, &clauses);
        self.push(statement).await
    }

    /// Send everything buffered as one batch statement. No-op when empty.
    ///
    /// # Errors
    ///
    /// Returns the execute error; the flushed statements are not re-buffered.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let statements = mem::take(&mut self.buffer);
        let batch = render_batch(&statements, &self.options.using);
        debug!(statements = statements.len(), flush = self.flushes + 1, "Flushing batch");

        self.keyspace.execute(&batch).await?;
        self.flushes += 1;
        Ok(())
    }

    /// Flush the remainder and close the batch.
    ///
    /// # Errors
    ///
    /// Returns the execute error of the final flush.
    pub async fn apply(mut self) -> Result<()> {
        self.flush().await
    }

    /// Drop buffered statements without executing them, returning how many were dropped.
    pub fn discard(mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Physical batch statements executed so far.
    pub const fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            warn!(pending = self.buffer.len(), "Batch dropped without apply");
        }
    }
}

#[async_trait]
impl Writer for Batch {
    async fn write(&mut self, statement: Statement) -> Result<()> {
        self.push(statement).await
    }
}
