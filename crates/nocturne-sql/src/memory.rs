//! In-memory driver: canned result sets and a statement log.
//!
//! ```
//! use nocturne_sql::memory::{MemoryCursor, MemoryExecutor};
//! use nocturne_sql::{Column, Cursor, Executor, SqlType, SqlValue};
//!
//! let mut db = MemoryExecutor::new();
//! db.push_result(MemoryCursor::new(
//!     vec![Column::new("ID", SqlType::Integer)],
//!     vec![vec![SqlValue::Int(1)]],
//! ));
//! let mut cursor = db.query("SELECT ID FROM T WHERE X = ?", &[SqlValue::Int(5)]).unwrap();
//! assert!(cursor.next_row().unwrap().is_some());
//! assert_eq!(db.statements()[0].params, vec![SqlValue::Int(5)]);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::cursor::{Cursor, Executor};
use crate::error::{DriverError, DriverResult};
use crate::row::{Column, Row};
use crate::types::SqlValue;

/// Shared view of a [`MemoryCursor`]'s lifecycle, usable after the cursor has
/// been moved elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CursorProbe {
    closed: Arc<AtomicBool>,
    connection_closed: Arc<AtomicBool>,
    advances: Arc<AtomicUsize>,
}

impl CursorProbe {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_connection_closed(&self) -> bool {
        self.connection_closed.load(Ordering::Acquire)
    }

    /// Number of `next_row` calls the cursor has received.
    pub fn advances(&self) -> usize {
        self.advances.load(Ordering::Acquire)
    }
}

/// A cursor over rows held in memory.
#[derive(Debug)]
pub struct MemoryCursor {
    columns: Arc<[Column]>,
    rows: VecDeque<Row>,
    probe: CursorProbe,
}

impl MemoryCursor {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Arc<[Column]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self {
            columns,
            rows,
            probe: CursorProbe::default(),
        }
    }

    /// A cursor with no columns and no rows.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn probe(&self) -> CursorProbe {
        self.probe.clone()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Cursor for MemoryCursor {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> DriverResult<Option<Row>> {
        self.probe.advances.fetch_add(1, Ordering::AcqRel);
        if self.probe.is_closed() {
            return Err(DriverError::CursorClosed);
        }
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.probe.closed.store(true, Ordering::Release);
        self.rows.clear();
        Ok(())
    }

    fn close_connection(&mut self) -> DriverResult<()> {
        self.probe.connection_closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// One statement received by a [`MemoryExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// An executor that records every statement and answers from queues.
///
/// `query` pops the next queued cursor (an empty one if none is queued);
/// `execute` pops the next queued update count (0 if none is queued). A queued
/// failure is returned by whichever call comes next.
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    results: VecDeque<MemoryCursor>,
    update_counts: VecDeque<u64>,
    failures: VecDeque<DriverError>,
    log: Vec<ExecutedStatement>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&mut self, cursor: MemoryCursor) -> &mut Self {
        self.results.push_back(cursor);
        self
    }

    pub fn push_update_count(&mut self, count: u64) -> &mut Self {
        self.update_counts.push_back(count);
        self
    }

    pub fn push_failure(&mut self, error: DriverError) -> &mut Self {
        self.failures.push_back(error);
        self
    }

    /// Every statement received so far, oldest first.
    pub fn statements(&self) -> &[ExecutedStatement] {
        &self.log
    }

    fn record(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<()> {
        self.log.push(ExecutedStatement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Executor for MemoryExecutor {
    type Cursor = MemoryCursor;

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<MemoryCursor> {
        self.record(sql, params)?;
        Ok(self.results.pop_front().unwrap_or_else(MemoryCursor::empty))
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> DriverResult<u64> {
        self.record(sql, params)?;
        Ok(self.update_counts.pop_front().unwrap_or(0))
    }
}
