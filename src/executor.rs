//! Executor layer for query execution.
//!
//! Pull-based iterator model: every operator implements
//! `open / has_next / next / rewind / close / schema`, and plans are trees of
//! boxed executors. Operators only provide the `Operator` hooks; the
//! protocol's state machine (closed, open, failed, one-tuple lookahead) lives
//! in `Cursor` and is shared by all of them through a blanket impl.

use crate::access::{Schema, Tuple};
use crate::error::{DbError, Result};
use std::sync::Arc;

pub mod aggregate;
pub mod filter;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod values;

pub use aggregate::{AggregateExecutor, AggregateFunction, Aggregator, GroupKey};
pub use filter::{FilterExecutor, Predicate};
pub use nested_loop_join::{JoinPredicate, NestedLoopJoinExecutor};
pub use seq_scan::SeqScanExecutor;
pub use values::ValuesExecutor;

/// Trait for all query executors
pub trait Executor: Send {
    /// Prepare the executor (and its children) for reading. A no-op when the
    /// executor is already open.
    fn open(&mut self) -> Result<()>;

    /// Whether another tuple is available. Pulls at most one tuple ahead.
    fn has_next(&mut self) -> Result<bool>;

    /// The next tuple. Fails with `NoMoreElements` once the input is exhausted.
    fn next(&mut self) -> Result<Tuple>;

    /// Restart from the first tuple. Only valid while open.
    fn rewind(&mut self) -> Result<()>;

    /// Drop all local state, then close children.
    fn close(&mut self);

    /// Schema of the produced tuples. Available before `open`.
    fn schema(&self) -> &Arc<Schema>;
}

/// Operator-specific behaviour behind the shared `Executor` protocol.
///
/// `fetch_next` is only ever called while the cursor is open, and `Ok(None)`
/// means the operator is exhausted.
pub trait Operator: Send {
    fn output_schema(&self) -> &Arc<Schema>;

    fn cursor(&mut self) -> &mut Cursor;

    /// Open children first, then set up local state.
    fn open_operator(&mut self) -> Result<()>;

    fn fetch_next(&mut self) -> Result<Option<Tuple>>;

    fn rewind_operator(&mut self) -> Result<()>;

    /// Reset local state first, then close children.
    fn close_operator(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CursorState {
    #[default]
    Closed,
    Open,
    /// A call returned an error; usable again only after close + open.
    Failed,
}

/// Protocol state shared by every operator.
#[derive(Debug, Default)]
pub struct Cursor {
    state: CursorState,
    lookahead: Option<Tuple>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.state == CursorState::Open
    }

    fn check_usable(&self) -> Result<()> {
        match self.state {
            CursorState::Open => Ok(()),
            CursorState::Closed => Err(DbError::IllegalState("executor is not open")),
            CursorState::Failed => Err(DbError::IllegalState(
                "executor failed; close and reopen it",
            )),
        }
    }

    /// Pass `result` through, poisoning the cursor if it is an error.
    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = CursorState::Failed;
            self.lookahead = None;
        }
        result
    }

    fn reset(&mut self) {
        self.state = CursorState::Closed;
        self.lookahead = None;
    }
}

impl<T: Operator> Executor for T {
    fn open(&mut self) -> Result<()> {
        let state = self.cursor().state;
        match state {
            CursorState::Open => return Ok(()),
            CursorState::Failed => self.cursor().check_usable()?,
            CursorState::Closed => {}
        }

        let result = self.open_operator();
        let cursor = self.cursor();
        cursor.record(result)?;
        cursor.state = CursorState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.cursor().check_usable()?;
        if self.cursor().lookahead.is_some() {
            return Ok(true);
        }

        let fetched = self.fetch_next();
        let cursor = self.cursor();
        cursor.lookahead = cursor.record(fetched)?;
        Ok(cursor.lookahead.is_some())
    }

    fn next(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoMoreElements);
        }
        self.cursor().lookahead.take().ok_or(DbError::NoMoreElements)
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor().check_usable()?;
        self.cursor().lookahead = None;
        let result = self.rewind_operator();
        self.cursor().record(result)
    }

    fn close(&mut self) {
        self.cursor().reset();
        self.close_operator();
    }

    fn schema(&self) -> &Arc<Schema> {
        self.output_schema()
    }
}

/// Drain an open executor into a vector.
pub fn collect_tuples(executor: &mut dyn Executor) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while executor.has_next()? {
        tuples.push(executor.next()?);
    }
    Ok(tuples)
}
