//! Filter executor implementation.
//!
//! Passes through the child's tuples for which `tuple[field] op operand`
//! holds.

use crate::access::{CompareOp, Schema, Tuple, Value};
use crate::error::{DbError, Result};
use crate::executor::{Cursor, Executor, Operator};
use std::fmt;
use std::sync::Arc;

/// Compares one field of a tuple against a constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    field: usize,
    op: CompareOp,
    operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: Value) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn operand(&self) -> &Value {
        &self.operand
    }

    pub fn matches(&self, tuple: &Tuple) -> Result<bool> {
        Ok(tuple.value(self.field)?.compare(self.op, &self.operand))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {} {} {}", self.field, self.op, self.operand)
    }
}

/// Executor that filters tuples based on a predicate
pub struct FilterExecutor {
    predicate: Predicate,
    child: Box<dyn Executor>,
    cursor: Cursor,
}

impl FilterExecutor {
    pub fn new(predicate: Predicate, child: Box<dyn Executor>) -> Result<Self> {
        let schema = child.schema();
        if predicate.field >= schema.len() {
            return Err(DbError::InvalidArgument(format!(
                "filter on field {} of a {}-column input",
                predicate.field,
                schema.len()
            )));
        }

        Ok(Self {
            predicate,
            child,
            cursor: Cursor::new(),
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Operator for FilterExecutor {
    fn output_schema(&self) -> &Arc<Schema> {
        self.child.schema()
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn open_operator(&mut self) -> Result<()> {
        self.child.open()
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.matches(&tuple)? {
                return Ok(Some(tuple));
            }
        }
        Ok(None)
    }

    fn rewind_operator(&mut self) -> Result<()> {
        self.child.rewind()
    }

    fn close_operator(&mut self) {
        self.child.close();
    }
}
