//! Nested Loop Join executor implementation.
//!
//! For each tuple of the left (outer) child, the right (inner) child is
//! scanned from the start and every pair satisfying the join predicate is
//! emitted as `[outer fields][inner fields]`. The inner child is rewound
//! whenever the outer side advances.

use crate::access::{CompareOp, Schema, Tuple};
use crate::error::{DbError, Result};
use crate::executor::{Cursor, Executor, Operator};
use std::fmt;
use std::sync::Arc;

/// Compares a field of the outer tuple with a field of the inner tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    left_field: usize,
    op: CompareOp,
    right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: CompareOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn left_field(&self) -> usize {
        self.left_field
    }

    pub fn right_field(&self) -> usize {
        self.right_field
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn matches(&self, left: &Tuple, right: &Tuple) -> Result<bool> {
        let l = left.value(self.left_field)?;
        let r = right.value(self.right_field)?;
        Ok(l.compare(self.op, r))
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "left.{} {} right.{}",
            self.left_field, self.op, self.right_field
        )
    }
}

/// Executor that performs a nested loop join
pub struct NestedLoopJoinExecutor {
    predicate: JoinPredicate,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    /// Left schema followed by right schema
    schema: Arc<Schema>,
    /// Outer tuple currently being matched against the inner side
    outer: Option<Tuple>,
    cursor: Cursor,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        predicate: JoinPredicate,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Result<Self> {
        for (side, field, schema) in [
            ("left", predicate.left_field, left.schema()),
            ("right", predicate.right_field, right.schema()),
        ] {
            if field >= schema.len() {
                return Err(DbError::InvalidArgument(format!(
                    "join on {} field {} of a {}-column input",
                    side,
                    field,
                    schema.len()
                )));
            }
        }

        let schema = Arc::new(Schema::merge(left.schema(), right.schema()));
        Ok(Self {
            predicate,
            left,
            right,
            schema,
            outer: None,
            cursor: Cursor::new(),
        })
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    pub fn left_field_name(&self) -> Result<&str> {
        self.left.schema().field_name(self.predicate.left_field)
    }

    pub fn right_field_name(&self) -> Result<&str> {
        self.right.schema().field_name(self.predicate.right_field)
    }
}

fn join_tuples(schema: &Arc<Schema>, outer: &Tuple, inner: &Tuple) -> Result<Tuple> {
    let values = outer
        .values()
        .iter()
        .chain(inner.values())
        .cloned()
        .collect();
    Tuple::new(Arc::clone(schema), values)
}

impl Operator for NestedLoopJoinExecutor {
    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn open_operator(&mut self) -> Result<()> {
        self.left.open()?;
        self.right.open()?;
        self.outer = None;
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let outer = match self.outer.take() {
                Some(outer) => outer,
                None => {
                    if !self.left.has_next()? {
                        return Ok(None);
                    }
                    self.left.next()?
                }
            };

            while self.right.has_next()? {
                let inner = self.right.next()?;
                if self.predicate.matches(&outer, &inner)? {
                    let joined = join_tuples(&self.schema, &outer, &inner)?;
                    // Keep the outer tuple: the inner scan resumes from here
                    self.outer = Some(outer);
                    return Ok(Some(joined));
                }
            }

            // Inner side exhausted for this outer tuple
            self.right.rewind()?;
        }
    }

    fn rewind_operator(&mut self) -> Result<()> {
        self.outer = None;
        self.left.rewind()?;
        self.right.rewind()
    }

    fn close_operator(&mut self) {
        self.outer = None;
        self.left.close();
        self.right.close();
    }
}
