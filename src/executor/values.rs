//! In-memory tuple source.

use crate::access::{Schema, Tuple};
use crate::error::{DbError, Result};
use crate::executor::{Cursor, Operator};
use std::sync::Arc;

/// Executor that replays a fixed list of tuples
pub struct ValuesExecutor {
    schema: Arc<Schema>,
    tuples: Vec<Tuple>,
    position: usize,
    cursor: Cursor,
}

impl ValuesExecutor {
    /// Every tuple must have the column types of `schema`.
    pub fn new(schema: Arc<Schema>, tuples: Vec<Tuple>) -> Result<Self> {
        if let Some(bad) = tuples.iter().find(|t| !t.schema().same_types(&schema)) {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                actual: bad.schema().to_string(),
            });
        }

        Ok(Self {
            schema,
            tuples,
            position: 0,
            cursor: Cursor::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }
}

impl Operator for ValuesExecutor {
    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn open_operator(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let tuple = self.tuples.get(self.position).cloned();
        if tuple.is_some() {
            self.position += 1;
        }
        Ok(tuple)
    }

    fn rewind_operator(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    fn close_operator(&mut self) {
        self.position = 0;
    }
}
