//! Sequential scan executor implementation.

use crate::access::{Schema, Tuple};
use crate::error::Result;
use crate::executor::{Cursor, Operator};
use crate::storage::{BufferPoolManager, HeapFile, HeapFileIterator, TableId};
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Executor for sequential table scans.
///
/// Output columns are named `alias.column`; record ids are kept so the
/// tuples can be deleted afterwards.
pub struct SeqScanExecutor {
    alias: String,
    schema: Arc<Schema>,
    iter: HeapFileIterator,
    cursor: Cursor,
}

impl SeqScanExecutor {
    pub fn new(
        pool: &BufferPoolManager,
        tid: TransactionId,
        file: Arc<HeapFile>,
        alias: impl Into<String>,
    ) -> Self {
        let alias = alias.into();
        Self {
            schema: Arc::new(file.schema().with_prefix(&alias)),
            iter: file.iterator(pool, tid),
            alias,
            cursor: Cursor::new(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table_id(&self) -> TableId {
        self.iter.file().id()
    }
}

impl Operator for SeqScanExecutor {
    fn output_schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn cursor(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    fn open_operator(&mut self) -> Result<()> {
        self.iter.rewind();
        Ok(())
    }

    fn fetch_next(&mut self) -> Result<Option<Tuple>> {
        let Some(stored) = self.iter.next_tuple()? else {
            return Ok(None);
        };
        let record_id = stored.record_id();
        let mut tuple = Tuple::new(Arc::clone(&self.schema), stored.into_values())?;
        tuple.set_record_id(record_id);
        Ok(Some(tuple))
    }

    fn rewind_operator(&mut self) -> Result<()> {
        self.iter.rewind();
        Ok(())
    }

    fn close_operator(&mut self) {
        self.iter.rewind();
    }
}
