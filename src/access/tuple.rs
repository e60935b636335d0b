use crate::access::schema::Schema;
use crate::access::value::Value;
use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Location of a stored tuple: a page and a slot on it.
///
/// This is a plain value. It stays valid only while the tuple is not deleted;
/// detecting staleness is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_id: u16) -> Self {
        Self { page_id, slot_id }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        // First compare by page_id, then by slot_id
        match self.page_id.cmp(&other.page_id) {
            Ordering::Equal => self.slot_id.cmp(&other.slot_id),
            other => other,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} slot {}", self.page_id, self.slot_id)
    }
}

/// Represents a row in the database
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Build a tuple, checking arity and types against `schema`.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(DbError::SchemaMismatch {
                expected: schema.to_string(),
                actual: format!("{} values", values.len()),
            });
        }
        for (i, value) in values.iter().enumerate() {
            let expected = schema.field_type(i)?;
            if value.data_type() != expected {
                return Err(DbError::SchemaMismatch {
                    expected: expected.to_string(),
                    actual: value.data_type().to_string(),
                });
            }
        }
        Ok(Self {
            schema,
            values,
            record_id: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn value(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "field index {} out of bounds for {} fields",
                index,
                self.values.len()
            ))
        })
    }

    /// Replace one field. The new value must have the column's type.
    pub fn set_value(&mut self, index: usize, value: Value) -> Result<()> {
        let expected = self.schema.field_type(index)?;
        if value.data_type() != expected {
            return Err(DbError::SchemaMismatch {
                expected: expected.to_string(),
                actual: value.data_type().to_string(),
            });
        }
        self.values[index] = value;
        Ok(())
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, record_id: Option<RecordId>) {
        self.record_id = record_id;
    }

    pub fn with_record_id(mut self, record_id: RecordId) -> Self {
        self.record_id = Some(record_id);
        self
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}
