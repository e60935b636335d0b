//! Tuple schemas: ordered, typed, named column lists.

use crate::access::value::DataType;
use crate::error::{DbError, Result};
use std::fmt;

/// Information about a column in a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of columns a tuple conforms to. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    columns: Vec<ColumnInfo>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    /// Build a schema with generated column names `col0`, `col1`, ...
    pub fn from_types(types: &[DataType]) -> Self {
        Self::new(
            types
                .iter()
                .enumerate()
                .map(|(i, t)| ColumnInfo::new(format!("col{}", i), *t))
                .collect(),
        )
    }

    /// Concatenate two schemas, `a`'s columns first. Repeated names are kept.
    pub fn merge(a: &Schema, b: &Schema) -> Schema {
        Schema::new(a.columns.iter().chain(b.columns.iter()).cloned().collect())
    }

    /// Copy of this schema with every column renamed to `prefix.name`.
    pub fn with_prefix(&self, prefix: &str) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| ColumnInfo::new(format!("{}.{}", prefix, c.name), c.data_type))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Result<&ColumnInfo> {
        self.columns.get(index).ok_or_else(|| {
            DbError::InvalidArgument(format!(
                "column index {} out of bounds for {} columns",
                index,
                self.columns.len()
            ))
        })
    }

    pub fn field_type(&self, index: usize) -> Result<DataType> {
        Ok(self.column(index)?.data_type)
    }

    pub fn field_name(&self, index: usize) -> Result<&str> {
        Ok(&self.column(index)?.name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    /// Width in bytes of one encoded tuple of this schema.
    pub fn byte_size(&self) -> usize {
        self.columns.iter().map(|c| c.data_type.byte_len()).sum()
    }

    /// True when both schemas have the same column types in the same order.
    pub fn same_types(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}({})", column.name, column.data_type)?;
        }
        Ok(())
    }
}
