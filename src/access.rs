//! Access layer for tuple-oriented operations.
//!
//! This module provides the logical record types that the storage and
//! executor layers exchange:
//!
//! - **Value / DataType**: fixed-width column values and their types
//! - **Schema**: ordered, typed, named column lists
//! - **Tuple**: individual records, optionally carrying their RecordId

pub mod schema;
pub mod tuple;
pub mod value;

pub use schema::{ColumnInfo, Schema};
pub use tuple::{RecordId, Tuple};
pub use value::{deserialize_values, serialize_values, CompareOp, DataType, Value, CHAR_LEN};
