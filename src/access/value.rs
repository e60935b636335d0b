use crate::error::{DbError, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fmt;

/// Number of payload bytes reserved for every `Char` value.
pub const CHAR_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    /// Fixed-length string: a 4-byte length followed by `CHAR_LEN` bytes.
    Char,
}

impl DataType {
    /// Width in bytes of an encoded value of this type.
    pub fn byte_len(&self) -> usize {
        match self {
            DataType::Int32 => 4,
            DataType::Char => 4 + CHAR_LEN,
        }
    }

    /// Decode one value of this type from the front of `data`.
    pub fn parse(&self, mut data: &[u8]) -> Result<Value> {
        if data.len() < self.byte_len() {
            return Err(DbError::Db(format!(
                "{} needs {} bytes, only {} available",
                self,
                self.byte_len(),
                data.len()
            )));
        }

        match self {
            DataType::Int32 => Ok(Value::Int32(data.read_i32::<LittleEndian>()?)),
            DataType::Char => {
                let len = (data.read_u32::<LittleEndian>()? as usize).min(CHAR_LEN);
                let s = std::str::from_utf8(&data[..len])
                    .map_err(|e| DbError::Db(format!("Invalid string value: {}", e)))?;
                Ok(Value::String(s.to_string()))
            }
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "int32" | "integer" => Ok(DataType::Int32),
            "string" | "char" | "text" => Ok(DataType::Char),
            other => Err(DbError::InvalidArgument(format!("Unknown data type: {}", other))),
        }
    }

    /// Parse a value of this type from its textual form.
    pub fn parse_text(&self, text: &str) -> Result<Value> {
        match self {
            DataType::Int32 => text.trim().parse::<i32>().map(Value::Int32).map_err(|e| {
                DbError::InvalidArgument(format!("Invalid integer '{}': {}", text.trim(), e))
            }),
            DataType::Char => Ok(Value::String(text.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "INT"),
            DataType::Char => write!(f, "STRING"),
        }
    }
}

/// Comparison operators usable in filter and join predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    /// Substring containment for strings, equality for integers.
    Like,
}

impl CompareOp {
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Equals | CompareOp::Like => ordering == Ordering::Equal,
            CompareOp::NotEquals => ordering != Ordering::Equal,
            CompareOp::GreaterThan => ordering == Ordering::Greater,
            CompareOp::GreaterThanOrEq => ordering != Ordering::Less,
            CompareOp::LessThan => ordering == Ordering::Less,
            CompareOp::LessThanOrEq => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Equals => "=",
            CompareOp::NotEquals => "<>",
            CompareOp::GreaterThan => ">",
            CompareOp::GreaterThanOrEq => ">=",
            CompareOp::LessThan => "<",
            CompareOp::LessThanOrEq => "<=",
            CompareOp::Like => "LIKE",
        };
        f.write_str(symbol)
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Int32(i32),
    String(String),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::String(_) => DataType::Char,
        }
    }

    /// Evaluate `self op other`. Values of different types never compare true.
    pub fn compare(&self, op: CompareOp, other: &Value) -> bool {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => op.holds(a.cmp(b)),
            (Value::String(a), Value::String(b)) => match op {
                CompareOp::Like => a.contains(b.as_str()),
                _ => op.holds(a.cmp(b)),
            },
            _ => false,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(n) => Some(*n),
            Value::String(_) => None,
        }
    }

    /// Encode into the front of `buf`, which must be at least `byte_len` long.
    pub fn write_to(&self, mut buf: &mut [u8]) -> Result<()> {
        match self {
            Value::Int32(n) => buf.write_i32::<LittleEndian>(*n)?,
            Value::String(s) => {
                let bytes = truncate_to_char_len(s).as_bytes();
                buf.write_u32::<LittleEndian>(bytes.len() as u32)?;
                buf[..bytes.len()].copy_from_slice(bytes);
                buf[bytes.len()..CHAR_LEN].fill(0);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
        }
    }
}

// Cut at a char boundary so the stored prefix stays valid UTF-8.
fn truncate_to_char_len(s: &str) -> &str {
    if s.len() <= CHAR_LEN {
        return s;
    }
    let mut end = CHAR_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Serialize values according to schema
pub fn serialize_values(values: &[Value], schema: &[DataType]) -> Result<Vec<u8>> {
    let mut data = vec![0u8; schema.iter().map(DataType::byte_len).sum()];
    serialize_values_into(values, schema, &mut data)?;
    Ok(data)
}

/// Serialize values into a caller-provided buffer, e.g. a page slot.
pub fn serialize_values_into(values: &[Value], schema: &[DataType], buf: &mut [u8]) -> Result<()> {
    if values.len() != schema.len() {
        return Err(DbError::SchemaMismatch {
            expected: format!("{} values", schema.len()),
            actual: format!("{} values", values.len()),
        });
    }

    let mut offset = 0;
    for (value, data_type) in values.iter().zip(schema) {
        if value.data_type() != *data_type {
            return Err(DbError::SchemaMismatch {
                expected: data_type.to_string(),
                actual: value.data_type().to_string(),
            });
        }
        value.write_to(&mut buf[offset..offset + data_type.byte_len()])?;
        offset += data_type.byte_len();
    }
    Ok(())
}

/// Deserialize bytes according to schema
pub fn deserialize_values(data: &[u8], schema: &[DataType]) -> Result<Vec<Value>> {
    let mut offset = 0;
    let mut values = Vec::with_capacity(schema.len());
    for data_type in schema {
        let end = offset + data_type.byte_len();
        if end > data.len() {
            return Err(DbError::Db("Data too short for schema".to_string()));
        }
        values.push(data_type.parse(&data[offset..end])?);
        offset = end;
    }
    Ok(values)
}
