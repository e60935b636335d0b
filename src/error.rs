//! Error types shared by the storage and execution layers.

use crate::access::RecordId;
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// The three kinds of failure a caller of any storage or query call must be
/// prepared to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failures, missing records, schema violations and the like.
    Operational,
    /// The transaction was chosen as a victim and must be rolled back.
    TransactionAborted,
    /// The caller misused the iterator protocol.
    Protocol,
}

/// Errors that can occur anywhere in the engine.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page is full: {0} has no free slot")]
    PageFull(PageId),

    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("Transaction {0} aborted")]
    TransactionAborted(TransactionId),

    #[error("No more elements")]
    NoMoreElements,

    #[error("Illegal state: {0}")]
    IllegalState(&'static str),

    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Buffer pool is full: every cached page is dirty or pinned")]
    BufferPoolFull,

    #[error("{0}")]
    Db(String),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::TransactionAborted(_) => ErrorKind::TransactionAborted,
            DbError::NoMoreElements | DbError::IllegalState(_) => ErrorKind::Protocol,
            _ => ErrorKind::Operational,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.kind() == ErrorKind::TransactionAborted
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DbError>;
