//! pagedb: an embedded storage and query-execution engine.
//!
//! Tables are heap files of fixed-size slotted pages, reached through a
//! buffer pool that also takes page-level locks on behalf of transactions.
//! Queries are trees of pull-based executors (scan, filter, nested-loop
//! join, aggregation).

pub mod access;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod executor;
pub mod storage;
pub mod transaction;

pub use config::DbConfig;
pub use error::{DbError, ErrorKind, Result};
