//! Concurrency control module.
//!
//! Page-granularity shared/exclusive locking with deadlock detection and
//! timeouts. The buffer pool takes these locks on behalf of transactions;
//! pages and operators never lock anything themselves.

pub mod lock;

pub use lock::{LockManager, LockMode};
