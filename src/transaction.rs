//! Transaction identity.
//!
//! A transaction is only a token here. The buffer pool and the lock manager
//! key their bookkeeping by it, and `BufferPoolManager::transaction_complete`
//! ends it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Token identifying one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate an id never handed out before in this process.
    pub fn fresh() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn{}", self.0)
    }
}
