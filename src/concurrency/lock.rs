//! Page-level lock management.
//!
//! Transactions take shared locks to read a page and exclusive locks to
//! modify it. Locks are held until the transaction completes. A waiter is
//! aborted when its wait would close a cycle in the wait-for graph, or when
//! it has waited longer than the configured timeout.

use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// True if holding `self` already grants `requested`.
    fn covers(&self, requested: LockMode) -> bool {
        *self == LockMode::Exclusive || requested == LockMode::Shared
    }
}

/// Outstanding lock requests: waiter -> the page and mode it is blocked on.
///
/// Edges of the wait-for graph are derived from the live lock table on each
/// check.
#[derive(Debug, Default)]
struct DeadlockDetector {
    waiting: HashMap<TransactionId, (PageId, LockMode)>,
}

impl DeadlockDetector {
    fn wait(&mut self, waiter: TransactionId, page_id: PageId, mode: LockMode) {
        self.waiting.insert(waiter, (page_id, mode));
    }

    fn stop_waiting(&mut self, waiter: TransactionId) {
        self.waiting.remove(&waiter);
    }

    fn request_of(&self, tid: TransactionId) -> Option<(PageId, LockMode)> {
        self.waiting.get(&tid).copied()
    }
}

#[derive(Debug, Default)]
struct LockTable {
    /// page -> holders and the mode each one holds
    holders: HashMap<PageId, HashMap<TransactionId, LockMode>>,
    /// transaction -> pages it holds a lock on
    held: HashMap<TransactionId, HashSet<PageId>>,
    detector: DeadlockDetector,
}

impl LockTable {
    /// Transactions whose locks on `page_id` conflict with the request.
    fn blockers(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Vec<TransactionId> {
        let Some(holders) = self.holders.get(&page_id) else {
            return Vec::new();
        };
        if holders.get(&tid).is_some_and(|held| held.covers(mode)) {
            return Vec::new();
        }
        holders
            .iter()
            .filter(|(holder, held)| **holder != tid && !held.is_compatible_with(&mode))
            .map(|(holder, _)| *holder)
            .collect()
    }

    fn grant(&mut self, tid: TransactionId, page_id: PageId, mode: LockMode) {
        let holders = self.holders.entry(page_id).or_default();
        let entry = holders.entry(tid).or_insert(mode);
        if !entry.covers(mode) {
            *entry = mode;
        }
        self.held.entry(tid).or_default().insert(page_id);
    }

    /// Would `waiter` waiting on `blockers` close a cycle in the wait-for
    /// graph?
    fn would_cause_deadlock(&self, waiter: TransactionId, blockers: &[TransactionId]) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = blockers.iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if current == waiter {
                return true;
            }

            if visited.insert(current) {
                if let Some((page_id, mode)) = self.detector.request_of(current) {
                    queue.extend(self.blockers(current, page_id, mode));
                }
            }
        }

        false
    }

    fn release(&mut self, tid: TransactionId, page_id: PageId) {
        if let Some(holders) = self.holders.get_mut(&page_id) {
            holders.remove(&tid);
            if holders.is_empty() {
                self.holders.remove(&page_id);
            }
        }
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }
    }
}

/// Lock manager keyed by page.
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Block until `tid` holds `mode` on `page_id`.
    ///
    /// A sole shared holder is upgraded in place when it asks for exclusive.
    /// Fails with `TransactionAborted` on deadlock or timeout.
    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();

        loop {
            let blockers = table.blockers(tid, page_id, mode);
            if blockers.is_empty() {
                table.detector.stop_waiting(tid);
                table.grant(tid, page_id, mode);
                return Ok(());
            }

            if table.would_cause_deadlock(tid, &blockers) {
                table.detector.stop_waiting(tid);
                warn!("{} aborted: deadlock waiting for {:?} on {}", tid, mode, page_id);
                return Err(DbError::TransactionAborted(tid));
            }

            if Instant::now() >= deadline {
                table.detector.stop_waiting(tid);
                warn!("{} aborted: timed out waiting for {:?} on {}", tid, mode, page_id);
                return Err(DbError::TransactionAborted(tid));
            }

            table.detector.wait(tid, page_id, mode);
            debug!("{} waits for {:?} on {} held by {:?}", tid, mode, page_id, blockers);
            self.released.wait_until(&mut table, deadline);
        }
    }

    /// Release one lock early, e.g. a page that was only probed.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        self.table.lock().release(tid, page_id);
        self.released.notify_all();
    }

    /// Release every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        {
            let mut table = self.table.lock();
            let pages: Vec<PageId> = table
                .held
                .get(&tid)
                .map(|pages| pages.iter().copied().collect())
                .unwrap_or_default();
            for page_id in pages {
                table.release(tid, page_id);
            }
            table.detector.stop_waiting(tid);
        }
        self.released.notify_all();
    }

    /// The mode `tid` holds on `page_id`, if any.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.table
            .lock()
            .holders
            .get(&page_id)
            .and_then(|holders| holders.get(&tid).copied())
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// Pages `tid` currently holds any lock on, in page order.
    pub fn pages_locked_by(&self, tid: TransactionId) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self
            .table
            .lock()
            .held
            .get(&tid)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default();
        pages.sort();
        pages
    }
}
