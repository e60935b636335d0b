//! Buffer pool: the only path by which pages reach the rest of the engine.
//!
//! `fetch_page` takes a page lock for the calling transaction, then returns
//! the cached copy of the page, reading it through its heap file on a miss.
//! Modified pages stay in the pool until their transaction completes: commit
//! writes them back, abort throws them away. Dirty pages and pages someone
//! still holds a handle to are never evicted.

pub mod lru;

use crate::access::Tuple;
use crate::concurrency::{LockManager, LockMode};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::storage::heap_file::HeapFile;
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;
use dashmap::DashMap;
use log::debug;
use lru::{FrameId, LruReplacer};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared handle to a cached page. Holding one pins the page in the pool.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Access a transaction requests on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl From<Permission> for LockMode {
    fn from(permission: Permission) -> Self {
        match permission {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

struct Frame {
    page_id: PageId,
    page: PageRef,
}

#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    files: DashMap<TableId, Arc<HeapFile>>,
    page_table: DashMap<PageId, FrameId>,
    frames: Mutex<HashMap<FrameId, Frame>>,
    replacer: Mutex<LruReplacer>,
    lock_manager: LockManager,
    next_frame_id: AtomicU32,
    max_frames: usize,
}

impl BufferPoolManager {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            inner: Arc::new(BufferPoolInner {
                files: DashMap::new(),
                page_table: DashMap::new(),
                frames: Mutex::new(HashMap::with_capacity(config.pool_pages)),
                replacer: Mutex::new(LruReplacer::new(config.pool_pages)),
                lock_manager: LockManager::new(config.lock_timeout),
                next_frame_id: AtomicU32::new(0),
                max_frames: config.pool_pages,
            }),
        }
    }

    /// Make a heap file's pages reachable through this pool.
    pub fn register_file(&self, file: Arc<HeapFile>) {
        self.inner.files.insert(file.id(), file);
    }

    pub fn file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.inner
            .files
            .get(&table_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DbError::Db(format!("no heap file registered for {}", table_id)))
    }

    /// Lock `page_id` for `tid` with `permission` and return the cached page.
    ///
    /// Blocks while another transaction holds a conflicting lock; fails with
    /// `TransactionAborted` if the wait deadlocks or times out.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<PageRef> {
        self.inner
            .lock_manager
            .acquire(tid, page_id, permission.into())?;

        let mut frames = self.inner.frames.lock();
        if let Some(frame_id) = self.inner.page_table.get(&page_id).map(|e| *e.value()) {
            if let Some(frame) = frames.get(&frame_id) {
                self.inner.replacer.lock().touch(frame_id);
                return Ok(Arc::clone(&frame.page));
            }
        }

        // Page not in buffer pool, need to load from disk
        let file = self.file(page_id.table_id)?;
        let page = Arc::new(RwLock::new(file.read_page(page_id)?));
        let frame_id = self.get_frame(&mut frames)?;

        frames.insert(
            frame_id,
            Frame {
                page_id,
                page: Arc::clone(&page),
            },
        );
        self.inner.page_table.insert(page_id, frame_id);
        self.inner.replacer.lock().touch(frame_id);

        Ok(page)
    }

    /// Give up `tid`'s lock on a page before the transaction ends.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.holds_lock(tid, page_id)
    }

    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        self.inner.lock_manager.lock_mode(tid, page_id)
    }

    /// Insert `tuple` into table `table_id` on behalf of `tid`.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<()> {
        let file = self.file(table_id)?;
        for page in file.insert_tuple(self, tid, tuple)? {
            page.write().mark_dirty(true);
        }
        Ok(())
    }

    /// Delete `tuple` from the table its RecordId points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("tuple has no record id".to_string()))?;
        let file = self.file(record_id.page_id.table_id)?;
        for page in file.delete_tuple(self, tid, tuple)? {
            page.write().mark_dirty(true);
        }
        Ok(())
    }

    /// End `tid`: write back (commit) or drop (abort) the pages it modified,
    /// then release all of its locks.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let lock_manager = &self.inner.lock_manager;
        let result = lock_manager
            .pages_locked_by(tid)
            .into_iter()
            .filter(|&page_id| lock_manager.lock_mode(tid, page_id) == Some(LockMode::Exclusive))
            .try_for_each(|page_id| {
                if commit {
                    self.flush_page(page_id)
                } else {
                    self.discard_dirty_page(page_id);
                    Ok(())
                }
            });

        lock_manager.release_all(tid);
        debug!(
            "{} {}",
            tid,
            if commit { "committed" } else { "aborted" }
        );
        result
    }

    /// Write one cached page back to its file if it is dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let page = {
            let frames = self.inner.frames.lock();
            let Some(frame_id) = self.inner.page_table.get(&page_id).map(|e| *e.value()) else {
                return Ok(());
            };
            match frames.get(&frame_id) {
                Some(frame) => Arc::clone(&frame.page),
                None => return Ok(()),
            }
        };

        let mut page = page.write();
        if page.is_dirty() {
            self.file(page_id.table_id)?.write_page(&page)?;
            page.mark_dirty(false);
        }
        Ok(())
    }

    /// Write every dirty cached page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.inner.page_table.iter().map(|e| *e.key()).collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool without writing it back.
    pub fn discard_page(&self, page_id: PageId) {
        let mut frames = self.inner.frames.lock();
        if let Some((_, frame_id)) = self.inner.page_table.remove(&page_id) {
            frames.remove(&frame_id);
            self.inner.replacer.lock().remove(frame_id);
        }
    }

    fn discard_dirty_page(&self, page_id: PageId) {
        let dirty = {
            let frames = self.inner.frames.lock();
            self.inner
                .page_table
                .get(&page_id)
                .and_then(|e| frames.get(e.value()).map(|f| f.page.read().is_dirty()))
                .unwrap_or(false)
        };
        if dirty {
            self.discard_page(page_id);
        }
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.inner.frames.lock().len()
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.page_table.contains_key(&page_id)
    }

    fn get_frame(&self, frames: &mut HashMap<FrameId, Frame>) -> Result<FrameId> {
        // Try to allocate new frame if under limit
        if frames.len() < self.inner.max_frames {
            return Ok(self.inner.next_frame_id.fetch_add(1, Ordering::SeqCst));
        }

        // Need to evict a clean frame nobody holds a handle to
        let victim = self.inner.replacer.lock().evict(|frame_id| {
            frames.get(&frame_id).is_some_and(|frame| {
                Arc::strong_count(&frame.page) == 1 && !frame.page.read().is_dirty()
            })
        });
        let frame_id = victim.ok_or(DbError::BufferPoolFull)?;

        if let Some(frame) = frames.remove(&frame_id) {
            debug!("evicting {} from frame {}", frame.page_id, frame_id);
            self.inner.page_table.remove(&frame.page_id);
        }
        Ok(frame_id)
    }
}
