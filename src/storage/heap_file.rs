//! Heap file: one table stored as a flat sequence of slotted pages.
//!
//! Page `n` lives at byte offset `n * page_size`. There is no file header;
//! the page count is always derived from the current file length.

use crate::access::{Schema, Tuple};
use crate::config::DbConfig;
use crate::error::{DbError, Result};
use crate::storage::buffer::{BufferPoolManager, PageRef, Permission};
use crate::storage::page::{HeapPage, PageId, TableId};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct HeapFile {
    path: PathBuf,
    file: Mutex<File>,
    schema: Arc<Schema>,
    table_id: TableId,
    page_size: usize,
}

impl HeapFile {
    /// Open the heap file at `path`, creating an empty one if it is missing.
    pub fn open(path: &Path, schema: Arc<Schema>, config: &DbConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file, schema, config)
    }

    /// Create an empty heap file at `path`, discarding any previous contents.
    pub fn create(path: &Path, schema: Arc<Schema>, config: &DbConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(path, file, schema, config)
    }

    fn from_file(path: &Path, file: File, schema: Arc<Schema>, config: &DbConfig) -> Result<Self> {
        // Rejects schemas too wide for the configured page size
        HeapPage::empty(PageId::new(TableId(0), 0), Arc::clone(&schema), config.page_size)?;

        let path = path.canonicalize()?;
        Ok(Self {
            table_id: table_id_for(&path),
            path,
            file: Mutex::new(file),
            schema,
            page_size: config.page_size,
        })
    }

    /// Stable identifier derived from the canonical path of the file.
    pub fn id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages currently in the file.
    pub fn num_pages(&self) -> Result<u32> {
        let len = self.file.lock().metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    /// Read a page straight from disk, bypassing the buffer pool.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        self.check_table(page_id)?;

        let mut data = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            let pages = (file.metadata()?.len() / self.page_size as u64) as u32;
            if page_id.page_no >= pages {
                return Err(DbError::InvalidArgument(format!(
                    "{} is past the end of a {}-page file",
                    page_id, pages
                )));
            }
            file.seek(SeekFrom::Start(self.offset(page_id)))?;
            file.read_exact(&mut data)?;
        }

        HeapPage::from_data(page_id, Arc::clone(&self.schema), data)
    }

    /// Write a page straight to disk at its offset. Writing the page just past
    /// the end grows the file.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.id();
        self.check_table(page_id)?;
        if page.page_size() != self.page_size {
            return Err(DbError::InvalidArgument(format!(
                "page of {} bytes written to a file of {}-byte pages",
                page.page_size(),
                self.page_size
            )));
        }

        let mut file = self.file.lock();
        let pages = (file.metadata()?.len() / self.page_size as u64) as u32;
        if page_id.page_no > pages {
            return Err(DbError::InvalidArgument(format!(
                "{} would leave a gap after page {}",
                page_id, pages
            )));
        }
        file.seek(SeekFrom::Start(self.offset(page_id)))?;
        file.write_all(page.data())?;
        file.flush()?;
        Ok(())
    }

    /// Grow the file by one all-zero page and return its id.
    fn append_empty_page(&self) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_no = (file.metadata()?.len() / self.page_size as u64) as u32;
        let page_id = PageId::new(self.table_id, page_no);

        file.seek(SeekFrom::Start(self.offset(page_id)))?;
        file.write_all(&HeapPage::empty_page_data(self.page_size))?;
        file.flush()?;

        debug!("appended {} to {}", page_id, self.path.display());
        Ok(page_id)
    }

    /// Insert `tuple` into the first page with a free slot, appending a page
    /// when all are full. Returns the page that was modified.
    pub fn insert_tuple(
        &self,
        pool: &BufferPoolManager,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if !tuple.schema().same_types(&self.schema) {
            return Err(DbError::SchemaMismatch {
                expected: self.schema.to_string(),
                actual: tuple.schema().to_string(),
            });
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let held_before = pool.holds_lock(tid, page_id);

            let has_room = pool
                .fetch_page(tid, page_id, Permission::ReadOnly)?
                .read()
                .num_empty_slots()
                > 0;
            if !has_room {
                if !held_before {
                    pool.release_page(tid, page_id);
                }
                continue;
            }

            let page = pool.fetch_page(tid, page_id, Permission::ReadWrite)?;
            let inserted = page.write().insert_tuple(tuple);
            match inserted {
                Ok(_) => return Ok(vec![page]),
                Err(DbError::PageFull(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        let page_id = self.append_empty_page()?;
        let page = pool.fetch_page(tid, page_id, Permission::ReadWrite)?;
        page.write().insert_tuple(tuple)?;
        Ok(vec![page])
    }

    /// Delete `tuple` from the slot its RecordId names. Returns the page that
    /// was modified.
    pub fn delete_tuple(
        &self,
        pool: &BufferPoolManager,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::Db("tuple has no record id".to_string()))?;
        let page_id = record_id.page_id;
        if page_id.table_id != self.table_id || page_id.page_no >= self.num_pages()? {
            return Err(DbError::RecordNotFound(record_id));
        }

        let page = pool.fetch_page(tid, page_id, Permission::ReadWrite)?;
        page.write().delete_tuple(record_id)?;
        Ok(vec![page])
    }

    /// Cursor over every tuple of the file, page by page.
    pub fn iterator(
        self: &Arc<Self>,
        pool: &BufferPoolManager,
        tid: TransactionId,
    ) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool: pool.clone(),
            tid,
            page_no: 0,
            page: None,
            next_slot: 0,
        }
    }

    fn check_table(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id != self.table_id {
            return Err(DbError::InvalidArgument(format!(
                "{} does not belong to {}",
                page_id, self.table_id
            )));
        }
        Ok(())
    }

    fn offset(&self, page_id: PageId) -> u64 {
        page_id.page_no as u64 * self.page_size as u64
    }
}

fn table_id_for(canonical: &Path) -> TableId {
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    TableId(hasher.finish() as u32)
}

/// Scan position within a heap file: a page number plus a slot within it.
///
/// The page count is re-read from the file whenever the cursor moves to a
/// new page, so pages appended mid-scan are visited.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: BufferPoolManager,
    tid: TransactionId,
    page_no: u32,
    page: Option<PageRef>,
    next_slot: usize,
}

impl HeapFileIterator {
    pub fn file(&self) -> &Arc<HeapFile> {
        &self.file
    }

    /// Next stored tuple, or `None` after the last slot of the last page.
    pub fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        loop {
            let page = match &self.page {
                Some(page) => Arc::clone(page),
                None => {
                    if self.page_no >= self.file.num_pages()? {
                        return Ok(None);
                    }
                    let page_id = PageId::new(self.file.id(), self.page_no);
                    let page = self.pool.fetch_page(self.tid, page_id, Permission::ReadOnly)?;
                    self.page = Some(Arc::clone(&page));
                    self.next_slot = 0;
                    page
                }
            };

            let guard = page.read();
            if let Some(slot) = guard.next_used_slot(self.next_slot) {
                self.next_slot = slot + 1;
                return guard.tuple_at(slot).map(Some);
            }
            drop(guard);

            self.page = None;
            self.page_no += 1;
        }
    }

    /// Move back to the first slot of page 0.
    pub fn rewind(&mut self) {
        self.page_no = 0;
        self.page = None;
        self.next_slot = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::from_types(&[DataType::Int32]))
    }

    fn tiny_config() -> DbConfig {
        // 16-byte pages hold three 4-byte ints
        DbConfig::new().with_page_size(16).with_pool_pages(256)
    }

    fn int_tuple(n: i32) -> Tuple {
        Tuple::new(int_schema(), vec![Value::Int32(n)]).unwrap()
    }

    fn scan(
        file: &Arc<HeapFile>,
        pool: &BufferPoolManager,
        tid: TransactionId,
    ) -> Result<Vec<Tuple>> {
        let mut iter = file.iterator(pool, tid);
        let mut tuples = Vec::new();
        while let Some(tuple) = iter.next_tuple()? {
            tuples.push(tuple);
        }
        Ok(tuples)
    }

    fn ints(tuples: &[Tuple]) -> Vec<i32> {
        tuples.iter().filter_map(|t| t.values()[0].as_i32()).collect()
    }

    fn setup(dir: &Path) -> anyhow::Result<(Arc<HeapFile>, BufferPoolManager)> {
        let config = tiny_config();
        let file = Arc::new(HeapFile::create(&dir.join("t.dat"), int_schema(), &config)?);
        let pool = BufferPoolManager::new(&config);
        pool.register_file(Arc::clone(&file));
        Ok((file, pool))
    }

    #[test]
    fn test_table_id_is_stable_across_opens() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.dat");
        let config = tiny_config();

        let a = HeapFile::create(&path, int_schema(), &config)?;
        let b = HeapFile::open(&path, int_schema(), &config)?;
        // Same file through a different spelling of the path
        let c = HeapFile::open(&dir.path().join(".").join("t.dat"), int_schema(), &config)?;
        let other = HeapFile::create(&dir.path().join("u.dat"), int_schema(), &config)?;

        assert_eq!(a.id(), b.id());
        assert_eq!(a.id(), c.id());
        assert_ne!(a.id(), other.id());
        Ok(())
    }

    #[test]
    fn test_schema_too_wide_for_page() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let schema = Arc::new(Schema::from_types(&[DataType::Char]));
        let result = HeapFile::create(&dir.path().join("t.dat"), schema, &tiny_config());
        assert!(matches!(result, Err(DbError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_read_write_page() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, _pool) = setup(dir.path())?;
        assert_eq!(file.num_pages()?, 0);

        let mut page = HeapPage::empty(PageId::new(file.id(), 0), int_schema(), 16)?;
        page.insert_tuple(&mut int_tuple(11))?;
        file.write_page(&page)?;
        assert_eq!(file.num_pages()?, 1);

        let read = file.read_page(PageId::new(file.id(), 0))?;
        assert_eq!(read.data(), page.data());

        assert!(file.read_page(PageId::new(file.id(), 1)).is_err());
        assert!(file.read_page(PageId::new(TableId(file.id().0.wrapping_add(1)), 0)).is_err());

        let gap = HeapPage::empty(PageId::new(file.id(), 5), int_schema(), 16)?;
        assert!(file.write_page(&gap).is_err());
        Ok(())
    }

    #[test]
    fn test_truncated_file_ignores_partial_page() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("t.dat");
        std::fs::write(&path, [0u8; 20])?;

        let file = HeapFile::open(&path, int_schema(), &tiny_config())?;
        assert_eq!(file.num_pages()?, 1);
        Ok(())
    }

    #[test]
    fn test_first_fit_insert_and_append() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let tid = TransactionId::new(1);

        for n in 1..=3 {
            let mut tuple = int_tuple(n);
            file.insert_tuple(&pool, tid, &mut tuple)?;
            assert_eq!(tuple.record_id().map(|r| r.page_id.page_no), Some(0));
        }
        assert_eq!(file.num_pages()?, 1);

        let mut fourth = int_tuple(4);
        let modified = file.insert_tuple(&pool, tid, &mut fourth)?;
        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].read().id(), PageId::new(file.id(), 1));
        assert_eq!(file.num_pages()?, 2);

        assert_eq!(ints(&scan(&file, &pool, tid)?), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_delete_frees_slot_for_reuse() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let tid = TransactionId::new(1);

        for n in 1..=4 {
            file.insert_tuple(&pool, tid, &mut int_tuple(n))?;
        }
        let two = scan(&file, &pool, tid)?
            .into_iter()
            .find(|t| t.values()[0] == Value::Int32(2))
            .ok_or_else(|| anyhow::anyhow!("tuple 2 missing"))?;
        file.delete_tuple(&pool, tid, &two)?;

        let mut five = int_tuple(5);
        file.insert_tuple(&pool, tid, &mut five)?;
        assert_eq!(five.record_id(), two.record_id());
        assert_eq!(file.num_pages()?, 2);
        assert_eq!(ints(&scan(&file, &pool, tid)?), vec![1, 5, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_delete_errors() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let tid = TransactionId::new(1);

        assert!(matches!(
            file.delete_tuple(&pool, tid, &int_tuple(1)),
            Err(DbError::Db(_))
        ));

        let mut tuple = int_tuple(1);
        file.insert_tuple(&pool, tid, &mut tuple)?;
        file.delete_tuple(&pool, tid, &tuple)?;
        assert!(matches!(
            file.delete_tuple(&pool, tid, &tuple),
            Err(DbError::RecordNotFound(_))
        ));

        let foreign = int_tuple(1).with_record_id(crate::access::RecordId::new(
            PageId::new(TableId(file.id().0.wrapping_add(1)), 0),
            0,
        ));
        assert!(matches!(
            file.delete_tuple(&pool, tid, &foreign),
            Err(DbError::RecordNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_insert_rejects_wrong_schema() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let schema = Arc::new(Schema::from_types(&[DataType::Int32, DataType::Int32]));
        let mut tuple = Tuple::new(schema, vec![Value::Int32(1), Value::Int32(2)])?;

        let result = file.insert_tuple(&pool, TransactionId::new(1), &mut tuple);
        assert!(matches!(result, Err(DbError::SchemaMismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_iterator_sees_appended_pages_and_rewinds() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let tid = TransactionId::new(1);

        let mut iter = file.iterator(&pool, tid);
        assert!(iter.next_tuple()?.is_none());

        for n in 0..7 {
            file.insert_tuple(&pool, tid, &mut int_tuple(n))?;
        }
        iter.rewind();
        let mut seen = Vec::new();
        while let Some(tuple) = iter.next_tuple()? {
            seen.push(tuple.values()[0].as_i32());
        }
        assert_eq!(seen.len(), 7);
        assert_eq!(file.num_pages()?, 3);
        Ok(())
    }

    #[test]
    fn test_scan_count_matches_occupied_slots() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let (file, pool) = setup(dir.path())?;
        let tid = TransactionId::new(1);
        let mut rng = StdRng::seed_from_u64(7);
        let mut live: Vec<Tuple> = Vec::new();

        for step in 0..200 {
            if live.is_empty() || rng.gen_bool(0.6) {
                let mut tuple = int_tuple(step);
                file.insert_tuple(&pool, tid, &mut tuple)?;
                live.push(tuple);
            } else {
                let victim = live.swap_remove(rng.gen_range(0..live.len()));
                file.delete_tuple(&pool, tid, &victim)?;
            }

            if step % 25 == 0 {
                let occupied: usize = (0..file.num_pages()?)
                    .map(|n| {
                        let page_id = PageId::new(file.id(), n);
                        let page = pool.fetch_page(tid, page_id, Permission::ReadOnly)?;
                        let page = page.read();
                        Ok(page.num_slots() - page.num_empty_slots())
                    })
                    .sum::<Result<usize>>()?;
                let scanned = scan(&file, &pool, tid)?.len();
                assert_eq!(scanned, occupied);
                assert_eq!(scanned, live.len());
            }
        }
        Ok(())
    }
}
