//! Runtime configuration for the engine.

use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_POOL_PAGES: usize = 50;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Knobs shared by heap files and the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbConfig {
    /// Size in bytes of every page, on disk and in memory.
    pub page_size: usize,
    /// Maximum number of pages the buffer pool caches at once.
    pub pool_pages: usize,
    /// How long a transaction waits for a page lock before it is aborted.
    pub lock_timeout: Duration,
}

impl DbConfig {
    pub fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_pages(mut self, pool_pages: usize) -> Self {
        self.pool_pages = pool_pages;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new()
    }
}
