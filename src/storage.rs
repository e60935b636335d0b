//! Storage layer.
//!
//! - **HeapPage**: slotted page, a header bitmap followed by fixed-width slots
//! - **HeapFile**: one table, a flat file of pages
//! - **BufferPool**: page cache that also takes page locks for transactions
//!
//! Executors reach pages through the buffer pool. `HeapFile::read_page` and
//! `write_page` go straight to disk and are meant for the pool and bulk loads.

pub mod buffer;
pub mod heap_file;
pub mod page;

pub use buffer::{BufferPoolManager, PageRef, Permission};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::{HeapPage, PageId, TableId};
