mod file;
mod scan;

pub use file::HeapFile;
pub use scan::HeapScan;

use std::sync::Arc;

use crate::buffer::{BufferPool, PageRef};
use crate::error::DbResult;
use crate::file::{PageId, PageNo, TableId};
use crate::record::{HeapPage, Record, TableSchema};
use crate::transaction::TransactionId;

/// An on-disk table the buffer pool can load pages from and flush pages to.
///
/// Tuple insert and delete take the pool as an argument: the store fetches
/// the pages it needs through it, so every access is locked, and returns the
/// pages it mutated.
pub trait PageStore: Send + Sync {
    fn table_id(&self) -> TableId;

    fn schema(&self) -> &Arc<TableSchema>;

    /// Read a page straight from disk. Pages past the end of the file are an error.
    fn read_page(&self, pid: PageId) -> DbResult<HeapPage>;

    /// Overwrite the on-disk slot of `page`
    fn write_page(&self, page: &HeapPage) -> DbResult<()>;

    fn page_count(&self) -> DbResult<PageNo>;

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: &mut Record,
    ) -> DbResult<Vec<PageRef>>;

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: &mut Record,
    ) -> DbResult<Vec<PageRef>>;

    /// Flush OS buffers for the underlying file
    fn sync(&self) -> DbResult<()>;
}
