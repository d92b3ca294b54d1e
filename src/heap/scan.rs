use std::sync::Arc;

use super::PageStore;
use crate::buffer::{BufferPool, Permission};
use crate::error::DbResult;
use crate::file::{PageId, PageNo, TableId};
use crate::record::Record;
use crate::transaction::TransactionId;

/// Iterates every live tuple of a table, page by page.
///
/// Each page is fetched read-only through the buffer pool, so the scanning
/// transaction ends up holding a shared lock on every page it has visited.
/// The first error ends the scan.
pub struct HeapScan<'a> {
    pool: &'a BufferPool,
    store: Arc<dyn PageStore>,
    tid: TransactionId,
    next_page: PageNo,
    current: std::vec::IntoIter<Record>,
    failed: bool,
}

impl<'a> HeapScan<'a> {
    pub fn new(pool: &'a BufferPool, tid: TransactionId, table: TableId) -> DbResult<Self> {
        Ok(Self {
            pool,
            store: pool.store(table)?,
            tid,
            next_page: 0,
            current: Vec::new().into_iter(),
            failed: false,
        })
    }

    pub fn table_id(&self) -> TableId {
        self.store.table_id()
    }

    /// Restart from page 0
    pub fn rewind(&mut self) {
        self.next_page = 0;
        self.current = Vec::new().into_iter();
        self.failed = false;
    }

    /// Load the next page's tuples; `false` once the table is exhausted
    fn advance(&mut self) -> DbResult<bool> {
        if self.next_page >= self.store.page_count()? {
            return Ok(false);
        }

        let pid = PageId::new(self.store.table_id(), self.next_page);
        let page = self.pool.fetch_page(self.tid, pid, Permission::ReadOnly)?;
        let records = page.read().records().collect::<Result<Vec<_>, _>>()?;

        self.next_page += 1;
        self.current = records.into_iter();
        Ok(true)
    }
}

impl Iterator for HeapScan<'_> {
    type Item = DbResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(record) = self.current.next() {
                return Some(Ok(record));
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
