use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::PageStore;
use crate::buffer::{BufferPool, PageRef, Permission};
use crate::error::DbResult;
use crate::file::{PageId, PageNo, PagedFile, TableId};
use crate::record::{HeapPage, Record, RecordError, TableSchema};
use crate::transaction::TransactionId;

/// An unordered table: a paged file of bitmap-slotted heap pages
pub struct HeapFile {
    id: TableId,
    file: PagedFile,
    schema: Arc<TableSchema>,
}

impl HeapFile {
    pub fn create<P: AsRef<Path>>(
        id: TableId,
        path: P,
        page_size: usize,
        schema: Arc<TableSchema>,
    ) -> DbResult<Self> {
        Self::check_fits(&schema, page_size)?;
        let file = PagedFile::create(path, page_size)?;
        Ok(Self { id, file, schema })
    }

    pub fn open<P: AsRef<Path>>(
        id: TableId,
        path: P,
        page_size: usize,
        schema: Arc<TableSchema>,
    ) -> DbResult<Self> {
        Self::check_fits(&schema, page_size)?;
        let file = PagedFile::open(path, page_size)?;
        Ok(Self { id, file, schema })
    }

    fn check_fits(schema: &TableSchema, page_size: usize) -> DbResult<()> {
        if HeapPage::slot_count_for(page_size, schema.record_size()) == 0 {
            return Err(RecordError::RecordTooLarge {
                record_size: schema.record_size(),
                page_size,
            }
            .into());
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn page_size(&self) -> usize {
        self.file.page_size()
    }

    fn check_table(&self, pid: PageId) -> DbResult<()> {
        if pid.table != self.id {
            return Err(RecordError::InvalidRecord(format!(
                "page {pid} does not belong to table {}",
                self.id
            ))
            .into());
        }
        Ok(())
    }

    /// Try to place `record` on an already write-locked page
    fn insert_into(
        &self,
        page: &PageRef,
        tid: TransactionId,
        record: &mut Record,
    ) -> DbResult<bool> {
        let mut guard = page.write();
        if guard.find_free_slot().is_none() {
            return Ok(false);
        }
        guard.insert_record(record)?;
        // Marked under the page lock so the page can never be seen clean
        // (and evicted) between the write and the pool's bookkeeping.
        guard.mark_dirty(Some(tid));
        Ok(true)
    }
}

impl PageStore for HeapFile {
    fn table_id(&self) -> TableId {
        self.id
    }

    fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    fn read_page(&self, pid: PageId) -> DbResult<HeapPage> {
        self.check_table(pid)?;
        let mut data = vec![0u8; self.page_size()];
        self.file.read_page(pid.page_no, &mut data)?;
        Ok(HeapPage::from_bytes(pid, data, Arc::clone(&self.schema))?)
    }

    fn write_page(&self, page: &HeapPage) -> DbResult<()> {
        self.check_table(page.id())?;
        self.file.write_page(page.id().page_no, page.page_data())?;
        Ok(())
    }

    fn page_count(&self) -> DbResult<PageNo> {
        Ok(self.file.page_count()?)
    }

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: &mut Record,
    ) -> DbResult<Vec<PageRef>> {
        self.schema.validate_record(record.values())?;

        for page_no in 0..self.page_count()? {
            let pid = PageId::new(self.id, page_no);
            let page = pool.fetch_page(tid, pid, Permission::ReadWrite)?;
            if self.insert_into(&page, tid, record)? {
                return Ok(vec![page]);
            }
        }

        // Every page is full: grow the file by one zeroed (empty) page
        let page_no = self.file.allocate_page()?;
        let pid = PageId::new(self.id, page_no);
        debug!(%tid, %pid, "extended heap file");

        let page = pool.fetch_page(tid, pid, Permission::ReadWrite)?;
        if !self.insert_into(&page, tid, record)? {
            return Err(RecordError::PageFull(pid).into());
        }
        Ok(vec![page])
    }

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        record: &mut Record,
    ) -> DbResult<Vec<PageRef>> {
        let rid = record.record_id().ok_or(RecordError::MissingRecordId)?;
        self.check_table(rid.page_id)?;
        if rid.page_id.page_no >= self.page_count()? {
            return Err(RecordError::TupleNotFound(rid.page_id, rid.slot_id).into());
        }

        let page = pool.fetch_page(tid, rid.page_id, Permission::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_record(record)?;
            guard.mark_dirty(Some(tid));
        }
        Ok(vec![page])
    }

    fn sync(&self) -> DbResult<()> {
        Ok(self.file.sync()?)
    }
}
