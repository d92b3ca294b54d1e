use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{Record, RecordId, SlotId};
use super::schema::TableSchema;
use crate::file::PageId;
use crate::transaction::TransactionId;

/// A heap page: a bitmap header of `ceil(slots / 8)` bytes followed by
/// `slots` fixed-width tuple slots.
///
/// There is no other header, so an all-zero buffer is a valid empty page.
/// The page also carries the cache bookkeeping the buffer pool needs: the
/// transaction that last dirtied it, or `None` when it matches disk.
#[derive(Debug, Clone)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<TableSchema>,
    data: Vec<u8>,
    slot_count: usize,
    dirtier: Option<TransactionId>,
}

impl HeapPage {
    /// Number of tuples of `record_size` bytes that fit a page, one header bit each
    pub fn slot_count_for(page_size: usize, record_size: usize) -> usize {
        if record_size == 0 {
            return 0;
        }
        (page_size * 8) / (record_size * 8 + 1)
    }

    /// Deserialize a page read from disk
    pub fn from_bytes(pid: PageId, data: Vec<u8>, schema: Arc<TableSchema>) -> RecordResult<Self> {
        let slot_count = Self::slot_count_for(data.len(), schema.record_size());
        if slot_count == 0 {
            return Err(RecordError::RecordTooLarge {
                record_size: schema.record_size(),
                page_size: data.len(),
            });
        }

        Ok(Self {
            pid,
            schema,
            data,
            slot_count,
            dirtier: None,
        })
    }

    /// A page with every slot free
    pub fn empty(pid: PageId, page_size: usize, schema: Arc<TableSchema>) -> RecordResult<Self> {
        Self::from_bytes(pid, vec![0u8; page_size], schema)
    }

    pub fn id(&self) -> PageId {
        self.pid
    }

    /// The serialized page, exactly one page in size
    pub fn page_data(&self) -> &[u8] {
        &self.data
    }

    /// The transaction that dirtied this page, if it differs from disk
    pub fn dirtier(&self) -> Option<TransactionId> {
        self.dirtier
    }

    pub fn is_dirty(&self) -> bool {
        self.dirtier.is_some()
    }

    pub fn mark_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirtier = tid;
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    fn header_size(&self) -> usize {
        self.slot_count.div_ceil(8)
    }

    fn slot_range(&self, slot_id: SlotId) -> std::ops::Range<usize> {
        let record_size = self.schema.record_size();
        let start = self.header_size() + slot_id * record_size;
        start..start + record_size
    }

    pub fn is_slot_used(&self, slot_id: SlotId) -> bool {
        slot_id < self.slot_count && self.data[slot_id / 8] & (1 << (slot_id % 8)) != 0
    }

    fn set_slot_used(&mut self, slot_id: SlotId, used: bool) {
        let mask = 1 << (slot_id % 8);
        if used {
            self.data[slot_id / 8] |= mask;
        } else {
            self.data[slot_id / 8] &= !mask;
        }
    }

    pub fn free_slot_count(&self) -> usize {
        (0..self.slot_count)
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn find_free_slot(&self) -> Option<SlotId> {
        (0..self.slot_count).find(|&slot| !self.is_slot_used(slot))
    }

    /// Store `record` in the first free slot and stamp its record id
    pub fn insert_record(&mut self, record: &mut Record) -> RecordResult<SlotId> {
        let bytes = record.serialize(&self.schema)?;
        let slot_id = self
            .find_free_slot()
            .ok_or(RecordError::PageFull(self.pid))?;

        let range = self.slot_range(slot_id);
        self.data[range].copy_from_slice(&bytes);
        self.set_slot_used(slot_id, true);

        record.set_record_id(Some(RecordId::new(self.pid, slot_id)));
        Ok(slot_id)
    }

    /// Free the slot `record` was stored in and clear its record id
    pub fn delete_record(&mut self, record: &mut Record) -> RecordResult<()> {
        let rid = record.record_id().ok_or(RecordError::MissingRecordId)?;
        if rid.page_id != self.pid {
            return Err(RecordError::WrongPage {
                expected: self.pid,
                actual: rid.page_id,
            });
        }
        if rid.slot_id >= self.slot_count {
            return Err(RecordError::InvalidSlot(self.pid, rid.slot_id));
        }
        if !self.is_slot_used(rid.slot_id) {
            return Err(RecordError::TupleNotFound(self.pid, rid.slot_id));
        }

        self.set_slot_used(rid.slot_id, false);
        let range = self.slot_range(rid.slot_id);
        self.data[range].fill(0);

        record.set_record_id(None);
        Ok(())
    }

    pub fn get_record(&self, slot_id: SlotId) -> RecordResult<Record> {
        if slot_id >= self.slot_count {
            return Err(RecordError::InvalidSlot(self.pid, slot_id));
        }
        if !self.is_slot_used(slot_id) {
            return Err(RecordError::TupleNotFound(self.pid, slot_id));
        }

        let mut record = Record::deserialize(&self.data[self.slot_range(slot_id)], &self.schema)?;
        record.set_record_id(Some(RecordId::new(self.pid, slot_id)));
        Ok(record)
    }

    /// Live tuples in slot order
    pub fn records(&self) -> impl Iterator<Item = RecordResult<Record>> + '_ {
        (0..self.slot_count)
            .filter(|&slot| self.is_slot_used(slot))
            .map(|slot| self.get_record(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::TableId;
    use crate::record::{ColumnDef, DataType, Value};

    const PAGE: usize = 128;

    fn schema() -> Arc<TableSchema> {
        Arc::new(TableSchema::new(vec![
            ColumnDef::new("id", DataType::Int, true),
            ColumnDef::new("tag", DataType::Char(3), false),
        ]))
    }

    fn pid(n: u32) -> PageId {
        PageId::new(TableId(1), n)
    }

    fn row(id: i32) -> Record {
        Record::new(vec![Value::Int(id), Value::String("ab".into())])
    }

    #[test]
    fn test_slot_count_for() {
        // 8 byte tuples: 128*8 / 65 = 15
        assert_eq!(HeapPage::slot_count_for(PAGE, 8), 15);
        assert_eq!(HeapPage::slot_count_for(4096, 8), 504);
        assert_eq!(HeapPage::slot_count_for(PAGE, 0), 0);
        assert_eq!(HeapPage::slot_count_for(PAGE, PAGE), 0);
    }

    #[test]
    fn test_zeroed_page_is_empty() {
        let page = HeapPage::empty(pid(0), PAGE, schema()).unwrap();
        assert_eq!(page.slot_count(), 15);
        assert_eq!(page.free_slot_count(), 15);
        assert_eq!(page.records().count(), 0);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_record_too_large() {
        let wide = Arc::new(TableSchema::new(vec![ColumnDef::new(
            "blob",
            DataType::Char(PAGE),
            false,
        )]));
        let result = HeapPage::empty(pid(0), PAGE, wide);
        assert!(matches!(result, Err(RecordError::RecordTooLarge { .. })));
    }

    #[test]
    fn test_insert_stamps_record_id() {
        let mut page = HeapPage::empty(pid(2), PAGE, schema()).unwrap();
        let mut first = row(1);
        let mut second = row(2);

        assert_eq!(page.insert_record(&mut first).unwrap(), 0);
        assert_eq!(page.insert_record(&mut second).unwrap(), 1);
        assert_eq!(first.record_id(), Some(RecordId::new(pid(2), 0)));
        assert_eq!(page.get_record(1).unwrap(), second);
        assert_eq!(page.free_slot_count(), 13);
    }

    #[test]
    fn test_page_full() {
        let mut page = HeapPage::empty(pid(0), PAGE, schema()).unwrap();
        for i in 0..page.slot_count() {
            page.insert_record(&mut row(i as i32)).unwrap();
        }
        assert!(matches!(
            page.insert_record(&mut row(99)),
            Err(RecordError::PageFull(_))
        ));
    }

    #[test]
    fn test_delete_frees_slot_for_reuse() {
        let mut page = HeapPage::empty(pid(0), PAGE, schema()).unwrap();
        let mut a = row(1);
        let mut b = row(2);
        page.insert_record(&mut a).unwrap();
        page.insert_record(&mut b).unwrap();

        page.delete_record(&mut a).unwrap();
        assert_eq!(a.record_id(), None);
        assert!(!page.is_slot_used(0));

        let mut c = row(3);
        assert_eq!(page.insert_record(&mut c).unwrap(), 0);
        let ids: Vec<_> = page
            .records()
            .map(|r| r.unwrap().get(0).cloned().unwrap())
            .collect();
        assert_eq!(ids, vec![Value::Int(3), Value::Int(2)]);
    }

    #[test]
    fn test_delete_rejects_missing_tuples() {
        let mut page = HeapPage::empty(pid(0), PAGE, schema()).unwrap();

        let mut unplaced = row(1);
        assert!(matches!(
            page.delete_record(&mut unplaced),
            Err(RecordError::MissingRecordId)
        ));

        let mut elsewhere = row(1);
        elsewhere.set_record_id(Some(RecordId::new(pid(7), 0)));
        assert!(matches!(
            page.delete_record(&mut elsewhere),
            Err(RecordError::WrongPage { .. })
        ));

        let mut vacant = row(1);
        vacant.set_record_id(Some(RecordId::new(pid(0), 4)));
        assert!(matches!(
            page.delete_record(&mut vacant),
            Err(RecordError::TupleNotFound(_, 4))
        ));
    }

    #[test]
    fn test_page_data_roundtrips_through_from_bytes() {
        let mut page = HeapPage::empty(pid(0), PAGE, schema()).unwrap();
        page.insert_record(&mut row(5)).unwrap();
        page.insert_record(&mut row(6)).unwrap();

        let restored = HeapPage::from_bytes(pid(0), page.page_data().to_vec(), schema()).unwrap();
        assert_eq!(restored.records().count(), 2);
        assert_eq!(restored.get_record(1).unwrap().get(0), Some(&Value::Int(6)));
    }
}
