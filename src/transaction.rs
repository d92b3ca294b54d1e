use std::fmt;
use tracing::warn;

use crate::database::Database;
use crate::error::DbResult;
use crate::file::TableId;
use crate::heap::HeapScan;
use crate::record::{Record, RecordId, Value};

/// Names one transaction for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// A running transaction.
///
/// Finish it with [`commit`](Transaction::commit) or
/// [`abort`](Transaction::abort); dropping it unfinished aborts it.
pub struct Transaction<'db> {
    db: &'db Database,
    tid: TransactionId,
    finished: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, tid: TransactionId) -> Self {
        Self {
            db,
            tid,
            finished: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    pub fn insert(&self, table: TableId, values: Vec<Value>) -> DbResult<RecordId> {
        let mut record = Record::new(values);
        self.insert_record(table, &mut record)?;
        record
            .record_id()
            .ok_or_else(|| crate::record::RecordError::MissingRecordId.into())
    }

    pub fn insert_record(&self, table: TableId, record: &mut Record) -> DbResult<()> {
        self.db.buffer_pool().insert_tuple(self.tid, table, record)
    }

    pub fn delete(&self, record: &mut Record) -> DbResult<()> {
        self.db.buffer_pool().delete_tuple(self.tid, record)
    }

    pub fn scan(&self, table: TableId) -> DbResult<HeapScan<'db>> {
        HeapScan::new(self.db.buffer_pool(), self.tid, table)
    }

    pub fn commit(mut self) -> DbResult<()> {
        self.finished = true;
        self.db.buffer_pool().transaction_complete(self.tid, true)
    }

    pub fn abort(mut self) -> DbResult<()> {
        self.finished = true;
        self.db.buffer_pool().transaction_complete(self.tid, false)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.db.buffer_pool().transaction_complete(self.tid, false) {
            warn!(tid = %self.tid, error = %e, "abort of dropped transaction failed");
        }
    }
}
