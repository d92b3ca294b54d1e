use thiserror::Error;

use crate::file::{FileError, TableId};
use crate::lock::LockError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[from] LockError),

    #[error("Buffer pool full: all {capacity} cached pages are dirty")]
    AllPagesDirty { capacity: usize },

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("No page store registered for table {0}")]
    UnknownTable(TableId),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read/write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// Whether the failure only means "abort and run the whole transaction
    /// again". Everything else is reported to the caller as is.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DbError::TransactionAborted(_) | DbError::AllPagesDirty { .. }
        )
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::PageId;
    use crate::lock::LockMode;
    use crate::transaction::TransactionId;
    use std::time::Duration;

    #[test]
    fn test_retriable_errors() {
        let timeout = LockError::Timeout {
            tid: TransactionId::new(1),
            pid: PageId::new(TableId(0), 0),
            mode: LockMode::Shared,
            waited: Duration::from_millis(10),
        };
        assert!(DbError::from(timeout).is_retriable());
        assert!(DbError::AllPagesDirty { capacity: 2 }.is_retriable());

        assert!(!DbError::UnknownTable(TableId(3)).is_retriable());
        assert!(!DbError::Record(RecordError::MissingRecordId).is_retriable());
    }
}
