use thiserror::Error;

use crate::file::PageId;

/// Structural failures: a tuple or page that does not fit the table's shape
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid slot: page={0}, slot={1}")]
    InvalidSlot(PageId, usize),

    #[error("Page full: page={0}")]
    PageFull(PageId),

    #[error("Tuple not found: page={0}, slot={1}")]
    TupleNotFound(PageId, usize),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Tuple belongs to page {actual}, not {expected}")]
    WrongPage { expected: PageId, actual: PageId },

    #[error("Record of {record_size} bytes does not fit a {page_size}-byte page")]
    RecordTooLarge {
        record_size: usize,
        page_size: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("NULL value for NOT NULL column: {0}")]
    NullConstraintViolation(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}

pub type RecordResult<T> = Result<T, RecordError>;
