use std::time::Duration;
use thiserror::Error;

use super::LockMode;
use crate::file::PageId;
use crate::transaction::TransactionId;

#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not granted in time. Every lock the transaction held has
    /// already been released; the transaction must abort.
    #[error("{tid} timed out after {waited:?} waiting for a {mode:?} lock on page {pid}")]
    Timeout {
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
        waited: Duration,
    },
}

pub type LockResult<T> = Result<T, LockError>;
