use std::io;
use thiserror::Error;

use super::PageNo;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Page out of range: page_no={page_no}, page_count={page_count}")]
    PageOutOfRange { page_no: PageNo, page_count: PageNo },

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("File length {len} is not a multiple of the page size {page_size}")]
    Misaligned { len: u64, page_size: usize },
}

pub type FileResult<T> = Result<T, FileError>;
