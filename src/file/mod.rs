use serde::{Deserialize, Serialize};
use std::fmt;

mod error;
mod paged_file;

pub use error::{FileError, FileResult};
pub use paged_file::PagedFile;

/// Default page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of pages cached by the buffer pool
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Page number within a single file
pub type PageNo = u32;

/// Identifier of a table, assigned by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Identifies a page: the table it belongs to and its slot in that table's file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    pub table: TableId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(table: TableId, page_no: PageNo) -> Self {
        Self { table, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.table, self.page_no)
    }
}
