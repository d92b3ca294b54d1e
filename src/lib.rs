pub mod buffer;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod file;
pub mod heap;
pub mod lock;
pub mod logging;
pub mod record;
pub mod transaction;

pub use buffer::{BufferPool, PageRef, Permission};
pub use catalog::{Catalog, TableMetadata};
pub use config::DbConfig;
pub use database::Database;
pub use error::{DbError, DbResult};
pub use file::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES, PageId, PageNo, PagedFile, TableId};
pub use heap::{HeapFile, HeapScan, PageStore};
pub use lock::{LockError, LockManager, LockMode, LockTimeout};
pub use record::{
    ColumnDef, DataType, HeapPage, Record, RecordError, RecordId, TableSchema, Value,
};
pub use transaction::{Transaction, TransactionId};
