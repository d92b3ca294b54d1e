use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::buffer::BufferPool;
use crate::catalog::{Catalog, TableMetadata};
use crate::config::DbConfig;
use crate::error::DbResult;
use crate::file::TableId;
use crate::lock::LockManager;
use crate::record::{ColumnDef, TableSchema};
use crate::transaction::{Transaction, TransactionId};

/// An open database directory: its catalog, its buffer pool and the
/// transaction id counter. Everything is torn down by [`Database::close`].
pub struct Database {
    dir: PathBuf,
    config: DbConfig,
    catalog: Arc<Catalog>,
    pool: BufferPool,
    next_tid: AtomicU64,
}

impl Database {
    pub fn open<P: AsRef<Path>>(dir: P, config: DbConfig) -> DbResult<Self> {
        config.validate()?;
        let dir = dir.as_ref().to_path_buf();

        let catalog = Arc::new(Catalog::open(&dir, config.page_size)?);
        let pool = BufferPool::new(
            Arc::clone(&catalog),
            config.pool_pages,
            LockManager::new(config.lock_timeout()),
        );

        info!(
            dir = %dir.display(),
            tables = catalog.tables().len(),
            pool_pages = config.pool_pages,
            "opened database"
        );
        Ok(Self {
            dir,
            config,
            catalog,
            pool,
            next_tid: AtomicU64::new(1),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnDef>) -> DbResult<TableId> {
        self.catalog.create_table(name, columns)
    }

    pub fn table_id(&self, name: &str) -> DbResult<TableId> {
        self.catalog.table_id(name)
    }

    pub fn table(&self, name: &str) -> DbResult<TableMetadata> {
        self.catalog.table(name)
    }

    pub fn schema(&self, table: TableId) -> DbResult<Arc<TableSchema>> {
        self.catalog.schema(table)
    }

    pub fn begin(&self) -> Transaction<'_> {
        let tid = TransactionId::new(self.next_tid.fetch_add(1, Ordering::Relaxed));
        Transaction::new(self, tid)
    }

    /// Run `body` in a fresh transaction, retrying from scratch while it
    /// fails with a retriable error. Gives up after `attempts` tries.
    pub fn run<T, F>(&self, attempts: usize, mut body: F) -> DbResult<T>
    where
        F: FnMut(&Transaction<'_>) -> DbResult<T>,
    {
        let mut attempt = 1;
        loop {
            let txn = self.begin();
            match body(&txn) {
                Ok(value) => {
                    txn.commit()?;
                    return Ok(value);
                }
                Err(e) if e.is_retriable() && attempt < attempts => {
                    debug!(tid = %txn.id(), attempt, error = %e, "retrying transaction");
                    txn.abort()?;
                    attempt += 1;
                }
                // Dropping the transaction aborts it
                Err(e) => return Err(e),
            }
        }
    }

    /// Write out anything still cached and sync every table file
    pub fn close(self) -> DbResult<()> {
        self.pool.flush_all_pages()?;
        self.catalog.sync_all()?;
        info!(dir = %self.dir.display(), "closed database");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
