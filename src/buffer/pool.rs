use ahash::{AHashMap, AHashSet};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::{DbError, DbResult};
use crate::file::{PageId, TableId};
use crate::heap::PageStore;
use crate::lock::{LockManager, LockMode};
use crate::record::{HeapPage, Record, RecordError};
use crate::transaction::TransactionId;

/// A cached page. Every holder shares the same buffer, so an in-place
/// mutation is visible without fetching the page again.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Access requested for a page fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

struct PoolState {
    /// Recency-ordered cache. Used unbounded: the pool enforces `capacity`
    /// itself so that only clean pages are ever evicted.
    cache: LruCache<PageId, PageRef>,
    /// Pages each live transaction has fetched
    touched: AHashMap<TransactionId, AHashSet<PageId>>,
}

/// Fixed-capacity page cache shared by all transactions.
///
/// Every page access goes through [`BufferPool::fetch_page`], which first
/// takes the page lock the permission calls for. Dirty pages are never
/// evicted or written before their transaction commits (NO-STEAL), so abort
/// only has to reread the on-disk copy.
pub struct BufferPool {
    state: Mutex<PoolState>,
    locks: LockManager,
    catalog: Arc<Catalog>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, capacity: usize, locks: LockManager) -> Self {
        Self {
            state: Mutex::new(PoolState {
                cache: LruCache::unbounded(),
                touched: AHashMap::new(),
            }),
            locks,
            catalog,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn page_size(&self) -> usize {
        self.catalog.page_size()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn store(&self, table: TableId) -> DbResult<Arc<dyn PageStore>> {
        self.catalog.store(table)
    }

    /// Lock `pid` for `tid` and return the cached page, loading it on a miss.
    ///
    /// Blocks while another transaction holds a conflicting lock. A lock
    /// timeout surfaces as [`DbError::TransactionAborted`], with every lock of
    /// `tid` already released.
    pub fn fetch_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permission,
    ) -> DbResult<PageRef> {
        self.locks.acquire(tid, pid, perm.lock_mode())?;

        let mut state = self.state.lock();
        let page = match state.cache.get(&pid).cloned() {
            Some(page) => {
                self.reclaim_orphan(tid, pid, &page)?;
                page
            }
            None => {
                let store = self.catalog.store(pid.table)?;
                if state.cache.len() >= self.capacity {
                    self.evict(&mut state)?;
                }
                let page = Arc::new(RwLock::new(store.read_page(pid)?));
                debug!(%tid, %pid, "cache miss, loaded page");
                state.cache.put(pid, Arc::clone(&page));
                page
            }
        };
        state.touched.entry(tid).or_default().insert(pid);

        Ok(page)
    }

    /// `tid` was just granted a lock on `pid`, so a page still dirtied by some
    /// other transaction belongs to one that lost its locks on a timeout.
    /// Its changes are uncommitted: put the on-disk copy back in place.
    fn reclaim_orphan(&self, tid: TransactionId, pid: PageId, page: &PageRef) -> DbResult<()> {
        let mut guard = page.write();
        let Some(owner) = guard.dirtier().filter(|owner| *owner != tid) else {
            return Ok(());
        };
        *guard = self.catalog.store(pid.table)?.read_page(pid)?;
        warn!(%tid, %owner, %pid, "restored page left dirty by a timed-out transaction");
        Ok(())
    }

    /// Insert `record` into `table` on behalf of `tid`, stamping its record id
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table: TableId,
        record: &mut Record,
    ) -> DbResult<()> {
        let store = self.store(table)?;
        let pages = store.insert_tuple(self, tid, record)?;
        self.mark_dirty(tid, &pages);
        Ok(())
    }

    /// Delete the stored tuple `record` refers to, clearing its record id
    pub fn delete_tuple(&self, tid: TransactionId, record: &mut Record) -> DbResult<()> {
        let rid = record.record_id().ok_or(RecordError::MissingRecordId)?;
        let store = self.store(rid.page_id.table)?;
        let pages = store.delete_tuple(self, tid, record)?;
        self.mark_dirty(tid, &pages);
        Ok(())
    }

    fn mark_dirty(&self, tid: TransactionId, pages: &[PageRef]) {
        let pids: Vec<PageId> = pages
            .iter()
            .map(|page| {
                let mut guard = page.write();
                guard.mark_dirty(Some(tid));
                guard.id()
            })
            .collect();

        let mut state = self.state.lock();
        state.touched.entry(tid).or_default().extend(pids);
    }

    /// Release every lock `tid` holds on `pid` before the transaction ends.
    ///
    /// This breaks strict two-phase locking: only for callers that know the
    /// page can no longer affect the transaction's result.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.locks.release(tid, pid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.locks.holds_lock(tid, pid)
    }

    /// Finish `tid`: on commit write its dirty pages to disk, on abort
    /// restore them from disk. Either way every lock of `tid` is released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> DbResult<()> {
        let result = {
            let mut state = self.state.lock();
            let mut pids: Vec<PageId> = state
                .touched
                .remove(&tid)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default();
            pids.sort();

            if commit {
                self.commit_pages(&state, tid, &pids).inspect_err(|_| {
                    // Whatever was not written yet must not stay dirty forever
                    if let Err(e) = self.rollback_pages(&mut state, tid, &pids) {
                        warn!(%tid, error = %e, "failed to restore pages after a failed commit");
                    }
                })
            } else {
                self.rollback_pages(&mut state, tid, &pids)
            }
        };
        self.locks.clear_transaction(tid);

        match &result {
            Ok(()) if commit => info!(%tid, "committed"),
            Ok(()) => info!(%tid, "aborted"),
            Err(e) => warn!(%tid, commit, error = %e, "transaction completion failed"),
        }
        result
    }

    fn commit_pages(&self, state: &PoolState, tid: TransactionId, pids: &[PageId]) -> DbResult<()> {
        let mut tables = AHashSet::new();
        for pid in pids {
            let Some(page) = state.cache.peek(pid) else {
                continue;
            };
            if page.read().dirtier() != Some(tid) {
                continue;
            }
            if self.write_back(page)? {
                self.locks.clear_page(*pid);
                tables.insert(pid.table);
            }
        }
        for table in tables {
            self.catalog.store(table)?.sync()?;
        }
        Ok(())
    }

    /// Reread every page `tid` dirtied. A page that cannot be reread is
    /// dropped from the cache instead, so the next fetch loads it from disk.
    fn rollback_pages(
        &self,
        state: &mut PoolState,
        tid: TransactionId,
        pids: &[PageId],
    ) -> DbResult<()> {
        let mut first_error = None;
        for pid in pids {
            let Some(page) = state.cache.peek(pid).cloned() else {
                continue;
            };
            let mut guard = page.write();
            if guard.dirtier() != Some(tid) {
                continue;
            }

            match self.catalog.store(pid.table).and_then(|s| s.read_page(*pid)) {
                Ok(on_disk) => {
                    *guard = on_disk;
                    debug!(%tid, %pid, "restored page from disk");
                }
                Err(e) => {
                    drop(guard);
                    state.cache.pop(pid);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Write `page` to its store if dirty. Returns whether anything was written.
    fn write_back(&self, page: &PageRef) -> DbResult<bool> {
        let mut guard = page.write();
        if !guard.is_dirty() {
            return Ok(false);
        }
        let pid = guard.id();
        self.catalog.store(pid.table)?.write_page(&guard)?;
        guard.mark_dirty(None);
        debug!(%pid, "flushed page");
        Ok(true)
    }

    /// Make room for one page by dropping the least recently used page that
    /// is clean and not borrowed. Fails if every cached page is dirty.
    fn evict(&self, state: &mut PoolState) -> DbResult<()> {
        let victim = state
            .cache
            .iter()
            .rev()
            .find(|(_, page)| page.try_read().is_some_and(|p| !p.is_dirty()))
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                state.cache.pop(&pid);
                debug!(%pid, "evicted page");
                Ok(())
            }
            None => {
                warn!(capacity = self.capacity, "buffer pool full of dirty pages");
                Err(DbError::AllPagesDirty {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Drop `pid` from the cache without writing it back
    pub fn discard_page(&self, pid: PageId) {
        if self.state.lock().cache.pop(&pid).is_some() {
            debug!(%pid, "discarded page");
        }
    }

    /// Write one page to disk if it is cached and dirty, then free its locks
    pub fn flush_page(&self, pid: PageId) -> DbResult<()> {
        let state = self.state.lock();
        if let Some(page) = state.cache.peek(&pid)
            && self.write_back(page)?
        {
            self.locks.clear_page(pid);
        }
        Ok(())
    }

    /// Write every page `tid` has touched, dirty under any transaction
    pub fn flush_pages(&self, tid: TransactionId) -> DbResult<()> {
        let state = self.state.lock();
        let Some(pids) = state.touched.get(&tid) else {
            return Ok(());
        };
        for pid in pids {
            if let Some(page) = state.cache.peek(pid)
                && self.write_back(page)?
            {
                self.locks.clear_page(*pid);
            }
        }
        Ok(())
    }

    /// Write every dirty cached page. Breaks NO-STEAL if a transaction is
    /// still running; meant for shutdown.
    pub fn flush_all_pages(&self) -> DbResult<()> {
        let state = self.state.lock();
        for (pid, page) in state.cache.iter() {
            if self.write_back(page)? {
                self.locks.clear_page(*pid);
            }
        }
        Ok(())
    }

    /// Cached page ids, sorted
    pub fn cached_pages(&self) -> Vec<PageId> {
        let state = self.state.lock();
        let mut pids: Vec<PageId> = state.cache.iter().map(|(pid, _)| *pid).collect();
        pids.sort();
        pids
    }

    pub fn is_cached(&self, pid: PageId) -> bool {
        self.state.lock().cache.contains(&pid)
    }

    pub fn dirty_pages(&self) -> Vec<PageId> {
        let state = self.state.lock();
        let mut pids: Vec<PageId> = state
            .cache
            .iter()
            .filter(|(_, page)| page.read().is_dirty())
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort();
        pids
    }

    pub fn touched_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let state = self.state.lock();
        let mut pids: Vec<PageId> = state
            .touched
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        pids.sort();
        pids
    }
}
