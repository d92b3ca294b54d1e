use ahash::{AHashMap, AHashSet};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::error::{LockError, LockResult};
use crate::file::PageId;
use crate::transaction::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// How long a lock request may wait before its transaction is aborted.
///
/// Each request draws its own deadline uniformly from `[min, max]`, so two
/// transactions stuck in a deadlock rarely give up at the same moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout {
    pub min: Duration,
    pub max: Duration,
}

impl LockTimeout {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// The same deadline for every request
    pub fn fixed(timeout: Duration) -> Self {
        Self::new(timeout, timeout)
    }

    fn pick(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        if max <= min {
            return self.min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for LockTimeout {
    fn default() -> Self {
        Self::new(Duration::from_millis(3000), Duration::from_millis(5000))
    }
}

/// Lock edges indexed both by page and by transaction. Every edge is present
/// in both directions or in neither.
#[derive(Default)]
struct LockTable {
    shared: AHashMap<PageId, AHashSet<TransactionId>>,
    exclusive: AHashMap<PageId, TransactionId>,
    tx_shared: AHashMap<TransactionId, AHashSet<PageId>>,
    tx_exclusive: AHashMap<TransactionId, AHashSet<PageId>>,
}

impl LockTable {
    fn holds_shared(&self, tid: TransactionId, pid: PageId) -> bool {
        self.shared.get(&pid).is_some_and(|s| s.contains(&tid))
    }

    fn holds_exclusive(&self, tid: TransactionId, pid: PageId) -> bool {
        self.exclusive.get(&pid) == Some(&tid)
    }

    /// Whether `tid` may take `mode` on `pid` given everyone else's locks
    fn compatible(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        let other_exclusive = self.exclusive.get(&pid).is_some_and(|&owner| owner != tid);
        match mode {
            LockMode::Shared => !other_exclusive,
            LockMode::Exclusive => {
                !other_exclusive
                    && self
                        .shared
                        .get(&pid)
                        .is_none_or(|holders| holders.iter().all(|&h| h == tid))
            }
        }
    }

    fn grant(&mut self, tid: TransactionId, pid: PageId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                self.shared.entry(pid).or_default().insert(tid);
                self.tx_shared.entry(tid).or_default().insert(pid);
            }
            LockMode::Exclusive => {
                self.exclusive.insert(pid, tid);
                self.tx_exclusive.entry(tid).or_default().insert(pid);
            }
        }
    }

    fn release_shared(&mut self, tid: TransactionId, pid: PageId) -> bool {
        let removed = remove_edge(&mut self.shared, pid, tid);
        remove_edge(&mut self.tx_shared, tid, pid);
        removed
    }

    fn release_exclusive(&mut self, tid: TransactionId, pid: PageId) -> bool {
        if !self.holds_exclusive(tid, pid) {
            return false;
        }
        self.exclusive.remove(&pid);
        remove_edge(&mut self.tx_exclusive, tid, pid);
        true
    }

    fn clear_page(&mut self, pid: PageId) -> bool {
        let mut released = false;
        if let Some(owner) = self.exclusive.remove(&pid) {
            remove_edge(&mut self.tx_exclusive, owner, pid);
            released = true;
        }
        if let Some(holders) = self.shared.remove(&pid) {
            for tid in holders {
                remove_edge(&mut self.tx_shared, tid, pid);
                released = true;
            }
        }
        released
    }

    fn clear_transaction(&mut self, tid: TransactionId) -> bool {
        let mut released = false;
        if let Some(pages) = self.tx_exclusive.remove(&tid) {
            for pid in pages {
                self.exclusive.remove(&pid);
                released = true;
            }
        }
        if let Some(pages) = self.tx_shared.remove(&tid) {
            for pid in pages {
                remove_edge(&mut self.shared, pid, tid);
                released = true;
            }
        }
        released
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let forward_shared = self
            .shared
            .iter()
            .all(|(p, ts)| ts.iter().all(|t| self.tx_shared.get(t).is_some_and(|ps| ps.contains(p))));
        let backward_shared = self
            .tx_shared
            .iter()
            .all(|(t, ps)| ps.iter().all(|p| self.holds_shared(*t, *p)));
        let forward_exclusive = self
            .exclusive
            .iter()
            .all(|(p, t)| self.tx_exclusive.get(t).is_some_and(|ps| ps.contains(p)));
        let backward_exclusive = self
            .tx_exclusive
            .iter()
            .all(|(t, ps)| ps.iter().all(|p| self.holds_exclusive(*t, *p)));
        forward_shared && backward_shared && forward_exclusive && backward_exclusive
    }
}

/// Remove `value` from the set under `key`, dropping the set once it is empty
fn remove_edge<K, V>(map: &mut AHashMap<K, AHashSet<V>>, key: K, value: V) -> bool
where
    K: std::hash::Hash + Eq,
    V: std::hash::Hash + Eq,
{
    let Some(set) = map.get_mut(&key) else {
        return false;
    };
    let removed = set.remove(&value);
    if set.is_empty() {
        map.remove(&key);
    }
    removed
}

/// Page-granularity shared/exclusive locks for strict two-phase locking.
///
/// A request that cannot be granted waits on a condition variable that every
/// release signals. Deadlocks are broken by the request timeout: a waiter
/// whose deadline passes drops all of its transaction's locks and returns
/// [`LockError::Timeout`].
pub struct LockManager {
    table: Mutex<LockTable>,
    released: Condvar,
    timeout: LockTimeout,
}

impl LockManager {
    pub fn new(timeout: LockTimeout) -> Self {
        Self {
            table: Mutex::new(LockTable::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> LockTimeout {
        self.timeout
    }

    pub fn acquire_shared(&self, tid: TransactionId, pid: PageId) -> LockResult<()> {
        self.acquire(tid, pid, LockMode::Shared)
    }

    pub fn acquire_exclusive(&self, tid: TransactionId, pid: PageId) -> LockResult<()> {
        self.acquire(tid, pid, LockMode::Exclusive)
    }

    /// Block until `tid` holds `mode` on `pid` or the request times out
    pub fn acquire(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> LockResult<()> {
        let mut table = self.table.lock();

        // An exclusive lock already covers shared access
        if table.holds_exclusive(tid, pid)
            || (mode == LockMode::Shared && table.holds_shared(tid, pid))
        {
            return Ok(());
        }

        let start = Instant::now();
        let deadline = start + self.timeout.pick();

        loop {
            if table.compatible(tid, pid, mode) {
                table.grant(tid, pid, mode);
                debug!(%tid, %pid, ?mode, "lock granted");
                return Ok(());
            }

            trace!(%tid, %pid, ?mode, "waiting for lock");
            if self.released.wait_until(&mut table, deadline).timed_out()
                && !table.compatible(tid, pid, mode)
            {
                // Still under the table mutex, so other waiters never see a
                // partially released transaction.
                table.clear_transaction(tid);
                drop(table);
                self.released.notify_all();

                let waited = start.elapsed();
                warn!(%tid, %pid, ?mode, ?waited, "lock wait timed out, aborting transaction");
                return Err(LockError::Timeout {
                    tid,
                    pid,
                    mode,
                    waited,
                });
            }
        }
    }

    pub fn release_shared(&self, tid: TransactionId, pid: PageId) {
        if self.table.lock().release_shared(tid, pid) {
            self.released.notify_all();
        }
    }

    pub fn release_exclusive(&self, tid: TransactionId, pid: PageId) {
        if self.table.lock().release_exclusive(tid, pid) {
            self.released.notify_all();
        }
    }

    /// Release both kinds of lock `tid` holds on `pid`
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let released = {
            let mut table = self.table.lock();
            let shared = table.release_shared(tid, pid);
            let exclusive = table.release_exclusive(tid, pid);
            shared || exclusive
        };
        if released {
            self.released.notify_all();
        }
    }

    /// Whether `tid` holds any lock, shared or exclusive, on `pid`
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_mode(tid, pid).is_some()
    }

    /// The strongest lock `tid` holds on `pid`
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        if table.holds_exclusive(tid, pid) {
            Some(LockMode::Exclusive)
        } else if table.holds_shared(tid, pid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    /// Forcibly drop every transaction's locks on `pid`
    pub fn clear_page(&self, pid: PageId) {
        if self.table.lock().clear_page(pid) {
            self.released.notify_all();
        }
    }

    /// Drop every lock `tid` holds
    pub fn clear_transaction(&self, tid: TransactionId) {
        if self.table.lock().clear_transaction(tid) {
            self.released.notify_all();
        }
    }

    pub fn shared_holders(&self, pid: PageId) -> Vec<TransactionId> {
        let table = self.table.lock();
        let mut holders: Vec<_> = table
            .shared
            .get(&pid)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    pub fn exclusive_holder(&self, pid: PageId) -> Option<TransactionId> {
        self.table.lock().exclusive.get(&pid).copied()
    }

    /// Every page `tid` holds any lock on, sorted
    pub fn locked_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        let mut pages: Vec<PageId> = table
            .tx_shared
            .get(&tid)
            .into_iter()
            .chain(table.tx_exclusive.get(&tid))
            .flatten()
            .copied()
            .collect();
        pages.sort();
        pages.dedup();
        pages
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockTimeout::default())
    }
}
