use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{DbError, DbResult};
use crate::file::{DEFAULT_PAGE_SIZE, DEFAULT_POOL_PAGES};
use crate::lock::LockTimeout;

/// Database-wide settings, fixed for the lifetime of an open database.
///
/// Missing fields in a JSON config file fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Bytes per page; must not change for an existing database
    pub page_size: usize,
    /// Pages the buffer pool may cache at once
    pub pool_pages: usize,
    pub lock_timeout_min_ms: u64,
    pub lock_timeout_max_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout_min_ms: 3000,
            lock_timeout_max_ms: 5000,
        }
    }
}

impl DbConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.page_size == 0 {
            return Err(DbError::InvalidConfig("page_size must be positive".into()));
        }
        if self.pool_pages == 0 {
            return Err(DbError::InvalidConfig("pool_pages must be positive".into()));
        }
        if self.lock_timeout_min_ms > self.lock_timeout_max_ms {
            return Err(DbError::InvalidConfig(format!(
                "lock timeout window is inverted: {}ms > {}ms",
                self.lock_timeout_min_ms, self.lock_timeout_max_ms
            )));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::new(
            Duration::from_millis(self.lock_timeout_min_ms),
            Duration::from_millis(self.lock_timeout_max_ms),
        )
    }
}
