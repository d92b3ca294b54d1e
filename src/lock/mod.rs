mod error;
mod manager;

pub use error::{LockError, LockResult};
pub use manager::{LockManager, LockMode, LockTimeout};
