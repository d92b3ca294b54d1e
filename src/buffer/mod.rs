mod pool;


pub use pool::{BufferPool, PageRef, Permission};
