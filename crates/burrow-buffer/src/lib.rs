//! Burrow buffer pool.
//!
//! A fixed-size pool of page frames with pin counting, dirty tracking,
//! and clock replacement. Callers pin pages, mutate them in place, and
//! unpin with a dirty flag; evicted dirty pages are handed back so the
//! caller can write them to disk.

pub mod frame;
pub mod page_table;
pub mod pool;
pub mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, EvictedPage};
