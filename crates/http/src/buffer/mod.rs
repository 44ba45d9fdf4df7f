//! Reference-counted byte buffers shared by every connection.
//!
//! # Components
//!
//! - [`BufferPool`]: hands out fixed-size buffers from a per-thread free list,
//!   then a shared lock-free overflow queue, then fresh storage
//! - [`PooledBuffer`]: a handle to one buffer; duplicates share the storage
//!   and the storage returns to the pool once every handle is closed
//!
//! The pool is shared across connections and threads. Inbound socket reads
//! land in pooled buffers; unconsumed tails are kept by the connection as
//! "extra bytes" for the next pipelined request.

mod pool;
mod pooled;

pub use pool::BufferPool;
pub use pool::BufferPoolConfig;
pub use pool::DEFAULT_BUFFER_SIZE;
pub use pool::PoolStats;
pub use pooled::PooledBuffer;
