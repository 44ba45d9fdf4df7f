//! Fixed-size byte buffer pool with a per-thread fast path.
//!
//! Allocation tries, in order, the calling thread's free list for this pool,
//! the shared bounded overflow queue and finally fresh storage. Reclaim walks
//! the same tiers in the same order and drops the storage when both are full.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_queue::ArrayQueue;
use tracing::{debug, trace};

use crate::buffer::PooledBuffer;
use crate::ensure;
use crate::protocol::BufferError;

/// Default size of every pooled buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static LOCAL_CACHE: RefCell<Vec<LocalCache>> = const { RefCell::new(Vec::new()) };
}

/// One thread's free list for one pool.
///
/// Entries whose pool has been dropped are pruned on the next reclaim, and
/// on the dropping thread as the pool goes away.
struct LocalCache {
    pool: Weak<PoolInner>,
    buffers: Vec<Box<[u8]>>,
}

impl LocalCache {
    fn belongs_to(&self, pool: &PoolInner) -> bool {
        std::ptr::eq(self.pool.as_ptr(), pool)
    }
}

/// Configuration for a [`BufferPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Size in bytes of every buffer handed out.
    pub buffer_size: usize,
    /// Capacity of the shared overflow queue.
    pub max_pool_size: usize,
    /// Capacity of each thread's free list. Zero disables the thread-local tier.
    pub thread_local_cache_size: usize,
    /// Whether to fill the shared queue on creation instead of lazily.
    pub prefill: bool,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE, max_pool_size: 1024, thread_local_cache_size: 16, prefill: false }
    }
}

/// Counters describing the storage a pool has handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Storage regions ever created by this pool.
    pub created: usize,
    /// Storage regions currently held by at least one handle.
    pub outstanding: usize,
    /// Storage regions returned to a free tier after their last handle closed.
    pub reclaimed: usize,
    /// Storage regions idle in the shared overflow queue.
    pub idle_shared: usize,
}

/// A shared pool of fixed-size byte buffers.
///
/// Cloning the pool is cheap and every clone hands out buffers from the same
/// storage. See [`PooledBuffer`] for the handle lifetime rules.
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    id: usize,
    buffer_size: usize,
    thread_local_cache_size: usize,
    queue: ArrayQueue<Box<[u8]>>,
    closed: AtomicBool,
    created: AtomicUsize,
    outstanding: AtomicUsize,
    reclaimed: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(BufferPoolConfig::default())
    }
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig) -> Self {
        // ArrayQueue rejects a zero capacity
        let queue = ArrayQueue::new(config.max_pool_size.max(1));
        let inner = PoolInner {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            buffer_size: config.buffer_size,
            thread_local_cache_size: config.thread_local_cache_size,
            queue,
            closed: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            reclaimed: AtomicUsize::new(0),
        };

        if config.prefill {
            for _ in 0..config.max_pool_size {
                if inner.queue.push(inner.create()).is_err() {
                    break;
                }
            }
        }

        Self { inner: Arc::new(inner) }
    }

    /// Hands out a buffer with a single open handle.
    ///
    /// Never blocks. Fails only once the pool has been closed.
    pub fn allocate(&self) -> Result<PooledBuffer, BufferError> {
        ensure!(!self.inner.closed.load(Ordering::Acquire), BufferError::PoolClosed);

        let data = match self.inner.take_local() {
            Some(data) => data,
            None => self.inner.queue.pop().unwrap_or_else(|| self.inner.create()),
        };
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);

        Ok(PooledBuffer::new(data, Arc::downgrade(&self.inner)))
    }

    /// Closes the pool: later allocations fail and storage returned by
    /// outstanding handles is dropped instead of reclaimed.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        while self.inner.queue.pop().is_some() {}
        self.inner.clear_local();
        debug!(pool = self.inner.id, "buffer pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.inner.created.load(Ordering::Relaxed),
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
            reclaimed: self.inner.reclaimed.load(Ordering::Relaxed),
            idle_shared: self.inner.queue.len(),
        }
    }
}

impl PoolInner {
    fn create(&self) -> Box<[u8]> {
        self.created.fetch_add(1, Ordering::Relaxed);
        vec![0u8; self.buffer_size].into_boxed_slice()
    }

    fn take_local(&self) -> Option<Box<[u8]>> {
        if self.thread_local_cache_size == 0 {
            return None;
        }
        LOCAL_CACHE
            .try_with(|cache| {
                let mut cache = cache.try_borrow_mut().ok()?;
                cache.iter_mut().find(|local| local.belongs_to(self))?.buffers.pop()
            })
            .ok()
            .flatten()
    }

    /// Offers the storage to the calling thread's free list, handing it back if the list is full.
    fn put_local(self: &Arc<Self>, data: Box<[u8]>) -> Option<Box<[u8]>> {
        if self.thread_local_cache_size == 0 {
            return Some(data);
        }
        let mut data = Some(data);
        let _ = LOCAL_CACHE.try_with(|cache| {
            let Ok(mut cache) = cache.try_borrow_mut() else {
                return;
            };
            cache.retain(|local| local.pool.strong_count() > 0);
            let index = match cache.iter().position(|local| local.belongs_to(self)) {
                Some(index) => index,
                None => {
                    cache.push(LocalCache { pool: Arc::downgrade(self), buffers: Vec::new() });
                    cache.len() - 1
                }
            };
            let local = &mut cache[index];
            if local.buffers.len() < self.thread_local_cache_size {
                local.buffers.extend(data.take());
            }
        });
        data
    }

    fn clear_local(&self) {
        let _ = LOCAL_CACHE.try_with(|cache| {
            if let Ok(mut cache) = cache.try_borrow_mut() {
                cache.retain(|local| !local.belongs_to(self));
            }
        });
    }

    /// Receives storage whose last handle has closed.
    pub(crate) fn reclaim(self: &Arc<Self>, data: Box<[u8]>) {
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.reclaimed.fetch_add(1, Ordering::Relaxed);

        let Some(data) = self.put_local(data) else {
            return;
        };
        if self.queue.push(data).is_err() {
            trace!(pool = self.id, "overflow queue full, dropping buffer");
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        let _ = LOCAL_CACHE.try_with(|cache| {
            if let Ok(mut cache) = cache.try_borrow_mut() {
                cache.retain(|local| local.pool.strong_count() > 0);
            }
        });
    }
}

/// Storage shared by one primary handle and its duplicates.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) data: Box<[u8]>,
    pool: Weak<PoolInner>,
}

impl Slot {
    pub(crate) fn new(data: Box<[u8]>, pool: Weak<PoolInner>) -> Self {
        Self { data, pool }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        let data = std::mem::take(&mut self.data);
        if let Some(pool) = self.pool.upgrade() {
            pool.reclaim(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    fn local_cache_entries() -> usize {
        LOCAL_CACHE.with(|cache| cache.borrow().len())
    }

    fn small_pool() -> BufferPool {
        BufferPool::new(BufferPoolConfig { buffer_size: 64, max_pool_size: 4, thread_local_cache_size: 2, prefill: false })
    }

    #[test]
    fn test_allocate_reuses_reclaimed_storage() {
        let pool = small_pool();

        let mut buffer = pool.allocate().unwrap();
        assert_eq!(buffer.capacity(), 64);
        buffer.close().unwrap();

        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.outstanding, 0);
        assert_eq!(stats.reclaimed, 1);

        let _buffer = pool.allocate().unwrap();
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().outstanding, 1);
    }

    #[test]
    fn test_reclaim_spills_into_shared_queue() {
        let pool = small_pool();

        let buffers: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(pool.stats().created, 4);
        drop(buffers);

        // two fit the thread-local list, the rest overflow to the shared queue
        let stats = pool.stats();
        assert_eq!(stats.reclaimed, 4);
        assert_eq!(stats.idle_shared, 2);
    }

    #[test]
    fn test_prefill() {
        let pool = BufferPool::new(BufferPoolConfig { buffer_size: 32, max_pool_size: 3, thread_local_cache_size: 0, prefill: true });
        assert_eq!(pool.stats().created, 3);
        assert_eq!(pool.stats().idle_shared, 3);

        let _buffer = pool.allocate().unwrap();
        assert_eq!(pool.stats().created, 3);
        assert_eq!(pool.stats().idle_shared, 2);
    }

    #[test]
    fn test_closed_pool_rejects_allocation() {
        let pool = small_pool();
        let buffer = pool.allocate().unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.allocate().unwrap_err(), BufferError::PoolClosed);

        // outstanding handles stay usable and their storage is dropped on close
        assert_eq!(buffer.remaining(), 0);
        drop(buffer);
        assert_eq!(pool.stats().outstanding, 0);
        assert_eq!(pool.stats().reclaimed, 0);
    }

    #[test]
    fn test_buffers_outlive_pool() {
        let pool = small_pool();
        let mut buffer = pool.allocate().unwrap();
        drop(pool);

        buffer.spare_mut().unwrap()[..2].copy_from_slice(b"ok");
        buffer.commit(2);
        assert_eq!(buffer.chunk(), b"ok");
    }

    #[test]
    fn test_dropped_pools_release_thread_local_storage() {
        let before = local_cache_entries();
        for _ in 0..100 {
            let pool = small_pool();
            let buffers: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
            drop(buffers);
            assert_eq!(local_cache_entries(), before + 1);

            drop(pool);
            assert_eq!(local_cache_entries(), before);
        }
    }

    #[test]
    fn test_reclaim_prunes_entries_of_pools_dropped_elsewhere() {
        let pool = small_pool();
        let worker_pool = pool.clone();
        let (reclaimed_tx, reclaimed_rx) = std::sync::mpsc::channel();
        let (dropped_tx, dropped_rx) = std::sync::mpsc::channel();

        let worker = std::thread::spawn(move || {
            drop(worker_pool.allocate().unwrap());
            drop(worker_pool);
            reclaimed_tx.send(()).unwrap();
            dropped_rx.recv().unwrap();
            // the pool went away on another thread, its entry is stale here
            assert_eq!(local_cache_entries(), 1);

            let other = small_pool();
            drop(other.allocate().unwrap());
            local_cache_entries()
        });

        reclaimed_rx.recv().unwrap();
        drop(pool);
        dropped_tx.send(()).unwrap();
        assert_eq!(worker.join().unwrap(), 1);
    }
}
