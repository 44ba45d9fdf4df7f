use std::sync::{Arc, Weak};

use bytes::Buf;

use crate::buffer::pool::{PoolInner, Slot};
use crate::protocol::BufferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    Primary,
    Duplicate,
}

/// A handle to one fixed-size region borrowed from a [`BufferPool`](crate::buffer::BufferPool).
///
/// The region is shared by a primary handle and any number of duplicates made
/// with [`duplicate`](Self::duplicate). Each handle tracks its own read window
/// and its own open state; the region goes back to the pool when the last open
/// handle closes or drops.
///
/// Closing a closed primary is a no-op while closing a closed duplicate is
/// rejected with [`BufferError::AlreadyClosed`]. A closed handle reads as empty.
///
/// Bytes are written through [`spare_mut`](Self::spare_mut) and published with
/// [`commit`](Self::commit); reading goes through [`Buf`].
#[derive(Debug)]
pub struct PooledBuffer {
    slot: Option<Arc<Slot>>,
    kind: HandleKind,
    pos: usize,
    limit: usize,
}

impl PooledBuffer {
    pub(crate) fn new(data: Box<[u8]>, pool: Weak<PoolInner>) -> Self {
        Self { slot: Some(Arc::new(Slot::new(data, pool))), kind: HandleKind::Primary, pos: 0, limit: 0 }
    }

    /// Creates a second handle over the same storage with the same read window.
    pub fn duplicate(&self) -> Result<PooledBuffer, BufferError> {
        let slot = self.slot.as_ref().ok_or(BufferError::AlreadyClosed)?;
        Ok(Self { slot: Some(Arc::clone(slot)), kind: HandleKind::Duplicate, pos: self.pos, limit: self.limit })
    }

    /// Releases this handle's claim on the storage.
    pub fn close(&mut self) -> Result<(), BufferError> {
        match (self.slot.take(), self.kind) {
            (Some(_), _) | (None, HandleKind::Primary) => Ok(()),
            (None, HandleKind::Duplicate) => Err(BufferError::AlreadyClosed),
        }
    }

    pub fn is_open(&self) -> bool {
        self.slot.is_some()
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == HandleKind::Duplicate
    }

    /// Number of open handles sharing this storage, zero once this handle is closed.
    pub fn reference_count(&self) -> usize {
        self.slot.as_ref().map_or(0, Arc::strong_count)
    }

    pub fn capacity(&self) -> usize {
        self.slot.as_ref().map_or(0, |slot| slot.data.len())
    }

    /// The writable tail past the readable window.
    ///
    /// Only available while this is the sole open handle on the storage.
    pub fn spare_mut(&mut self) -> Result<&mut [u8], BufferError> {
        let slot = self.slot.as_mut().ok_or(BufferError::AlreadyClosed)?;
        let handles = Arc::strong_count(slot);
        let slot = Arc::get_mut(slot).ok_or(BufferError::Shared { handles })?;
        Ok(&mut slot.data[self.limit..])
    }

    /// Extends the readable window by `n` bytes written through [`spare_mut`](Self::spare_mut).
    pub fn commit(&mut self, n: usize) {
        self.limit = (self.limit + n).min(self.capacity());
    }

    /// Resets the read window to empty.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.limit = 0;
    }
}

impl Buf for PooledBuffer {
    fn remaining(&self) -> usize {
        if self.slot.is_some() { self.limit - self.pos } else { 0 }
    }

    fn chunk(&self) -> &[u8] {
        match &self.slot {
            Some(slot) => &slot.data[self.pos..self.limit],
            None => &[],
        }
    }

    fn advance(&mut self, cnt: usize) {
        self.pos = (self.pos + cnt).min(self.limit);
    }
}
