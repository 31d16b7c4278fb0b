//! Device-visible memory
//!
//! The playback hardware reads sample data by DMA, so the buffer must come
//! from memory the device can see, and every CPU write has to be flushed
//! before the device is told about it.

use crate::{DspBufError, Result};
use std::ops::Range;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// A block of device-visible memory
///
/// Blocks are only created by a [`DeviceArena`] and must be handed back to
/// the same arena with [`DeviceArena::free`].
#[derive(Debug)]
pub struct DeviceBlock {
    bytes: Box<[u8]>,
}

impl DeviceBlock {
    /// Block length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the block is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// CPU view of the block
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable CPU view of the block
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Allocator for memory the playback hardware can DMA from
pub trait DeviceArena: Send + Sync {
    /// Allocate a zero-filled block of `len` bytes
    fn alloc(&self, len: usize) -> Result<DeviceBlock>;

    /// Return a block to the arena
    fn free(&self, block: DeviceBlock);

    /// Make CPU writes to `range` of `block` visible to the device
    fn flush_for_device(&self, block: &DeviceBlock, range: Range<usize>);

    /// Discard stale CPU cache lines for `range` before reading device writes
    fn invalidate_for_cpu(&self, block: &DeviceBlock, range: Range<usize>);
}

/// Bounded linear heap of device-visible memory
///
/// Cache maintenance is modelled with memory fences; flush statistics are
/// kept so callers can verify that no write path skipped the flush.
#[derive(Debug)]
pub struct LinearArena {
    capacity: usize,
    in_use: AtomicUsize,
    flush_count: AtomicUsize,
    flushed_bytes: AtomicUsize,
    invalidate_count: AtomicUsize,
}

impl LinearArena {
    /// Create an arena with room for `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        LinearArena {
            capacity,
            in_use: AtomicUsize::new(0),
            flush_count: AtomicUsize::new(0),
            flushed_bytes: AtomicUsize::new(0),
            invalidate_count: AtomicUsize::new(0),
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently allocated
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Number of flush operations issued
    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::Acquire)
    }

    /// Total bytes flushed
    pub fn flushed_bytes(&self) -> usize {
        self.flushed_bytes.load(Ordering::Acquire)
    }

    /// Number of CPU-side invalidations issued
    pub fn invalidate_count(&self) -> usize {
        self.invalidate_count.load(Ordering::Acquire)
    }
}

impl DeviceArena for LinearArena {
    fn alloc(&self, len: usize) -> Result<DeviceBlock> {
        let reserved = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(len).filter(|&total| total <= self.capacity)
            });

        match reserved {
            Ok(_) => Ok(DeviceBlock {
                bytes: vec![0u8; len].into_boxed_slice(),
            }),
            Err(used) => Err(DspBufError::ArenaExhausted {
                requested: len,
                available: self.capacity.saturating_sub(used),
            }),
        }
    }

    fn free(&self, block: DeviceBlock) {
        self.in_use.fetch_sub(block.len(), Ordering::AcqRel);
    }

    fn flush_for_device(&self, block: &DeviceBlock, range: Range<usize>) {
        debug_assert!(range.end <= block.len());
        fence(Ordering::Release);
        self.flush_count.fetch_add(1, Ordering::AcqRel);
        self.flushed_bytes.fetch_add(range.len(), Ordering::AcqRel);
    }

    fn invalidate_for_cpu(&self, block: &DeviceBlock, range: Range<usize>) {
        debug_assert!(range.end <= block.len());
        fence(Ordering::Acquire);
        self.invalidate_count.fetch_add(1, Ordering::AcqRel);
    }
}
