//! Half-buffer store and state machine
//!
//! One device-visible block split into half A `[0, H)` and half B `[H, 2H)`.
//! Each half carries an atomic state; a transition is the only way to gain the
//! right to touch the half's bytes:
//!
//! ```text
//! Silent/Drained --producer claims--> Filling --fill + flush--> Queued
//! Queued --hardware starts--> Playing --dispatcher sees completion--> Drained
//! ```
//!
//! The sample bytes live behind a mutex that is held only while copying, so
//! the hardware context never waits on sample generation.

use crate::arena::{DeviceArena, DeviceBlock};
use crate::{DspBufError, Result};
use parking_lot::Mutex;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// One of the two halves of the double buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Half {
    /// First half, `[0, H)`
    A,
    /// Second half, `[H, 2H)`
    B,
}

impl Half {
    /// Both halves in playback order
    pub const BOTH: [Half; 2] = [Half::A, Half::B];

    /// 0 for A, 1 for B
    pub fn index(self) -> usize {
        match self {
            Half::A => 0,
            Half::B => 1,
        }
    }

    /// Half from its index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Half::A),
            1 => Some(Half::B),
            _ => None,
        }
    }

    /// The half played after this one
    pub fn other(self) -> Self {
        match self {
            Half::A => Half::B,
            Half::B => Half::A,
        }
    }
}

impl fmt::Display for Half {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Half::A => f.write_str("A"),
            Half::B => f.write_str("B"),
        }
    }
}

/// Lifecycle of a half-buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HalfState {
    /// Zero-filled, never played since setup or pause
    Silent = 0,
    /// Claimed by the producer, bytes being written
    Filling = 1,
    /// Filled and flushed, handed (or about to be handed) to the hardware
    Queued = 2,
    /// Hardware is reading it
    Playing = 3,
    /// Hardware finished it, producer may overwrite
    Drained = 4,
}

impl HalfState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HalfState::Silent,
            1 => HalfState::Filling,
            2 => HalfState::Queued,
            3 => HalfState::Playing,
            _ => HalfState::Drained,
        }
    }

    /// Whether the producer may claim a half in this state
    pub fn is_writable(self) -> bool {
        matches!(self, HalfState::Silent | HalfState::Drained)
    }
}

impl fmt::Display for HalfState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HalfState::Silent => "silent",
            HalfState::Filling => "filling",
            HalfState::Queued => "queued",
            HalfState::Playing => "playing",
            HalfState::Drained => "drained",
        };
        f.write_str(name)
    }
}

/// Two half-buffers in one device-visible block
pub struct DoubleBuffer {
    block: Mutex<Option<DeviceBlock>>,
    arena: Arc<dyn DeviceArena>,
    states: [AtomicU8; 2],
    half_len: usize,
}

impl fmt::Debug for DoubleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleBuffer")
            .field("half_len", &self.half_len)
            .field("a", &self.state(Half::A))
            .field("b", &self.state(Half::B))
            .finish()
    }
}

impl DoubleBuffer {
    /// Allocate `2 * half_len` bytes from `arena`, zero-filled and flushed
    pub fn allocate(arena: Arc<dyn DeviceArena>, half_len: usize) -> Result<Self> {
        let total = half_len.checked_mul(2).ok_or_else(|| {
            DspBufError::ConfigError(format!("half-buffer of {half_len} bytes is too large"))
        })?;
        let block = arena.alloc(total)?;
        arena.flush_for_device(&block, 0..block.len());

        Ok(DoubleBuffer {
            block: Mutex::new(Some(block)),
            arena,
            states: [
                AtomicU8::new(HalfState::Silent as u8),
                AtomicU8::new(HalfState::Silent as u8),
            ],
            half_len,
        })
    }

    /// Bytes in one half
    pub fn half_len(&self) -> usize {
        self.half_len
    }

    /// Bytes in the whole block
    pub fn size_bytes(&self) -> usize {
        2 * self.half_len
    }

    /// Byte range of `half` within the block
    pub fn half_range(&self, half: Half) -> Range<usize> {
        let start = half.index() * self.half_len;
        start..start + self.half_len
    }

    /// Current state of `half`
    pub fn state(&self, half: Half) -> HalfState {
        HalfState::from_u8(self.states[half.index()].load(Ordering::Acquire))
    }

    /// Atomically move `half` from one of `from` to `to`.
    ///
    /// Returns the previous state, or the state that blocked the transition.
    fn transition(
        &self,
        half: Half,
        from: &[HalfState],
        to: HalfState,
    ) -> std::result::Result<HalfState, HalfState> {
        let slot = &self.states[half.index()];
        let mut current = slot.load(Ordering::Acquire);
        loop {
            let state = HalfState::from_u8(current);
            if !from.contains(&state) {
                return Err(state);
            }
            match slot.compare_exchange_weak(current, to as u8, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(state),
                Err(actual) => current = actual,
            }
        }
    }

    /// Claim `half`, let `write` fill its bytes, flush, then publish it as queued.
    fn write_half(&self, half: Half, write: impl FnOnce(&mut [u8])) -> Result<()> {
        let previous = self
            .transition(half, &[HalfState::Silent, HalfState::Drained], HalfState::Filling)
            .map_err(|state| DspBufError::HalfBusy { half, state })?;

        let range = self.half_range(half);
        {
            let mut guard = self.block.lock();
            let Some(block) = guard.as_mut() else {
                self.states[half.index()].store(previous as u8, Ordering::Release);
                return Err(DspBufError::TornDown);
            };
            write(&mut block.as_mut_slice()[range.clone()]);
            self.arena.flush_for_device(block, range);
        }

        self.states[half.index()].store(HalfState::Queued as u8, Ordering::Release);
        Ok(())
    }

    /// Copy a complete half-buffer of samples into `half`.
    ///
    /// The half must be silent or drained. `samples` must be exactly
    /// [`half_len`](Self::half_len) bytes; a partial half is never published.
    pub fn fill_half(&self, half: Half, samples: &[u8]) -> Result<()> {
        if samples.len() != self.half_len {
            return Err(DspBufError::ConfigError(format!(
                "fill of {} bytes does not match half length {}",
                samples.len(),
                self.half_len
            )));
        }
        self.write_half(half, |dst| dst.copy_from_slice(samples))
    }

    /// Zero-fill `half` and publish it as queued
    pub fn prime_silence(&self, half: Half) -> Result<()> {
        self.write_half(half, |dst| dst.fill(0))
    }

    /// Hardware side: `half` started playing. Returns false if it was not queued.
    pub fn mark_playing(&self, half: Half) -> bool {
        self.transition(half, &[HalfState::Queued], HalfState::Playing)
            .is_ok()
    }

    /// Dispatcher side: `half` finished playing. Returns false if it was not playing.
    pub fn mark_drained(&self, half: Half) -> bool {
        self.transition(half, &[HalfState::Playing], HalfState::Drained)
            .is_ok()
    }

    /// Zero both halves, flush, and return them to [`HalfState::Silent`].
    ///
    /// The hardware must not hold either half when this is called.
    pub fn reset_silent(&self) {
        let mut guard = self.block.lock();
        if let Some(block) = guard.as_mut() {
            block.as_mut_slice().fill(0);
            let len = block.len();
            self.arena.flush_for_device(block, 0..len);
        }
        for slot in &self.states {
            slot.store(HalfState::Silent as u8, Ordering::Release);
        }
    }

    /// Hardware side: copy bytes of `half` starting at `offset` into `dest`.
    ///
    /// Returns the number of bytes copied (0 once the block is released).
    pub fn read_half(&self, half: Half, offset: usize, dest: &mut [u8]) -> usize {
        if offset >= self.half_len {
            return 0;
        }
        let guard = self.block.lock();
        let Some(block) = guard.as_ref() else {
            return 0;
        };
        let start = self.half_range(half).start + offset;
        let count = dest.len().min(self.half_len - offset);
        dest[..count].copy_from_slice(&block.as_slice()[start..start + count]);
        count
    }

    /// CPU readback of `half`, invalidated first so device writes are visible.
    ///
    /// Empty once the block is released.
    pub fn snapshot_half(&self, half: Half) -> Vec<u8> {
        let guard = self.block.lock();
        let Some(block) = guard.as_ref() else {
            return Vec::new();
        };
        let range = self.half_range(half);
        self.arena.invalidate_for_cpu(block, range.clone());
        block.as_slice()[range].to_vec()
    }
}

impl Drop for DoubleBuffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.get_mut().take() {
            self.arena.free(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::LinearArena;

    fn store(half_len: usize) -> (Arc<LinearArena>, DoubleBuffer) {
        let arena = Arc::new(LinearArena::new(1 << 20));
        let buffer = DoubleBuffer::allocate(arena.clone(), half_len).unwrap();
        (arena, buffer)
    }

    #[test]
    fn test_allocation_starts_silent() {
        let (arena, buffer) = store(64);
        assert_eq!(buffer.size_bytes(), 128);
        assert_eq!(arena.in_use(), 128);
        for half in Half::BOTH {
            assert_eq!(buffer.state(half), HalfState::Silent);
            assert!(buffer.snapshot_half(half).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_full_lifecycle() {
        let (_arena, buffer) = store(16);
        buffer.fill_half(Half::A, &[7u8; 16]).unwrap();
        assert_eq!(buffer.state(Half::A), HalfState::Queued);
        assert!(buffer.mark_playing(Half::A));
        assert_eq!(buffer.state(Half::A), HalfState::Playing);
        assert!(buffer.mark_drained(Half::A));
        assert_eq!(buffer.state(Half::A), HalfState::Drained);
        buffer.fill_half(Half::A, &[9u8; 16]).unwrap();
        assert_eq!(buffer.snapshot_half(Half::A), vec![9u8; 16]);
        assert_eq!(buffer.snapshot_half(Half::B), vec![0u8; 16]);
    }

    #[test]
    fn test_producer_cannot_write_queued_or_playing() {
        let (_arena, buffer) = store(8);
        buffer.fill_half(Half::B, &[1u8; 8]).unwrap();
        let err = buffer.fill_half(Half::B, &[2u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            DspBufError::HalfBusy { half: Half::B, state: HalfState::Queued }
        ));

        buffer.mark_playing(Half::B);
        let err = buffer.fill_half(Half::B, &[2u8; 8]).unwrap_err();
        assert!(matches!(err, DspBufError::HalfBusy { state: HalfState::Playing, .. }));
        assert_eq!(buffer.snapshot_half(Half::B), vec![1u8; 8]);
    }

    #[test]
    fn test_partial_fill_rejected_without_state_change() {
        let (_arena, buffer) = store(8);
        assert!(buffer.fill_half(Half::A, &[1u8; 5]).is_err());
        assert_eq!(buffer.state(Half::A), HalfState::Silent);
    }

    #[test]
    fn test_transitions_require_expected_state() {
        let (_arena, buffer) = store(8);
        assert!(!buffer.mark_playing(Half::A));
        assert!(!buffer.mark_drained(Half::A));
        buffer.prime_silence(Half::A).unwrap();
        assert!(!buffer.mark_drained(Half::A));
    }

    #[test]
    fn test_every_write_is_flushed() {
        let (arena, buffer) = store(32);
        let before = arena.flush_count();
        buffer.fill_half(Half::A, &[3u8; 32]).unwrap();
        buffer.prime_silence(Half::B).unwrap();
        buffer.reset_silent();
        assert_eq!(arena.flush_count(), before + 3);
    }

    #[test]
    fn test_snapshot_invalidates_before_reading() {
        let (arena, buffer) = store(8);
        buffer.fill_half(Half::A, &[4u8; 8]).unwrap();
        assert_eq!(arena.invalidate_count(), 0);
        assert_eq!(buffer.snapshot_half(Half::A), vec![4u8; 8]);
        assert_eq!(arena.invalidate_count(), 1);
    }

    #[test]
    fn test_reset_silent_clears_data() {
        let (_arena, buffer) = store(8);
        buffer.fill_half(Half::A, &[5u8; 8]).unwrap();
        buffer.mark_playing(Half::A);
        buffer.reset_silent();
        assert_eq!(buffer.state(Half::A), HalfState::Silent);
        assert_eq!(buffer.snapshot_half(Half::A), vec![0u8; 8]);
    }

    #[test]
    fn test_read_half_bounds() {
        let (_arena, buffer) = store(8);
        buffer.fill_half(Half::B, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut dest = [0u8; 16];
        assert_eq!(buffer.read_half(Half::B, 5, &mut dest), 3);
        assert_eq!(&dest[..3], &[6, 7, 8]);
        assert_eq!(buffer.read_half(Half::B, 8, &mut dest), 0);
    }

    #[test]
    fn test_oversized_half_rejected() {
        let arena = Arc::new(LinearArena::new(1 << 20));
        let err = DoubleBuffer::allocate(arena.clone(), usize::MAX).unwrap_err();
        assert!(matches!(err, DspBufError::ConfigError(_)));
        assert_eq!(arena.in_use(), 0);
    }

    #[test]
    fn test_drop_returns_memory() {
        let (arena, buffer) = store(100);
        assert_eq!(arena.in_use(), 200);
        drop(buffer);
        assert_eq!(arena.in_use(), 0);
    }
}
