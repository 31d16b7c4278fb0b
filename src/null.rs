//! No-op audio backend
//!
//! Used when the playback hardware cannot be initialized: every lifecycle
//! call succeeds, nothing is ever consumed, nothing is ever refilled.

use crate::engine::AudioOutput;
use crate::Result;

/// Backend that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudio;

impl NullAudio {
    /// Create a null backend
    pub fn new() -> Self {
        NullAudio
    }
}

impl AudioOutput for NullAudio {
    fn pump(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn available(&mut self) -> usize {
        0
    }

    fn pause(&mut self) {}

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn teardown(&mut self) {}

    fn is_null(&self) -> bool {
        true
    }
}
