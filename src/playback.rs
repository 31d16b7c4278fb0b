//! Channel configuration and half-buffer queueing
//!
//! [`PlaybackEngine`] owns the hardware channel and keeps the rules for
//! talking to it: only fully filled and flushed halves are queued, pause
//! empties the channel before the halves are silenced, and teardown stops the
//! channel before the buffer can be freed.

use crate::double_buffer::{DoubleBuffer, Half, HalfState};
use crate::hardware::{ChannelParams, CompletionSender, PlaybackHardware};
use crate::{DspBufError, Result};
use std::sync::Arc;
use tracing::debug;

/// Hardware channel plus the parameters it runs with
pub struct PlaybackEngine {
    hardware: Box<dyn PlaybackHardware>,
    params: ChannelParams,
    released: bool,
}

impl PlaybackEngine {
    /// Initialize `hardware` and hand it non-owning access to `buffer`.
    ///
    /// # Errors
    ///
    /// Propagates [`DspBufError::InitFailed`] from the hardware.
    pub fn open(
        mut hardware: Box<dyn PlaybackHardware>,
        params: ChannelParams,
        buffer: &Arc<DoubleBuffer>,
        completions: CompletionSender,
    ) -> Result<Self> {
        hardware.init()?;
        hardware.attach(Arc::downgrade(buffer), completions);
        debug!(backend = hardware.name(), "playback hardware initialized");
        Ok(PlaybackEngine {
            hardware,
            params,
            released: false,
        })
    }

    /// Parameters currently applied
    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    /// Backend name
    pub fn backend_name(&self) -> &'static str {
        self.hardware.name()
    }

    /// Hardware read cursor in frames
    pub fn sample_position(&self) -> usize {
        self.hardware.sample_position()
    }

    /// Reset the channel and apply `params` (rate, channels, encoding, interpolation, mix)
    pub fn configure(&mut self, params: ChannelParams) -> Result<()> {
        self.ensure_live()?;
        self.hardware.apply(&params)?;
        self.params = params;
        Ok(())
    }

    /// Hand `half` to the hardware.
    ///
    /// # Errors
    ///
    /// [`DspBufError::NotQueueable`] unless the half is freshly filled and
    /// flushed (state [`HalfState::Queued`]).
    pub fn queue_half(&mut self, buffer: &DoubleBuffer, half: Half) -> Result<()> {
        self.ensure_live()?;
        let state = buffer.state(half);
        if state != HalfState::Queued {
            return Err(DspBufError::NotQueueable { half, state });
        }
        self.hardware.queue(half)
    }

    /// Prime both halves with silence and queue them, A first
    pub fn start(&mut self, buffer: &DoubleBuffer) -> Result<()> {
        for half in Half::BOTH {
            buffer.prime_silence(half)?;
            self.queue_half(buffer, half)?;
        }
        Ok(())
    }

    /// Stop output now: drop queued halves and silence both halves
    pub fn pause(&mut self, buffer: &DoubleBuffer) {
        if self.released {
            return;
        }
        self.hardware.clear();
        buffer.reset_silent();
        debug!("playback paused");
    }

    /// Re-apply the channel configuration and silence both halves without queueing them.
    ///
    /// Completion state tied to the old queue must be discarded before
    /// [`start`](Self::start), since the hardware may finish a half as soon
    /// as it is queued.
    pub fn reapply(&mut self, buffer: &DoubleBuffer) -> Result<()> {
        self.ensure_live()?;
        self.hardware.apply(&self.params)?;
        // The channel forgot its queue; anything not yet silent is stale
        buffer.reset_silent();
        Ok(())
    }

    /// Re-apply the channel configuration and restart from two silent halves
    pub fn resume(&mut self, buffer: &DoubleBuffer) -> Result<()> {
        self.reapply(buffer)?;
        self.start(buffer)?;
        debug!("playback resumed");
        Ok(())
    }

    /// Stop the channel and wait for the hardware context to let go of the buffer.
    ///
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.hardware.shutdown();
        self.released = true;
        debug!(backend = self.hardware.name(), "playback hardware released");
    }

    /// Whether teardown has run
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            Err(DspBufError::TornDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}
