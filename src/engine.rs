//! The audio engine aggregate
//!
//! [`AudioEngine`] owns every piece of the pipeline: the negotiated
//! configuration, the double buffer, the playback engine, the refill
//! dispatcher and the sample generator. The host's frame loop calls
//! [`AudioEngine::pump`] once per emulated frame; the hardware context only
//! ever reports finished halves.

use crate::arena::DeviceArena;
use crate::config::{AudioConfiguration, EngineOptions};
use crate::convert::{convert_sign, SampleWidth, Signedness};
use crate::dispatch::RefillDispatcher;
use crate::double_buffer::{DoubleBuffer, Half, HalfState};
use crate::generator::SampleGenerator;
use crate::hardware::{ChannelParams, PlaybackHardware};
use crate::null::NullAudio;
use crate::playback::PlaybackEngine;
use crate::{DspBufError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Refill counters for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefillStats {
    /// Half-buffers refilled and re-queued
    pub refills: u64,
    /// Bytes produced by the generator
    pub bytes_generated: u64,
    /// Drains that broke A, B, A, B alternation
    pub out_of_order: u64,
}

/// Lifecycle and pull interface shared by real and null backends
pub trait AudioOutput {
    /// Refill whatever the hardware has drained. Returns halves refilled.
    fn pump(&mut self) -> Result<usize>;

    /// Bytes consumed by the hardware since the previous call
    fn available(&mut self) -> usize;

    /// Stop output immediately and silence the buffer
    fn pause(&mut self);

    /// Reconfigure the channel and restart from silence
    fn resume(&mut self) -> Result<()>;

    /// Stop the hardware and release the buffer
    fn teardown(&mut self);

    /// True for the no-op backend
    fn is_null(&self) -> bool {
        false
    }
}

/// Double-buffered playback pipeline
pub struct AudioEngine {
    config: AudioConfiguration,
    options: EngineOptions,
    playback: PlaybackEngine,
    dispatcher: RefillDispatcher,
    generator: Box<dyn SampleGenerator>,
    buffer: Option<Arc<DoubleBuffer>>,
    scratch: Vec<u8>,
    sample_width: SampleWidth,
    last_position: usize,
    paused: bool,
    stats: RefillStats,
}

impl AudioEngine {
    /// Negotiate `requested`, allocate the double buffer, configure the channel
    /// and start it on two silent halves.
    ///
    /// # Errors
    ///
    /// - [`DspBufError::ConfigError`] for a zero rate or a channel count other than 1 or 2
    /// - [`DspBufError::ArenaExhausted`] if the buffer does not fit in `arena`
    /// - [`DspBufError::InitFailed`] if the hardware is unavailable; use
    ///   [`open_output`] to fall back to [`NullAudio`] automatically
    pub fn setup(
        requested: AudioConfiguration,
        options: EngineOptions,
        hardware: Box<dyn PlaybackHardware>,
        arena: Arc<dyn DeviceArena>,
        generator: Box<dyn SampleGenerator>,
    ) -> Result<Self> {
        let config = requested.normalized()?;
        if config.frames_per_half_buffer != requested.frames_per_half_buffer {
            debug!(
                requested = requested.frames_per_half_buffer,
                frames = config.frames_per_half_buffer,
                "half-buffer size normalized"
            );
        }

        let buffer = Arc::new(DoubleBuffer::allocate(arena, config.half_len_bytes())?);
        let (dispatcher, completions) =
            RefillDispatcher::new(options.strategy, config.frames_per_half_buffer);
        let params = ChannelParams::from_config(&config, &options);

        let mut playback = PlaybackEngine::open(hardware, params, &buffer, completions)?;
        playback.configure(params)?;
        playback.start(&buffer)?;

        debug!(
            backend = playback.backend_name(),
            rate = config.sample_rate_hz,
            channels = config.channel_count,
            frames = config.frames_per_half_buffer,
            bytes = buffer.size_bytes(),
            strategy = ?options.strategy,
            "audio engine started"
        );

        Ok(AudioEngine {
            config,
            options,
            playback,
            dispatcher,
            generator,
            scratch: vec![0u8; config.half_len_bytes()],
            sample_width: SampleWidth::from_bytes(config.sample_width_bytes)
                .unwrap_or(SampleWidth::Bits8),
            buffer: Some(buffer),
            last_position: 0,
            paused: false,
            stats: RefillStats::default(),
        })
    }

    /// Negotiated configuration
    pub fn config(&self) -> &AudioConfiguration {
        &self.config
    }

    /// Options the engine was started with
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Channel parameters currently applied
    pub fn channel_params(&self) -> &ChannelParams {
        self.playback.params()
    }

    /// Refill counters
    pub fn stats(&self) -> RefillStats {
        self.stats
    }

    /// The double buffer, until teardown
    pub fn buffer(&self) -> Option<&Arc<DoubleBuffer>> {
        self.buffer.as_ref()
    }

    /// State of `half`, until teardown
    pub fn half_state(&self, half: Half) -> Option<HalfState> {
        self.buffer.as_ref().map(|b| b.state(half))
    }

    /// Whether output is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether teardown has run
    pub fn is_torn_down(&self) -> bool {
        self.buffer.is_none()
    }

    /// Replace the sample generator; takes effect at the next refill
    pub fn set_generator(&mut self, generator: Box<dyn SampleGenerator>) {
        self.generator = generator;
    }

    /// Refill and re-queue every half the hardware has finished.
    ///
    /// Each drained half is filled with a full half-buffer from the generator,
    /// converted to signed PCM if needed, flushed, and only then queued. A slow
    /// caller just lets the hardware run dry; nothing here blocks on it.
    pub fn pump(&mut self) -> Result<usize> {
        let Some(buffer) = self.buffer.as_ref() else {
            return Err(DspBufError::TornDown);
        };
        if self.paused {
            return Ok(0);
        }

        let playback = &self.playback;
        self.dispatcher.collect(buffer, || playback.sample_position());

        let frames = self.config.frames_per_half_buffer;
        let mut refilled = 0;
        while let Some(half) = self.dispatcher.next_drained() {
            self.generator.generate(frames, &mut self.scratch);
            if self.generator.signedness() == Signedness::Unsigned {
                convert_sign(&mut self.scratch, self.sample_width);
            }
            buffer.fill_half(half, &self.scratch)?;
            self.playback.queue_half(buffer, half)?;

            refilled += 1;
            self.stats.refills += 1;
            self.stats.bytes_generated += self.scratch.len() as u64;
            trace!(%half, refills = self.stats.refills, "half refilled");
        }
        self.stats.out_of_order = self.dispatcher.out_of_order();
        Ok(refilled)
    }

    /// Bytes the hardware consumed since the previous call.
    ///
    /// For pull-style callers that size their own writes instead of relying
    /// on [`pump`](Self::pump).
    pub fn available(&mut self) -> usize {
        if self.buffer.is_none() {
            return 0;
        }
        let period = self.config.cursor_period_frames();
        let position = self.playback.sample_position() % period;
        let frames = (position + period - self.last_position) % period;
        self.last_position = position;
        frames * self.config.frame_size()
    }

    /// Stop output immediately; both halves become silent
    pub fn pause(&mut self) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        if self.paused {
            return;
        }
        self.playback.pause(buffer);
        self.dispatcher.reset();
        self.last_position = 0;
        self.paused = true;
    }

    /// Re-apply the channel configuration and re-queue both halves from silence
    pub fn resume(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer.as_ref() else {
            return Err(DspBufError::TornDown);
        };
        self.playback.reapply(buffer)?;
        // Forget old completions before requeueing: the first half may drain at once
        self.dispatcher.reset();
        self.last_position = 0;
        self.playback.start(buffer)?;
        self.paused = false;
        debug!("audio engine resumed");
        Ok(())
    }

    /// Stop the hardware, wait for it to let go, then free the buffer.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn teardown(&mut self) {
        if self.buffer.is_none() {
            return;
        }
        self.playback.teardown();
        self.dispatcher.reset();
        // The hardware only held a weak reference; this frees the arena block
        self.buffer = None;
        debug!(refills = self.stats.refills, "audio engine torn down");
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl AudioOutput for AudioEngine {
    fn pump(&mut self) -> Result<usize> {
        AudioEngine::pump(self)
    }

    fn available(&mut self) -> usize {
        AudioEngine::available(self)
    }

    fn pause(&mut self) {
        AudioEngine::pause(self)
    }

    fn resume(&mut self) -> Result<()> {
        AudioEngine::resume(self)
    }

    fn teardown(&mut self) {
        AudioEngine::teardown(self)
    }
}

/// Set up an [`AudioEngine`], or a [`NullAudio`] if the hardware will not start.
///
/// Configuration and allocation errors are still returned.
pub fn open_output(
    requested: AudioConfiguration,
    options: EngineOptions,
    hardware: Box<dyn PlaybackHardware>,
    arena: Arc<dyn DeviceArena>,
    generator: Box<dyn SampleGenerator>,
) -> Result<Box<dyn AudioOutput>> {
    match AudioEngine::setup(requested, options, hardware, arena, generator) {
        Ok(engine) => Ok(Box::new(engine)),
        Err(DspBufError::InitFailed(reason)) => {
            warn!(%reason, "audio hardware unavailable, using null output");
            Ok(Box::new(NullAudio::new()))
        }
        Err(err) => Err(err),
    }
}
