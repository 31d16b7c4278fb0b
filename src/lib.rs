//! Frame-locked PCM double buffer for DMA-driven DSP playback
//!
//! Bridges a sample generator that runs once per emulated video frame to a
//! hardware playback channel that drains a fixed-size double buffer and
//! reports completion asynchronously.
//!
//! # Features
//! - Setup negotiation with silent normalization of the half-buffer size
//! - Device-visible arena with explicit flush-for-device capability
//! - Two half-buffers guarded by an atomic state machine (single writer per half)
//! - Completion-driven refill (preferred) or cursor polling (fallback)
//! - In-place signed/unsigned bias conversion for 8-bit and 16-bit PCM
//! - Pause/resume/teardown with stop-before-free ordering
//! - Push-style producer path and a null backend for hosts without audio
//!
//! # Crate feature flags
//! - `streaming` (opt-in): Real-time host output via rodio (`RodioHardware`) and the `dspbuf` CLI
//!
//! # Quick start
//! ```no_run
//! use std::sync::Arc;
//! use dspbuf::{
//!     AudioConfiguration, AudioEngine, ConstantGenerator, EngineOptions, LinearArena,
//!     SoftwareChannel,
//! };
//!
//! let (channel, tap) = SoftwareChannel::new();
//! let arena = Arc::new(LinearArena::new(64 * 1024));
//! let mut engine = AudioEngine::setup(
//!     AudioConfiguration::new(22_050, 2, 0),
//!     EngineOptions::default(),
//!     Box::new(channel),
//!     arena,
//!     Box::new(ConstantGenerator::new(0x3C)),
//! )
//! .unwrap();
//!
//! // Hardware side: drain one half-buffer worth of frames
//! let mut out = Vec::new();
//! tap.render(engine.config().frames_per_half_buffer, &mut out);
//!
//! // Producer side: once per video frame
//! engine.pump().unwrap();
//! ```

#![warn(missing_docs)]

pub mod arena; // Device-visible memory
pub mod config; // Setup negotiation and options
pub mod convert; // Sign bias conversion
pub mod dispatch; // Refill detection
pub mod double_buffer; // Half-buffer store and state machine
pub mod engine; // AudioEngine aggregate
pub mod generator; // Sample generator seam
pub mod hardware; // Playback channel abstraction
pub mod null; // No-op backend
pub mod playback; // Channel configuration and queueing
pub mod push; // Push-style producer path

/// Error types for double-buffered playback
#[derive(thiserror::Error, Debug)]
pub enum DspBufError {
    /// The playback hardware could not be initialized
    #[error("Audio hardware initialization failed: {0}")]
    InitFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The device-visible arena cannot satisfy an allocation
    #[error("Device arena exhausted: requested {requested} bytes, {available} available")]
    ArenaExhausted {
        /// Bytes requested
        requested: usize,
        /// Bytes still free in the arena
        available: usize,
    },

    /// A producer tried to write a half that it does not own
    #[error("Half-buffer {half} is {state} and cannot be filled")]
    HalfBusy {
        /// Target half
        half: Half,
        /// State observed at the time of the claim
        state: HalfState,
    },

    /// A half was handed to the hardware before its fill completed
    #[error("Half-buffer {half} is {state} and cannot be queued")]
    NotQueueable {
        /// Target half
        half: Half,
        /// State observed at queue time
        state: HalfState,
    },

    /// The engine was already torn down
    #[error("Audio engine has been torn down")]
    TornDown,

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, DspBufError>;

// Public API exports
pub use arena::{DeviceArena, DeviceBlock, LinearArena};
pub use config::{
    AudioConfiguration, DispatchStrategy, EngineOptions, DEFAULT_FRAMES_PER_HALF,
    MAX_FRAMES_PER_HALF,
};
pub use convert::{convert_sign, SampleWidth, Signedness};
pub use dispatch::{PlaybackCursor, RefillDispatcher};
pub use double_buffer::{DoubleBuffer, Half, HalfState};
pub use engine::{open_output, AudioEngine, AudioOutput, RefillStats};
pub use generator::{ConstantGenerator, FnGenerator, SampleGenerator, Silence, SquareWave};
pub use hardware::{
    ChannelParams, ChannelTap, Interpolation, OutputMode, PlaybackHardware, SampleEncoding,
    SoftwareChannel,
};
#[cfg(feature = "streaming")]
pub use hardware::RodioHardware;
pub use null::NullAudio;
pub use playback::PlaybackEngine;
pub use push::{ByteRing, PushSink, PushSource};
