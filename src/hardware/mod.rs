//! Playback channel abstraction
//!
//! [`PlaybackHardware`] is the seam to the DSP playback channel: it is told
//! the channel parameters, given non-owning access to the double buffer, and
//! fed half-buffers in order. When it finishes a half it reports it through a
//! bounded completion channel instead of touching producer state.

pub mod channel;
#[cfg(feature = "streaming")]
pub mod rodio_device;

pub use channel::{ChannelTap, SoftwareChannel};
#[cfg(feature = "streaming")]
pub use rodio_device::RodioHardware;

use crate::config::{AudioConfiguration, EngineOptions};
use crate::double_buffer::{DoubleBuffer, Half};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Weak;

/// Number of lanes in a channel mix (front, back and aux pairs)
pub const MIX_LANES: usize = 12;

/// Sender half of the completion handoff, used from the hardware context
pub type CompletionSender = crossbeam_channel::Sender<Half>;

/// Speaker layout of the output stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Single output channel
    Mono,
    /// Left/right output
    Stereo,
}

/// Interpolation used by the channel's sample-rate converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest sample
    None,
    /// Linear interpolation
    Linear,
    /// Polyphase filter
    #[default]
    Polyphase,
}

/// PCM encoding of the queued data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleEncoding {
    /// Signed 8-bit
    Pcm8,
    /// Signed 16-bit little-endian
    Pcm16,
}

impl SampleEncoding {
    /// Encoding for a sample width in bytes (anything but 2 is 8-bit)
    pub fn from_width(bytes: usize) -> Self {
        if bytes == 2 {
            SampleEncoding::Pcm16
        } else {
            SampleEncoding::Pcm8
        }
    }

    /// Bytes per sample
    pub fn bytes(self) -> usize {
        match self {
            SampleEncoding::Pcm8 => 1,
            SampleEncoding::Pcm16 => 2,
        }
    }

    /// Decode signed PCM bytes to normalized samples in [-1.0, 1.0)
    pub fn decode_into(self, bytes: &[u8], out: &mut Vec<f32>) {
        match self {
            SampleEncoding::Pcm8 => {
                out.extend(bytes.iter().map(|&b| (b as i8) as f32 / 128.0));
            }
            SampleEncoding::Pcm16 => {
                out.extend(
                    bytes
                        .chunks_exact(2)
                        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0),
                );
            }
        }
    }
}

/// Everything the channel needs to be (re)configured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelParams {
    /// Playback rate in Hz
    pub sample_rate_hz: u32,
    /// Interleaved channels in the data
    pub channels: u16,
    /// Sample encoding
    pub encoding: SampleEncoding,
    /// Rate converter interpolation
    pub interpolation: Interpolation,
    /// Speaker layout
    pub output_mode: OutputMode,
    /// Number of output stages in use
    pub output_count: u8,
    /// Master output volume
    pub master_volume: f32,
    /// Per-lane gains; lanes 0 and 1 are front left/right
    pub mix: [f32; MIX_LANES],
    /// Frames in one half-buffer
    pub frames_per_half: usize,
}

impl ChannelParams {
    /// Derive channel parameters from a negotiated configuration
    pub fn from_config(config: &AudioConfiguration, options: &EngineOptions) -> Self {
        let mut mix = [0.0; MIX_LANES];
        mix[0] = 1.0;
        mix[1] = 1.0;

        ChannelParams {
            sample_rate_hz: config.sample_rate_hz,
            channels: config.channel_count,
            encoding: SampleEncoding::from_width(config.sample_width_bytes),
            interpolation: options.interpolation,
            output_mode: if config.channel_count == 2 {
                OutputMode::Stereo
            } else {
                OutputMode::Mono
            },
            output_count: 1,
            master_volume: options.master_volume.clamp(0.0, 1.0),
            mix,
            frames_per_half: config.frames_per_half_buffer,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.encoding.bytes() * self.channels as usize
    }

    /// Bytes per half-buffer
    pub fn half_len_bytes(&self) -> usize {
        self.frames_per_half * self.frame_size()
    }

    /// Output gain for interleaved channel `channel`
    pub fn gain(&self, channel: usize) -> f32 {
        let lane = match self.output_mode {
            OutputMode::Mono => 0,
            OutputMode::Stereo => channel.min(1),
        };
        self.mix[lane] * self.master_volume
    }
}

/// A DSP playback channel that drains queued half-buffers
pub trait PlaybackHardware {
    /// Bring up the audio engine.
    ///
    /// # Errors
    ///
    /// [`DspBufError::InitFailed`](crate::DspBufError::InitFailed) if the
    /// hardware is unavailable; the caller should fall back to a null backend.
    fn init(&mut self) -> Result<()>;

    /// Give the channel non-owning access to the buffer and a completion sender
    fn attach(&mut self, buffer: Weak<DoubleBuffer>, completions: CompletionSender);

    /// Reset the channel and apply rate, format, mix, interpolation and output mode.
    ///
    /// Drops anything still queued.
    fn apply(&mut self, params: &ChannelParams) -> Result<()>;

    /// Append `half` to the channel's play queue
    fn queue(&mut self, half: Half) -> Result<()>;

    /// Drop all queued and in-flight halves, stopping output immediately
    fn clear(&mut self);

    /// Current read position in frames, in `[0, 2 * frames_per_half)`
    fn sample_position(&self) -> usize;

    /// Stop the channel and wait until the hardware context has let go.
    ///
    /// After this returns no completion is sent and the buffer is never read again.
    fn shutdown(&mut self);

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
