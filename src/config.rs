//! Setup negotiation and engine options
//!
//! The caller requests a rate, channel count and half-buffer size. The
//! negotiated format always uses one byte per sample, and the half-buffer
//! size is silently corrected to a positive multiple of 4 frames.

use crate::hardware::Interpolation;
use crate::{DspBufError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Half-buffer size used when the caller asks for 0 frames
pub const DEFAULT_FRAMES_PER_HALF: usize = 4096;

/// Sample width the hardware format is negotiated to
pub const NEGOTIATED_SAMPLE_WIDTH: usize = 1;

/// Largest half-buffer the negotiation hands out; bigger requests are clamped
pub const MAX_FRAMES_PER_HALF: usize = 1 << 20;

/// DMA transfers work on groups of 4 frames
const FRAME_ALIGN_MASK: usize = !0x3;

/// Audio stream format and buffer geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfiguration {
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// 1 (mono) or 2 (stereo)
    pub channel_count: u16,
    /// Bytes per sample (per channel)
    #[serde(default = "negotiated_width")]
    pub sample_width_bytes: usize,
    /// Frames in one half of the double buffer
    #[serde(default)]
    pub frames_per_half_buffer: usize,
}

fn negotiated_width() -> usize {
    NEGOTIATED_SAMPLE_WIDTH
}

impl AudioConfiguration {
    /// Create a request with the negotiated sample width
    pub fn new(sample_rate_hz: u32, channel_count: u16, frames_per_half_buffer: usize) -> Self {
        AudioConfiguration {
            sample_rate_hz,
            channel_count,
            sample_width_bytes: NEGOTIATED_SAMPLE_WIDTH,
            frames_per_half_buffer,
        }
    }

    /// Negotiate this request into the format the hardware will run with.
    ///
    /// The half-buffer size is normalized (see [`normalize_frames`]) and the
    /// sample width is forced to [`NEGOTIATED_SAMPLE_WIDTH`] whatever was
    /// requested.
    ///
    /// # Errors
    ///
    /// Returns [`DspBufError::ConfigError`] if the sample rate is 0 or the
    /// channel count is not 1 or 2.
    pub fn normalized(&self) -> Result<Self> {
        if self.sample_rate_hz == 0 {
            return Err(DspBufError::ConfigError(
                "sample rate must be greater than 0".into(),
            ));
        }
        if !matches!(self.channel_count, 1 | 2) {
            return Err(DspBufError::ConfigError(format!(
                "channel count must be 1 or 2, got {}",
                self.channel_count
            )));
        }

        Ok(AudioConfiguration {
            sample_rate_hz: self.sample_rate_hz,
            channel_count: self.channel_count,
            sample_width_bytes: NEGOTIATED_SAMPLE_WIDTH,
            frames_per_half_buffer: normalize_frames(self.frames_per_half_buffer),
        })
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.sample_width_bytes * self.channel_count as usize
    }

    /// Bytes in one half-buffer
    pub fn half_len_bytes(&self) -> usize {
        self.frames_per_half_buffer * self.frame_size()
    }

    /// Bytes in the whole double buffer
    pub fn buffer_len_bytes(&self) -> usize {
        2 * self.half_len_bytes()
    }

    /// Frames covered by the hardware read cursor before it wraps
    pub fn cursor_period_frames(&self) -> usize {
        2 * self.frames_per_half_buffer
    }

    /// Worst-case output latency of the double buffer in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.cursor_period_frames() as f32 / self.sample_rate_hz as f32) * 1000.0
    }
}

/// Normalize a requested half-buffer size to a positive multiple of 4.
///
/// 0 (and anything that masks down to 0) selects [`DEFAULT_FRAMES_PER_HALF`];
/// other values lose their low two bits and are capped at [`MAX_FRAMES_PER_HALF`].
pub fn normalize_frames(requested: usize) -> usize {
    match requested.min(MAX_FRAMES_PER_HALF) & FRAME_ALIGN_MASK {
        0 => DEFAULT_FRAMES_PER_HALF,
        aligned => aligned,
    }
}

/// How the dispatcher notices that a half-buffer was drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Completion events sent by the hardware context
    #[default]
    Callback,
    /// Compare the hardware read cursor against the last observed position
    Polling,
}

/// Tunables that are not part of the negotiated format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Drain detection strategy
    pub strategy: DispatchStrategy,
    /// Channel interpolation mode
    pub interpolation: Interpolation,
    /// Master output volume (0.0 to 1.0)
    pub master_volume: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            strategy: DispatchStrategy::Callback,
            interpolation: Interpolation::Polyphase,
            master_volume: 1.0,
        }
    }
}

impl EngineOptions {
    /// Options using cursor polling instead of completion events
    pub fn polling() -> Self {
        EngineOptions {
            strategy: DispatchStrategy::Polling,
            ..Self::default()
        }
    }

    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| DspBufError::ConfigError(format!("bad engine options: {e}")))
    }

    /// Load options from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
