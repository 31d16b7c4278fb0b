//! Host playback through rodio
//!
//! The rodio mixer thread plays the role of the DSP: it pulls frames from a
//! [`ChannelTap`] in batches, which drains queued halves and sends completion
//! events from that thread.

use super::channel::{ChannelTap, SoftwareChannel};
use super::{ChannelParams, CompletionSender, PlaybackHardware};
use crate::double_buffer::{DoubleBuffer, Half};
use crate::{DspBufError, Result};
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use std::sync::Weak;
use std::time::Duration;
use tracing::debug;

/// Frames pulled from the channel per batch (reduces lock traffic)
const BATCH_FRAMES: usize = 256;

/// Audio source that drains the software channel
struct TapSource {
    tap: ChannelTap,
    params: ChannelParams,
    bytes: Vec<u8>,
    samples: Vec<f32>,
    pos: usize,
}

impl TapSource {
    fn new(tap: ChannelTap, params: ChannelParams) -> Self {
        TapSource {
            tap,
            params,
            bytes: Vec::with_capacity(BATCH_FRAMES * params.frame_size()),
            samples: Vec::with_capacity(BATCH_FRAMES * params.channels as usize),
            pos: 0,
        }
    }

    fn refill(&mut self) -> bool {
        if !self.tap.is_live() {
            return false;
        }
        self.bytes.clear();
        self.samples.clear();
        self.tap.render(BATCH_FRAMES, &mut self.bytes);
        self.params.encoding.decode_into(&self.bytes, &mut self.samples);

        let channels = self.params.channels.max(1) as usize;
        for (i, sample) in self.samples.iter_mut().enumerate() {
            *sample *= self.params.gain(i % channels);
        }
        self.pos = 0;
        !self.samples.is_empty()
    }
}

impl Iterator for TapSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.samples.len() && !self.refill() {
            // Channel shut down: end the stream
            return None;
        }
        let sample = self.samples[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for TapSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.params.channels
    }

    fn sample_rate(&self) -> u32 {
        self.params.sample_rate_hz
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Playback channel on the host's default output device
pub struct RodioHardware {
    channel: SoftwareChannel,
    tap: ChannelTap,
    stream: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
}

impl RodioHardware {
    /// Create an unopened device; the output stream is opened by `init`
    pub fn new() -> Self {
        let (channel, tap) = SoftwareChannel::new();
        RodioHardware {
            channel,
            tap,
            stream: None,
            sink: None,
        }
    }
}

impl Default for RodioHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackHardware for RodioHardware {
    fn init(&mut self) -> Result<()> {
        let stream = OutputStream::try_default()
            .map_err(|e| DspBufError::InitFailed(format!("Failed to create audio stream: {e}")))?;
        self.channel.init()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn attach(&mut self, buffer: Weak<DoubleBuffer>, completions: CompletionSender) {
        self.channel.attach(buffer, completions);
    }

    fn apply(&mut self, params: &ChannelParams) -> Result<()> {
        self.channel.apply(params)?;

        let Some((_, handle)) = self.stream.as_ref() else {
            return Err(DspBufError::AudioDeviceError("output stream not open".into()));
        };
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        let sink = Sink::try_new(handle)
            .map_err(|e| DspBufError::AudioDeviceError(format!("Failed to create audio sink: {e}")))?;
        sink.append(TapSource::new(self.tap.clone(), *params));
        sink.play();
        self.sink = Some(sink);
        debug!(rate = params.sample_rate_hz, channels = params.channels, "rodio channel configured");
        Ok(())
    }

    fn queue(&mut self, half: Half) -> Result<()> {
        self.channel.queue(half)
    }

    fn clear(&mut self) {
        self.channel.clear();
    }

    fn sample_position(&self) -> usize {
        self.channel.sample_position()
    }

    fn shutdown(&mut self) {
        self.channel.shutdown();
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.stream = None;
    }

    fn name(&self) -> &'static str {
        "rodio"
    }
}
