//! Software model of a DSP playback channel
//!
//! [`SoftwareChannel`] is the producer-facing half (configuration, queueing,
//! shutdown). [`ChannelTap`] is the consumer-facing half: whoever plays the
//! audio (a host audio callback, a test, a timer thread) calls
//! [`ChannelTap::render`] from its own context to drain queued halves. All
//! channel state sits behind one mutex, so `shutdown` returning means no
//! render is in flight and none will read the buffer again.

use super::{ChannelParams, CompletionSender, PlaybackHardware};
use crate::double_buffer::{DoubleBuffer, Half};
use crate::{DspBufError, Result};
use crossbeam_channel::TrySendError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

#[derive(Debug)]
struct ChannelCore {
    live: bool,
    initialized: bool,
    params: Option<ChannelParams>,
    buffer: Weak<DoubleBuffer>,
    completions: Option<CompletionSender>,
    queue: VecDeque<Half>,
    current: Option<Half>,
    /// Bytes already read from `current`
    offset: usize,
    /// Read cursor in frames over both halves
    position: usize,
    starved_frames: u64,
    completed_halves: u64,
    dropped_completions: u64,
}

impl ChannelCore {
    fn new() -> Self {
        ChannelCore {
            live: true,
            initialized: false,
            params: None,
            buffer: Weak::new(),
            completions: None,
            queue: VecDeque::new(),
            current: None,
            offset: 0,
            position: 0,
            starved_frames: 0,
            completed_halves: 0,
            dropped_completions: 0,
        }
    }

    fn stop_reading(&mut self) {
        self.queue.clear();
        self.current = None;
        self.offset = 0;
        self.position = 0;
    }

    /// Start the next queued half, if any
    fn start_next(&mut self, buffer: &DoubleBuffer, frames_per_half: usize) -> Option<Half> {
        while let Some(half) = self.queue.pop_front() {
            if buffer.mark_playing(half) {
                self.current = Some(half);
                self.offset = 0;
                self.position = half.index() * frames_per_half;
                return Some(half);
            }
            warn!(%half, state = %buffer.state(half), "skipping half that is not queued");
        }
        None
    }

    fn render(&mut self, frames: usize, out: &mut Vec<u8>) -> usize {
        let Some(params) = self.params else {
            return 0;
        };
        let frame_size = params.frame_size();
        let half_len = params.half_len_bytes();
        let period = 2 * params.frames_per_half;
        let mut remaining = frames * frame_size;

        let buffer = if self.live { self.buffer.upgrade() } else { None };
        let Some(buffer) = buffer else {
            out.resize(out.len() + remaining, 0);
            return 0;
        };

        let mut played = 0;
        while remaining > 0 {
            let half = match self.current {
                Some(half) => half,
                None => match self.start_next(&buffer, params.frames_per_half) {
                    Some(half) => half,
                    None => {
                        // Underrun: nothing queued, output silence and hold the cursor
                        self.starved_frames += (remaining / frame_size) as u64;
                        out.resize(out.len() + remaining, 0);
                        break;
                    }
                },
            };

            let start = out.len();
            let want = remaining.min(half_len - self.offset);
            out.resize(start + want, 0);
            let copied = buffer.read_half(half, self.offset, &mut out[start..]);
            out.truncate(start + copied);
            if copied == 0 {
                out.resize(out.len() + remaining, 0);
                break;
            }

            self.offset += copied;
            remaining -= copied;
            played += copied / frame_size;
            self.position = half.index() * params.frames_per_half + self.offset / frame_size;

            if self.offset >= half_len {
                self.current = None;
                self.offset = 0;
                self.position = ((half.index() + 1) * params.frames_per_half) % period;
                self.completed_halves += 1;
                trace!(%half, "half finished");
                if let Some(tx) = &self.completions {
                    match tx.try_send(half) {
                        Ok(()) => {}
                        // One slot per half: a full channel means events were left unconsumed
                        Err(TrySendError::Full(_)) => {
                            self.dropped_completions += 1;
                            warn!(%half, "completion channel full, event dropped");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            trace!(%half, "completion receiver gone");
                        }
                    }
                }
            }
        }
        played
    }
}

/// Producer-facing handle of a software playback channel
#[derive(Debug)]
pub struct SoftwareChannel {
    core: Arc<Mutex<ChannelCore>>,
    available: bool,
}

impl SoftwareChannel {
    /// Create a channel and the tap its consumer drains it through
    pub fn new() -> (Self, ChannelTap) {
        let core = Arc::new(Mutex::new(ChannelCore::new()));
        let tap = ChannelTap {
            core: Arc::clone(&core),
        };
        (
            SoftwareChannel {
                core,
                available: true,
            },
            tap,
        )
    }

    /// A channel whose `init` fails, as when the audio engine is missing
    pub fn unavailable() -> (Self, ChannelTap) {
        let (mut channel, tap) = Self::new();
        channel.available = false;
        (channel, tap)
    }
}

impl PlaybackHardware for SoftwareChannel {
    fn init(&mut self) -> Result<()> {
        if !self.available {
            return Err(DspBufError::InitFailed(
                "software channel marked unavailable".into(),
            ));
        }
        self.core.lock().initialized = true;
        Ok(())
    }

    fn attach(&mut self, buffer: Weak<DoubleBuffer>, completions: CompletionSender) {
        let mut core = self.core.lock();
        core.buffer = buffer;
        core.completions = Some(completions);
    }

    fn apply(&mut self, params: &ChannelParams) -> Result<()> {
        let mut core = self.core.lock();
        if !core.live {
            return Err(DspBufError::TornDown);
        }
        if !core.initialized {
            return Err(DspBufError::AudioDeviceError(
                "channel configured before init".into(),
            ));
        }
        core.stop_reading();
        core.params = Some(*params);
        Ok(())
    }

    fn queue(&mut self, half: Half) -> Result<()> {
        let mut core = self.core.lock();
        if !core.live {
            return Err(DspBufError::TornDown);
        }
        if core.params.is_none() {
            return Err(DspBufError::AudioDeviceError(
                "half queued on an unconfigured channel".into(),
            ));
        }
        core.queue.push_back(half);
        Ok(())
    }

    fn clear(&mut self) {
        self.core.lock().stop_reading();
    }

    fn sample_position(&self) -> usize {
        self.core.lock().position
    }

    fn shutdown(&mut self) {
        // Taking the lock waits out any render in progress
        let mut core = self.core.lock();
        core.live = false;
        core.stop_reading();
        core.completions = None;
        core.buffer = Weak::new();
    }

    fn name(&self) -> &'static str {
        "software"
    }
}

/// Consumer-facing handle of a software playback channel
#[derive(Debug, Clone)]
pub struct ChannelTap {
    core: Arc<Mutex<ChannelCore>>,
}

impl ChannelTap {
    /// Drain `frames` frames of output into `out`.
    ///
    /// Exactly `frames * frame_size` bytes are appended once the channel is
    /// configured; frames with nothing queued are silence. Returns the number
    /// of frames that came from the buffer.
    pub fn render(&self, frames: usize, out: &mut Vec<u8>) -> usize {
        self.core.lock().render(frames, out)
    }

    /// Current read cursor in frames
    pub fn position(&self) -> usize {
        self.core.lock().position
    }

    /// Halves currently waiting in the play queue (not counting the one playing)
    pub fn queued(&self) -> Vec<Half> {
        self.core.lock().queue.iter().copied().collect()
    }

    /// Half being read right now
    pub fn current(&self) -> Option<Half> {
        self.core.lock().current
    }

    /// Frames rendered as silence because nothing was queued
    pub fn starved_frames(&self) -> u64 {
        self.core.lock().starved_frames
    }

    /// Halves played to the end
    pub fn completed_halves(&self) -> u64 {
        self.core.lock().completed_halves
    }

    /// Completion events that did not fit in the channel
    pub fn dropped_completions(&self) -> u64 {
        self.core.lock().dropped_completions
    }

    /// Parameters last applied to the channel
    pub fn params(&self) -> Option<ChannelParams> {
        self.core.lock().params
    }

    /// False once the channel has been shut down
    pub fn is_live(&self) -> bool {
        self.core.lock().live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::LinearArena;
    use crate::config::{AudioConfiguration, EngineOptions};
    use crate::double_buffer::HalfState;

    fn setup(frames: usize) -> (SoftwareChannel, ChannelTap, Arc<DoubleBuffer>, crossbeam_channel::Receiver<Half>) {
        let cfg = AudioConfiguration::new(8000, 1, frames).normalized().unwrap();
        let params = ChannelParams::from_config(&cfg, &EngineOptions::default());
        let buffer = Arc::new(
            DoubleBuffer::allocate(Arc::new(LinearArena::new(1 << 16)), cfg.half_len_bytes()).unwrap(),
        );
        let (tx, rx) = crossbeam_channel::bounded(2);
        let (mut channel, tap) = SoftwareChannel::new();
        channel.init().unwrap();
        channel.attach(Arc::downgrade(&buffer), tx);
        channel.apply(&params).unwrap();
        (channel, tap, buffer, rx)
    }

    #[test]
    fn test_plays_queued_halves_in_order() {
        let (mut channel, tap, buffer, rx) = setup(4);
        buffer.fill_half(Half::A, &[1; 4]).unwrap();
        buffer.fill_half(Half::B, &[2; 4]).unwrap();
        channel.queue(Half::A).unwrap();
        channel.queue(Half::B).unwrap();

        let mut out = Vec::new();
        assert_eq!(tap.render(6, &mut out), 6);
        assert_eq!(out, vec![1, 1, 1, 1, 2, 2]);
        assert_eq!(buffer.state(Half::A), HalfState::Playing);
        assert_eq!(buffer.state(Half::B), HalfState::Playing);
        assert_eq!(rx.try_recv().unwrap(), Half::A);
        assert!(rx.try_recv().is_err());
        assert_eq!(tap.position(), 6);
    }

    #[test]
    fn test_underrun_outputs_silence_and_holds_cursor() {
        let (mut channel, tap, buffer, rx) = setup(4);
        buffer.fill_half(Half::A, &[5; 4]).unwrap();
        channel.queue(Half::A).unwrap();

        let mut out = Vec::new();
        assert_eq!(tap.render(8, &mut out), 4);
        assert_eq!(out, vec![5, 5, 5, 5, 0, 0, 0, 0]);
        assert_eq!(tap.starved_frames(), 4);
        assert_eq!(tap.position(), 4);
        assert_eq!(rx.try_recv().unwrap(), Half::A);
    }

    #[test]
    fn test_cursor_wraps_after_half_b() {
        let (mut channel, tap, buffer, _rx) = setup(4);
        buffer.prime_silence(Half::A).unwrap();
        buffer.prime_silence(Half::B).unwrap();
        channel.queue(Half::A).unwrap();
        channel.queue(Half::B).unwrap();
        let mut out = Vec::new();
        tap.render(8, &mut out);
        assert_eq!(tap.position(), 0);
        assert_eq!(tap.completed_halves(), 2);
    }

    #[test]
    fn test_clear_stops_output() {
        let (mut channel, tap, buffer, _rx) = setup(4);
        buffer.fill_half(Half::A, &[9; 4]).unwrap();
        channel.queue(Half::A).unwrap();
        let mut out = Vec::new();
        tap.render(1, &mut out);
        channel.clear();
        out.clear();
        assert_eq!(tap.render(3, &mut out), 0);
        assert_eq!(out, vec![0, 0, 0]);
        assert_eq!(tap.current(), None);
    }

    #[test]
    fn test_no_completion_after_shutdown() {
        let (mut channel, tap, buffer, rx) = setup(4);
        buffer.fill_half(Half::A, &[3; 4]).unwrap();
        channel.queue(Half::A).unwrap();
        channel.shutdown();

        let mut out = Vec::new();
        assert_eq!(tap.render(8, &mut out), 0);
        assert!(rx.try_recv().is_err());
        assert!(!tap.is_live());
        assert!(matches!(channel.queue(Half::B), Err(DspBufError::TornDown)));
    }

    #[test]
    fn test_full_completion_channel_is_counted() {
        let (mut channel, tap, buffer, rx) = setup(4);
        buffer.fill_half(Half::A, &[1; 4]).unwrap();
        buffer.fill_half(Half::B, &[2; 4]).unwrap();
        channel.queue(Half::A).unwrap();
        channel.queue(Half::B).unwrap();
        let mut out = Vec::new();
        tap.render(8, &mut out);
        assert_eq!(tap.dropped_completions(), 0);

        // Both events still pending when A finishes again
        assert!(buffer.mark_drained(Half::A));
        buffer.fill_half(Half::A, &[3; 4]).unwrap();
        channel.queue(Half::A).unwrap();
        tap.render(4, &mut out);
        assert_eq!(tap.dropped_completions(), 1);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Half::A, Half::B]);
    }

    #[test]
    fn test_init_failure() {
        let (mut channel, _tap) = SoftwareChannel::unavailable();
        assert!(matches!(channel.init(), Err(DspBufError::InitFailed(_))));
    }
}
