//! Sample generator seam
//!
//! The emulator's sound core sits behind [`SampleGenerator`]. It owns no
//! buffer memory: each refill hands it a scratch slice of exactly
//! `frames * frame_size` bytes to fill with interleaved PCM.

use crate::convert::Signedness;

/// Producer of raw interleaved PCM bytes
pub trait SampleGenerator: Send {
    /// Fill `dest` with exactly `frames` interleaved frames.
    ///
    /// `dest.len()` is `frames * frame_size` for the negotiated format.
    fn generate(&mut self, frames: usize, dest: &mut [u8]);

    /// Sign representation of the generated samples
    ///
    /// Unsigned output is converted to the hardware's signed format before
    /// it is queued.
    fn signedness(&self) -> Signedness {
        Signedness::Unsigned
    }
}

impl<G: SampleGenerator + ?Sized> SampleGenerator for Box<G> {
    fn generate(&mut self, frames: usize, dest: &mut [u8]) {
        (**self).generate(frames, dest)
    }

    fn signedness(&self) -> Signedness {
        (**self).signedness()
    }
}

/// Produces silence in the given representation
#[derive(Debug, Clone, Copy, Default)]
pub struct Silence(pub Signedness);

impl SampleGenerator for Silence {
    fn generate(&mut self, _frames: usize, dest: &mut [u8]) {
        dest.fill(self.0.silence_byte());
    }

    fn signedness(&self) -> Signedness {
        self.0
    }
}

/// Produces the same unsigned byte forever
#[derive(Debug, Clone, Copy)]
pub struct ConstantGenerator {
    value: u8,
}

impl ConstantGenerator {
    /// Generator emitting `value` for every sample
    pub fn new(value: u8) -> Self {
        ConstantGenerator { value }
    }
}

impl SampleGenerator for ConstantGenerator {
    fn generate(&mut self, _frames: usize, dest: &mut [u8]) {
        dest.fill(self.value);
    }
}

/// Adapts a closure into a generator
pub struct FnGenerator<F> {
    fill: F,
    signedness: Signedness,
}

impl<F> FnGenerator<F>
where
    F: FnMut(usize, &mut [u8]) + Send,
{
    /// Closure producing unsigned samples
    pub fn new(fill: F) -> Self {
        FnGenerator {
            fill,
            signedness: Signedness::Unsigned,
        }
    }

    /// Closure producing samples in the given representation
    pub fn with_signedness(fill: F, signedness: Signedness) -> Self {
        FnGenerator { fill, signedness }
    }
}

impl<F> SampleGenerator for FnGenerator<F>
where
    F: FnMut(usize, &mut [u8]) + Send,
{
    fn generate(&mut self, frames: usize, dest: &mut [u8]) {
        (self.fill)(frames, dest)
    }

    fn signedness(&self) -> Signedness {
        self.signedness
    }
}

/// Unsigned 8-bit square wave, same value on every channel of a frame
#[derive(Debug, Clone)]
pub struct SquareWave {
    channels: usize,
    half_period_frames: usize,
    amplitude: u8,
    phase: usize,
}

impl SquareWave {
    /// Square wave at `frequency_hz` for the given rate and channel count.
    ///
    /// `amplitude` is the deviation from mid-scale (0 to 127).
    pub fn new(sample_rate_hz: u32, channels: u16, frequency_hz: f32, amplitude: u8) -> Self {
        let half_period = (sample_rate_hz as f32 / (2.0 * frequency_hz.max(1.0))).round();
        SquareWave {
            channels: channels.max(1) as usize,
            half_period_frames: (half_period as usize).max(1),
            amplitude: amplitude.min(127),
            phase: 0,
        }
    }
}

impl SampleGenerator for SquareWave {
    fn generate(&mut self, frames: usize, dest: &mut [u8]) {
        for frame in dest.chunks_exact_mut(self.channels).take(frames) {
            let high = (self.phase / self.half_period_frames) % 2 == 0;
            let value = if high {
                0x80 + self.amplitude
            } else {
                0x80 - self.amplitude
            };
            frame.fill(value);
            self.phase = (self.phase + 1) % (2 * self.half_period_frames);
        }
    }
}
