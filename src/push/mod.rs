//! Push-style producer path
//!
//! Some hosts generate audio in their own frame loop and just want to hand
//! bytes over. [`PushSink`] takes those writes; [`PushSource`] is the
//! [`SampleGenerator`] the engine refills from, padding any shortfall with
//! silence so a late producer costs an audible gap rather than a stall.

pub mod ring_buffer;

pub use ring_buffer::ByteRing;

use crate::convert::Signedness;
use crate::generator::SampleGenerator;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug)]
struct PushShared {
    ring: ByteRing,
    signedness: Signedness,
    overruns: AtomicU64,
    underrun_bytes: AtomicU64,
}

/// Generator side: drains pushed bytes into refills
#[derive(Debug)]
pub struct PushSource {
    shared: Arc<PushShared>,
}

/// Writer side: accepts bytes from the host's frame loop
#[derive(Debug, Clone)]
pub struct PushSink {
    shared: Arc<PushShared>,
}

impl PushSource {
    /// Create a source/sink pair holding up to `capacity` unsigned PCM bytes
    pub fn new(capacity: usize) -> Result<(PushSource, PushSink)> {
        Self::with_signedness(capacity, Signedness::Unsigned)
    }

    /// Create a pair for samples in the given representation
    pub fn with_signedness(
        capacity: usize,
        signedness: Signedness,
    ) -> Result<(PushSource, PushSink)> {
        let shared = Arc::new(PushShared {
            ring: ByteRing::new(capacity)?,
            signedness,
            overruns: AtomicU64::new(0),
            underrun_bytes: AtomicU64::new(0),
        });
        Ok((
            PushSource {
                shared: Arc::clone(&shared),
            },
            PushSink { shared },
        ))
    }

    /// Bytes of silence inserted because the sink ran dry
    pub fn underrun_bytes(&self) -> u64 {
        self.shared.underrun_bytes.load(Ordering::Relaxed)
    }
}

impl SampleGenerator for PushSource {
    fn generate(&mut self, _frames: usize, dest: &mut [u8]) {
        let read = self.shared.ring.read(dest);
        if read < dest.len() {
            dest[read..].fill(self.shared.signedness.silence_byte());
            self.shared
                .underrun_bytes
                .fetch_add((dest.len() - read) as u64, Ordering::Relaxed);
        }
    }

    fn signedness(&self) -> Signedness {
        self.shared.signedness
    }
}

impl PushSink {
    /// Queue bytes for playback. Returns how many were accepted; the rest are dropped.
    pub fn write(&self, data: &[u8]) -> usize {
        let written = self.shared.ring.write(data);
        if written < data.len() {
            let overruns = self.shared.overruns.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped = data.len() - written, overruns, "push ring full");
        }
        written
    }

    /// Room left in the ring
    pub fn available_write(&self) -> usize {
        self.shared.ring.available_write()
    }

    /// Writes that did not fit completely
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Drop everything not yet consumed
    pub fn flush(&self) {
        self.shared.ring.flush();
    }
}
