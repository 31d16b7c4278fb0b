//! Refill detection
//!
//! Decides which half-buffers the hardware has finished with. Two strategies
//! feed the same queue of drained halves:
//!
//! - **Callback**: the hardware context sends the finished [`Half`] over a
//!   bounded channel; the dispatcher drains it on the producer's tick.
//! - **Polling**: the dispatcher compares the hardware read cursor with the
//!   last position it saw and reports every half-buffer boundary crossed,
//!   modulo the `2H` cursor period.
//!
//! Only the dispatcher moves a half from playing to drained.
//!
//! The cursor alone cannot tell a full lap from no movement, and an underrun
//! parks the cursor on a half boundary. Polling therefore also looks at the
//! half states: the hardware reads one half at a time, so when both halves
//! are playing the older one has finished.

use crate::config::DispatchStrategy;
use crate::double_buffer::{DoubleBuffer, Half, HalfState};
use crate::hardware::CompletionSender;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Last observed hardware read position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackCursor {
    last: usize,
    frames_per_half: usize,
}

impl PlaybackCursor {
    /// Cursor at the start of half A
    pub fn new(frames_per_half: usize) -> Self {
        PlaybackCursor {
            last: 0,
            frames_per_half,
        }
    }

    /// Position seen by the last [`advance`](Self::advance)
    pub fn last(&self) -> usize {
        self.last
    }

    /// Cursor period in frames
    pub fn period(&self) -> usize {
        2 * self.frames_per_half
    }

    /// Move to `position` and return the halves whose end was crossed, in order.
    ///
    /// A full lap of exactly `2H` frames between two calls is indistinguishable
    /// from no movement; [`RefillDispatcher`] covers that case from the half states.
    pub fn advance(&mut self, position: usize) -> [Option<Half>; 2] {
        let period = self.period();
        if period == 0 {
            return [None, None];
        }
        let position = position % period;
        let delta = (position + period - self.last) % period;
        let left = Half::from_index(self.last / self.frames_per_half).unwrap_or(Half::A);
        let to_boundary = self.frames_per_half - self.last % self.frames_per_half;
        self.last = position;

        match delta {
            d if d >= to_boundary + self.frames_per_half => [Some(left), Some(left.other())],
            d if d >= to_boundary => [Some(left), None],
            _ => [None, None],
        }
    }

    /// Back to the start of half A
    pub fn reset(&mut self) {
        self.last = 0;
    }
}

/// Collects drained halves for the producer to refill
pub struct RefillDispatcher {
    strategy: DispatchStrategy,
    completions: Receiver<Half>,
    cursor: PlaybackCursor,
    expected: Half,
    out_of_order: u64,
    pending: VecDeque<Half>,
}

impl RefillDispatcher {
    /// Create a dispatcher and the completion sender for the hardware context
    pub fn new(strategy: DispatchStrategy, frames_per_half: usize) -> (Self, CompletionSender) {
        // One slot per half: at most both can be outstanding
        let (tx, rx) = crossbeam_channel::bounded(2);
        (
            RefillDispatcher {
                strategy,
                completions: rx,
                cursor: PlaybackCursor::new(frames_per_half),
                expected: Half::A,
                out_of_order: 0,
                pending: VecDeque::with_capacity(4),
            },
            tx,
        )
    }

    /// Active strategy
    pub fn strategy(&self) -> DispatchStrategy {
        self.strategy
    }

    /// Polling cursor
    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    /// Drained halves that did not follow A, B, A, B order
    pub fn out_of_order(&self) -> u64 {
        self.out_of_order
    }

    /// Gather newly finished halves and mark them drained.
    ///
    /// `position` reads the hardware cursor; only the polling strategy calls
    /// it. Returns how many halves became available for refill.
    pub fn collect(&mut self, buffer: &DoubleBuffer, position: impl FnOnce() -> usize) -> usize {
        let mut found = 0;
        match self.strategy {
            DispatchStrategy::Callback => {
                while let Ok(half) = self.completions.try_recv() {
                    found += self.accept(buffer, half) as usize;
                }
            }
            DispatchStrategy::Polling => {
                // Events are not used for detection, but must not pile up
                while self.completions.try_recv().is_ok() {}

                // States are sampled before the cursor so the older half is
                // known to have ended before `position` was read
                let both_playing = Half::BOTH
                    .iter()
                    .all(|&half| buffer.state(half) == HalfState::Playing);
                let crossed = self.cursor.advance(position());
                if both_playing {
                    let older = self.expected;
                    trace!(%older, "both halves playing, draining the older one");
                    found += self.accept(buffer, older) as usize;
                }
                for half in crossed.into_iter().flatten() {
                    found += self.accept(buffer, half) as usize;
                }
            }
        }
        found
    }

    fn accept(&mut self, buffer: &DoubleBuffer, half: Half) -> bool {
        if !buffer.mark_drained(half) {
            trace!(%half, state = %buffer.state(half), "ignoring stale drain");
            return false;
        }
        if half != self.expected {
            self.out_of_order += 1;
            warn!(%half, expected = %self.expected, "half drained out of order");
        }
        self.expected = half.other();
        self.pending.push_back(half);
        true
    }

    /// Next drained half waiting for refill
    pub fn next_drained(&mut self) -> Option<Half> {
        self.pending.pop_front()
    }

    /// Forget everything seen so far (after pause or resume)
    pub fn reset(&mut self) {
        while self.completions.try_recv().is_ok() {}
        self.pending.clear();
        self.cursor.reset();
        self.expected = Half::A;
    }
}
