//! Outbound reliable sequence numbers.

use std::sync::atomic::{AtomicU16, Ordering};

/// Sequence number the engine starts from, and returns to on server greeting.
pub const SEQUENCE_BASELINE: u16 = 65500;

/// Wrapping 16-bit counter owned by one connection.
///
/// `next` hands out the current value and advances; the first packet after
/// construction or `reset` carries the baseline itself.
#[derive(Debug)]
pub struct Sequencer {
    baseline: u16,
    next: AtomicU16,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new(SEQUENCE_BASELINE)
    }
}

impl Sequencer {
    pub fn new(baseline: u16) -> Self {
        Self {
            baseline,
            next: AtomicU16::new(baseline),
        }
    }

    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    /// Value the next call to `next` returns.
    pub fn current(&self) -> u16 {
        self.next.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.next.store(self.baseline, Ordering::Release);
    }

    pub fn baseline(&self) -> u16 {
        self.baseline
    }
}
