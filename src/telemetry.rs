//! Lock-free telemetry counters updated from the RT thread, read by the UI.
//!
//! All fields are atomics so the callback never blocks; UI/non-RT code
//! snapshots these periodically. See spec §2 row 12 and §4.8 step 11.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Atomic counters the RT callback updates every block.
#[derive(Debug, Default)]
pub struct Telemetry {
    blocks_processed: AtomicU64,
    xruns: AtomicU64,
    underruns: AtomicU64,
    last_callback_ns: AtomicU64,
    max_callback_ns: AtomicU64,
    sample_rate: AtomicU32,
    buffer_frames: AtomicU32,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_block(&self, elapsed_ns: u64, budget_ns: u64) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.last_callback_ns.store(elapsed_ns, Ordering::Relaxed);

        let mut peak = self.max_callback_ns.load(Ordering::Relaxed);
        while elapsed_ns > peak {
            match self.max_callback_ns.compare_exchange_weak(
                peak,
                elapsed_ns,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => peak = c,
            }
        }

        if elapsed_ns > budget_ns {
            self.xruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_buffer_frames(&self, frames: u32) {
        self.buffer_frames.store(frames, Ordering::Relaxed);
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn xruns(&self) -> u64 {
        self.xruns.load(Ordering::Relaxed)
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn last_callback_ns(&self) -> u64 {
        self.last_callback_ns.load(Ordering::Relaxed)
    }

    pub fn max_callback_ns(&self) -> u64 {
        self.max_callback_ns.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames.load(Ordering::Relaxed)
    }

    /// Reset all counters (not RT-safe to call concurrently with playback,
    /// but individually-atomic so it can't tear).
    pub fn reset(&self) {
        self.blocks_processed.store(0, Ordering::Relaxed);
        self.xruns.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.last_callback_ns.store(0, Ordering::Relaxed);
        self.max_callback_ns.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xrun_counted_over_budget() {
        let t = Telemetry::new();
        t.record_block(500, 1000);
        t.record_block(1500, 1000);
        assert_eq!(t.blocks_processed(), 2);
        assert_eq!(t.xruns(), 1);
    }

    #[test]
    fn test_max_callback_tracks_peak() {
        let t = Telemetry::new();
        t.record_block(100, 1_000_000);
        t.record_block(900, 1_000_000);
        t.record_block(300, 1_000_000);
        assert_eq!(t.max_callback_ns(), 900);
        assert_eq!(t.last_callback_ns(), 300);
    }
}
