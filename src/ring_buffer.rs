//! Single-producer/single-consumer lock-free ring buffer for streaming audio.
//!
//! Two monotonically increasing indices (never wrapped, masked modulo
//! capacity on access) with acquire/release ordering at the handoff — the
//! same discipline the engine uses for `EngineState`. Capacity must be a
//! power of two so frame indices can be masked instead of remaindered.
//!
//! Frames here means interleaved-sample frames: `capacity_frames * channels`
//! raw `f32` slots are allocated, and every offset/length in the public API
//! is expressed in frames.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed-capacity SPSC ring of interleaved audio frames.
///
/// Single writer, single reader. `clear()` is not safe to call concurrently
/// with `read`/`write` — it's meant for use between streams, while both ends
/// are quiescent.
pub struct RingBuffer {
    buffer: Box<[f32]>,
    capacity_frames: usize,
    channels: usize,
    write_idx: CachePadded<AtomicU64>,
    read_idx: CachePadded<AtomicU64>,
}

impl RingBuffer {
    /// `capacity_frames` is rounded up to the next power of two.
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let capacity_frames = capacity_frames.next_power_of_two().max(1);
        let channels = channels.max(1);
        Self {
            buffer: vec![0.0f32; capacity_frames * channels].into_boxed_slice(),
            capacity_frames,
            channels,
            write_idx: CachePadded::new(AtomicU64::new(0)),
            read_idx: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity_frames
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn mask(&self, index: u64) -> usize {
        (index as usize) & (self.capacity_frames - 1)
    }

    /// Frames available to read right now.
    pub fn available_read(&self) -> usize {
        let w = self.write_idx.load(Ordering::Acquire);
        // Acquire here, not Relaxed: `available_write` calls this from the
        // writer side and must synchronize-with the reader's Release store
        // in `read()` before overwriting the slots it just freed.
        let r = self.read_idx.load(Ordering::Acquire);
        (w - r) as usize
    }

    /// Frames of free space available to write right now.
    pub fn available_write(&self) -> usize {
        self.capacity_frames - self.available_read()
    }

    /// Write up to `src.len() / channels` frames. Returns frames actually
    /// written; a short write is normal when the buffer is nearly full.
    ///
    /// # Safety-adjacent note
    /// `src` must contain whole frames (`src.len()` a multiple of `channels`).
    pub fn write(&self, src: &[f32]) -> usize {
        let channels = self.channels;
        let requested_frames = src.len() / channels;
        let free = self.available_write();
        let to_write = requested_frames.min(free);
        if to_write == 0 {
            return 0;
        }

        let w = self.write_idx.load(Ordering::Relaxed);
        // SAFETY-free: raw pointer math avoided, we index through slices.
        let buf_ptr = self.buffer.as_ptr() as *mut f32;
        for i in 0..to_write {
            let slot = self.mask(w + i as u64);
            let dst_start = slot * channels;
            let src_start = i * channels;
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src.as_ptr().add(src_start),
                    buf_ptr.add(dst_start),
                    channels,
                );
            }
        }

        self.write_idx.store(w + to_write as u64, Ordering::Release);
        to_write
    }

    /// Read up to `dst.len() / channels` frames, removing them from the
    /// buffer. Returns frames actually read; the remainder of `dst` is left
    /// untouched (caller fills silence, per the streaming-decoder contract).
    pub fn read(&self, dst: &mut [f32]) -> usize {
        let n = self.peek(dst);
        if n > 0 {
            let r = self.read_idx.load(Ordering::Relaxed);
            self.read_idx.store(r + n as u64, Ordering::Release);
        }
        n
    }

    /// Read up to `dst.len() / channels` frames without consuming them.
    pub fn peek(&self, dst: &mut [f32]) -> usize {
        let channels = self.channels;
        let requested_frames = dst.len() / channels;
        let available = self.available_read();
        let to_read = requested_frames.min(available);
        if to_read == 0 {
            return 0;
        }

        let r = self.read_idx.load(Ordering::Relaxed);
        for i in 0..to_read {
            let slot = self.mask(r + i as u64);
            let src_start = slot * channels;
            let dst_start = i * channels;
            dst[dst_start..dst_start + channels]
                .copy_from_slice(&self.buffer[src_start..src_start + channels]);
        }
        to_read
    }

    /// Reset to empty. Not safe concurrently with `read`/`write`.
    pub fn clear(&self) {
        let w = self.write_idx.load(Ordering::Relaxed);
        self.read_idx.store(w, Ordering::Relaxed);
    }
}

// SAFETY: access is mediated entirely through the atomic indices; the
// producer only ever writes the region between `read` and `write`, and the
// consumer only ever reads the region already published by `write`.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let rb = RingBuffer::new(16, 2);
        let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        assert_eq!(rb.write(&src), 3);
        let mut dst = [0.0; 6];
        assert_eq!(rb.read(&mut dst), 3);
        assert_eq!(dst, src);
    }

    #[test]
    fn test_short_write_when_full() {
        let rb = RingBuffer::new(4, 1);
        let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        assert_eq!(rb.write(&src), 4);
        assert_eq!(rb.available_write(), 0);
    }

    #[test]
    fn test_short_read_when_empty() {
        let rb = RingBuffer::new(4, 1);
        let mut dst = [0.0; 4];
        assert_eq!(rb.read(&mut dst), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let rb = RingBuffer::new(8, 1);
        rb.write(&[1.0, 2.0, 3.0]);
        let mut dst = [0.0; 3];
        assert_eq!(rb.peek(&mut dst), 3);
        assert_eq!(rb.available_read(), 3);
        assert_eq!(rb.read(&mut dst), 3);
        assert_eq!(rb.available_read(), 0);
    }

    #[test]
    fn test_wraparound() {
        let rb = RingBuffer::new(4, 1);
        rb.write(&[1.0, 2.0, 3.0]);
        let mut dst = [0.0; 2];
        rb.read(&mut dst);
        rb.write(&[4.0, 5.0]);
        let mut out = [0.0; 3];
        assert_eq!(rb.read(&mut out), 3);
        assert_eq!(out, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_clear() {
        let rb = RingBuffer::new(8, 1);
        rb.write(&[1.0, 2.0, 3.0]);
        rb.clear();
        assert_eq!(rb.available_read(), 0);
        assert_eq!(rb.available_write(), 8);
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        let rb = RingBuffer::new(10, 2);
        assert_eq!(rb.capacity(), 16);
    }

    proptest::proptest! {
        #[test]
        fn test_fifo_order_preserved(writes in proptest::collection::vec(1u32..200, 1..40)) {
            let rb = RingBuffer::new(64, 1);
            let mut produced = Vec::new();
            let mut consumed = Vec::new();
            let mut next_value = 0.0f32;

            for &chunk_len in &writes {
                let chunk: Vec<f32> = (0..chunk_len % 50)
                    .map(|_| { let v = next_value; next_value += 1.0; v })
                    .collect();
                produced.extend_from_slice(&chunk);
                let mut offset = 0;
                while offset < chunk.len() {
                    let written = rb.write(&chunk[offset..]);
                    if written == 0 {
                        // Drain some before retrying, like a real consumer would.
                        let mut buf = vec![0.0; rb.available_read().max(1)];
                        let n = rb.read(&mut buf);
                        consumed.extend_from_slice(&buf[..n]);
                        if n == 0 { break; }
                        continue;
                    }
                    offset += written;
                }
                proptest::prop_assert!(rb.available_read() + rb.available_write() <= rb.capacity());
            }
            let mut buf = vec![0.0; rb.available_read()];
            let n = rb.read(&mut buf);
            consumed.extend_from_slice(&buf[..n]);
            proptest::prop_assert_eq!(consumed, produced);
        }
    }
}
