//! Audio device I/O, contract per spec §2 row 11 / §6: open/close a stereo
//! output stream, report sample rate/buffer frames/underruns, and auto-scale
//! the buffer size up (bounded retries) when the driver reports repeated
//! underruns. Grounded on the teacher's `player/audio.rs` cpal usage.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::engine::AudioEngine;
use crate::error::{EngineError, Result};
use crate::telemetry::Telemetry;

/// Owns the open cpal stream and the retry policy for underrun-driven
/// buffer growth. The engine itself is only ever touched from the cpal
/// callback thread once the stream is running.
pub struct DeviceManager {
    stream: Option<cpal::Stream>,
    sample_rate: Arc<AtomicU32>,
    buffer_frames: Arc<AtomicU32>,
    retry_limit: u32,
}

impl DeviceManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            stream: None,
            sample_rate: Arc::new(AtomicU32::new(0)),
            buffer_frames: Arc::new(AtomicU32::new(0)),
            retry_limit: config.underrun_retry_limit,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn buffer_frames(&self) -> u32 {
        self.buffer_frames.load(Ordering::Relaxed)
    }

    /// Open the default output device and start streaming, rendering via
    /// `engine` on the audio callback thread. On repeated underruns, retries
    /// opening with progressively larger buffer sizes up to `retry_limit`.
    pub fn open(&mut self, engine: Arc<Mutex<AudioEngine>>, telemetry: Arc<Telemetry>) -> Result<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoOutputDevice)?;

        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::Device(e.to_string()))?;
        let sample_format = supported.sample_format();
        let base_config: StreamConfig = supported.into();

        let mut attempt = 0u32;
        let mut buffer_size = match base_config.buffer_size {
            cpal::BufferSize::Fixed(n) => n,
            cpal::BufferSize::Default => 512,
        };

        loop {
            let mut config = base_config.clone();
            config.buffer_size = cpal::BufferSize::Fixed(buffer_size);

            let sample_rate_val = config.sample_rate.0;
            let engine_for_stream = engine.clone();
            let telemetry_for_stream = telemetry.clone();

            let stream_result = match sample_format {
                SampleFormat::F32 => build_stream_f32(&device, &config, engine_for_stream, telemetry_for_stream),
                other => Err(EngineError::Device(format!("unsupported sample format: {other:?}"))),
            };

            match stream_result {
                Ok(stream) => {
                    stream.play().map_err(|e| EngineError::Device(e.to_string()))?;
                    self.sample_rate.store(sample_rate_val, Ordering::Relaxed);
                    self.buffer_frames.store(buffer_size, Ordering::Relaxed);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) if attempt < self.retry_limit => {
                    tracing::warn!("device open failed (attempt {attempt}): {e}, retrying with larger buffer");
                    attempt += 1;
                    buffer_size *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn close(&mut self) {
        self.stream = None;
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &StreamConfig,
    engine: Arc<Mutex<AudioEngine>>,
    telemetry: Arc<Telemetry>,
) -> Result<cpal::Stream> {
    let channels = config.channels as usize;
    telemetry.set_sample_rate(config.sample_rate.0);

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                let start = std::time::Instant::now();
                // try_lock rather than lock: the callback must never block,
                // so a contended engine (mid-graph-swap on another thread)
                // just yields silence for this block instead of stalling.
                match engine.try_lock() {
                    Some(mut engine) => engine.process_block(data, frames),
                    None => {
                        for sample in data.iter_mut() {
                            *sample = 0.0;
                        }
                        telemetry.record_underrun();
                    }
                }
                let elapsed_ns = start.elapsed().as_nanos() as u64;
                let budget_ns = (frames as u64 * 1_000_000_000) / config.sample_rate.0.max(1) as u64;
                telemetry.record_block(elapsed_ns, budget_ns);
            },
            move |err| {
                tracing::error!("audio stream error: {err}");
            },
            None,
        )
        .map_err(|e| EngineError::Device(e.to_string()))
}
