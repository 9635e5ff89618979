//! One-shot file audition, mixed additively on top of the main engine
//! output. Grounded on `NomadAudio/include/PreviewEngine.h`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::EngineConfig;
use crate::error::Result;
use crate::sample_pool::{AudioBuffer, SamplePool};

#[derive(Clone, Copy, PartialEq, Eq)]
enum VoicePhase {
    FadingIn,
    Playing,
    FadingOut,
    Done,
}

struct Voice {
    buffer: Arc<AudioBuffer>,
    path: PathBuf,
    position_frames: f64,
    gain: f32,
    max_play_frames: u64,
    elapsed_frames: u64,
    fade_in_frames: u32,
    fade_out_frames: u32,
    fade_position: u32,
    phase: VoicePhase,
}

impl Voice {
    fn fade_gain(&self) -> f64 {
        match self.phase {
            VoicePhase::FadingIn => (self.fade_position as f64 / self.fade_in_frames.max(1) as f64).min(1.0),
            VoicePhase::Playing => 1.0,
            VoicePhase::FadingOut => 1.0 - (self.fade_position as f64 / self.fade_out_frames.max(1) as f64).min(1.0),
            VoicePhase::Done => 0.0,
        }
    }

    fn begin_fade_out(&mut self) {
        if self.phase != VoicePhase::FadingOut && self.phase != VoicePhase::Done {
            self.phase = VoicePhase::FadingOut;
            self.fade_position = 0;
        }
    }
}

/// Plays at most one preview voice at a time; starting a new one fades out
/// whatever was already playing rather than cutting it abruptly.
pub struct PreviewEngine {
    voice: Mutex<Option<Voice>>,
    fade_in_ms: f64,
    fade_out_ms: f64,
    on_complete: Mutex<Option<Box<dyn Fn(&Path) + Send + Sync>>>,
}

impl PreviewEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            voice: Mutex::new(None),
            fade_in_ms: config.preview_fade_in_ms,
            fade_out_ms: config.preview_fade_out_ms,
            on_complete: Mutex::new(None),
        }
    }

    pub fn set_on_complete(&self, callback: impl Fn(&Path) + Send + Sync + 'static) {
        *self.on_complete.lock() = Some(Box::new(callback));
    }

    /// Start auditioning `path`. Replaces any currently-playing voice (which
    /// fades out rather than cutting).
    pub fn play(&self, pool: &SamplePool, path: impl AsRef<Path>, gain_db: f32, max_seconds: f64) -> Result<()> {
        let path = path.as_ref();
        let buffer = pool.acquire(path, |p| {
            if p.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("wav")) == Some(true) {
                let wav = crate::wav::load_wav(p)?;
                Ok(AudioBuffer::new_ready(wav.samples, wav.channels, wav.sample_rate, p.to_path_buf()))
            } else {
                let decoded = crate::platform_decoder::decode_file(p)?;
                Ok(AudioBuffer::new_ready(decoded.samples, decoded.channels, decoded.sample_rate, p.to_path_buf()))
            }
        })?;

        let sample_rate = buffer.sample_rate as f64;
        let gain = 10f32.powf(gain_db / 20.0);
        let max_play_frames = (max_seconds * sample_rate) as u64;
        let fade_in_frames = (self.fade_in_ms / 1000.0 * sample_rate) as u32;
        let fade_out_frames = (self.fade_out_ms / 1000.0 * sample_rate) as u32;

        let mut slot = self.voice.lock();
        if let Some(existing) = slot.as_mut() {
            existing.begin_fade_out();
        }
        *slot = Some(Voice {
            buffer,
            path: path.to_path_buf(),
            position_frames: 0.0,
            gain,
            max_play_frames,
            elapsed_frames: 0,
            fade_in_frames: fade_in_frames.max(1),
            fade_out_frames: fade_out_frames.max(1),
            fade_position: 0,
            phase: VoicePhase::FadingIn,
        });
        Ok(())
    }

    /// Begin fading out the active voice, if any.
    pub fn stop(&self) {
        if let Some(voice) = self.voice.lock().as_mut() {
            voice.begin_fade_out();
        }
    }

    /// Mix additively into `out` (interleaved stereo, `frames` long).
    /// Acquires the voice under the mutex, then releases before returning —
    /// the mix math itself never holds the lock.
    pub fn process(&self, out: &mut [f32], frames: usize) {
        let Some(mut voice) = self.voice.lock().take() else { return };

        let channels = voice.buffer.channels.max(1);
        let total_frames = voice.buffer.num_frames;
        let mut finished = false;

        for i in 0..frames {
            if voice.phase == VoicePhase::Done {
                finished = true;
                break;
            }
            if voice.elapsed_frames >= voice.max_play_frames {
                voice.begin_fade_out();
            }

            let left = interpolate_linear(&voice.buffer.data, total_frames, voice.position_frames, 0, channels);
            let right = if channels > 1 {
                interpolate_linear(&voice.buffer.data, total_frames, voice.position_frames, 1, channels)
            } else {
                left
            };

            let fade = voice.fade_gain();
            out[i * 2] += (left * voice.gain as f64 * fade) as f32;
            out[i * 2 + 1] += (right * voice.gain as f64 * fade) as f32;

            voice.position_frames += 1.0;
            voice.elapsed_frames += 1;
            voice.fade_position += 1;

            match voice.phase {
                VoicePhase::FadingIn if voice.fade_position >= voice.fade_in_frames => {
                    voice.phase = VoicePhase::Playing;
                    voice.fade_position = 0;
                }
                VoicePhase::FadingOut if voice.fade_position >= voice.fade_out_frames => {
                    voice.phase = VoicePhase::Done;
                }
                _ => {}
            }

            if voice.position_frames as u64 >= total_frames {
                voice.begin_fade_out();
            }
        }

        if finished || voice.phase == VoicePhase::Done {
            if let Some(callback) = self.on_complete.lock().as_ref() {
                callback(&voice.path);
            }
            *self.voice.lock() = None;
        } else {
            *self.voice.lock() = Some(voice);
        }
    }

    pub fn is_active(&self) -> bool {
        self.voice.lock().is_some()
    }
}

fn interpolate_linear(source: &[f32], total_frames: u64, position: f64, channel: usize, channels: usize) -> f64 {
    crate::interpolators::linear(source, total_frames, position, channel, channels) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn sine_file(dir: &tempfile::TempDir, name: &str, frames: usize) -> PathBuf {
        use std::io::Write;
        let path = dir.path().join(name);
        let pcm: Vec<u8> = (0..frames)
            .flat_map(|i| {
                let v = ((i as f64 * 0.1).sin() * 10000.0) as i16;
                v.to_le_bytes()
            })
            .collect();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(4 + 24 + pcm.len() as u32).to_le_bytes());
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
        out.extend_from_slice(&(pcm.len() as u32).to_le_bytes());
        out.extend_from_slice(&pcm);
        std::fs::File::create(&path).unwrap().write_all(&out).unwrap();
        path
    }

    #[test]
    fn test_play_and_process_produces_nonzero_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = sine_file(&dir, "preview.wav", 10000);
        let pool = SamplePool::new(0);
        let engine = PreviewEngine::new(&config());

        engine.play(&pool, &path, 0.0, 5.0).unwrap();
        let mut out = vec![0.0f32; 256 * 2];
        for _ in 0..10 {
            engine.process(&mut out, 256);
        }
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_stop_eventually_completes_and_fires_callback() {
        let dir = tempfile::tempdir().unwrap();
        let path = sine_file(&dir, "preview2.wav", 50000);
        let pool = SamplePool::new(0);
        let engine = PreviewEngine::new(&config());
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();
        engine.set_on_complete(move |_| fired_clone.store(true, Ordering::SeqCst));

        engine.play(&pool, &path, 0.0, 5.0).unwrap();
        engine.stop();

        let mut out = vec![0.0f32; 256 * 2];
        for _ in 0..20 {
            engine.process(&mut out, 256);
        }
        assert!(fired.load(Ordering::SeqCst));
        assert!(!engine.is_active());
    }

    #[test]
    fn test_replacing_active_voice_fades_out_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = sine_file(&dir, "a.wav", 50000);
        let path_b = sine_file(&dir, "b.wav", 50000);
        let pool = SamplePool::new(0);
        let engine = PreviewEngine::new(&config());

        engine.play(&pool, &path_a, 0.0, 5.0).unwrap();
        engine.play(&pool, &path_b, 0.0, 5.0).unwrap();
        assert!(engine.is_active());
    }
}
