//! Engine tuning parameters, loaded from a TOML file.
//!
//! Per the spec's Design Notes: peak-hold timings, fade lengths, and the
//! DC-blocker coefficient are specification, not placeholders — but if they
//! ever need retuning, that happens here rather than by inlining a new
//! magic number at the call site.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for the real-time engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pre-limiter attenuation in dB (negative values reserve headroom).
    pub headroom_db: f32,

    /// Master gain applied before headroom (1.0 = unity).
    pub master_gain: f32,

    /// Whether the DC blocker + soft clipper run on the master bus.
    pub safety_processing_enabled: bool,

    /// DC blocker feedback coefficient (§4.8: `y = x - x1 + R*y1`).
    pub dc_blocker_r: f64,

    /// Edge fade applied at clip enter/exit, in frames.
    pub clip_edge_fade_frames: u32,

    /// Transport fade-in length, in frames.
    pub transport_fade_in_frames: u32,

    /// Transport fade-out length, in frames.
    pub transport_fade_out_frames: u32,

    /// Per-sample smoothing coefficient for volume/pan parameters.
    pub smoothing_coeff: f64,

    /// Maximum number of tracks the engine pre-allocates scratch buffers for.
    pub max_tracks: usize,

    /// Streaming ring buffer size, in seconds.
    pub stream_buffer_seconds: f64,

    /// Target time-to-first-sound for streaming playback, in milliseconds.
    pub stream_target_latency_ms: f64,

    /// Preview voice fade-in length, in milliseconds.
    pub preview_fade_in_ms: f64,

    /// Preview voice fade-out length, in milliseconds.
    pub preview_fade_out_ms: f64,

    /// Number of times the device manager retries reopening with a larger
    /// buffer after repeated underruns before giving up.
    pub underrun_retry_limit: u32,

    /// Sample-pool memory budget in bytes (0 = unlimited).
    pub sample_pool_budget_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            headroom_db: -6.0,
            master_gain: 1.0,
            safety_processing_enabled: true,
            dc_blocker_r: 0.9997,
            clip_edge_fade_frames: 128,
            transport_fade_in_frames: 256,
            transport_fade_out_frames: 1024,
            smoothing_coeff: 0.001,
            max_tracks: 64,
            stream_buffer_seconds: 2.0,
            stream_target_latency_ms: 50.0,
            preview_fade_in_ms: 20.0,
            preview_fade_out_ms: 50.0,
            underrun_retry_limit: 3,
            sample_pool_budget_bytes: 0,
        }
    }
}

impl EngineConfig {
    /// Headroom as a linear multiplier (`10^(dB/20)`).
    pub fn headroom_linear(&self) -> f32 {
        10f32.powf(self.headroom_db / 20.0)
    }

    /// Load from a TOML file, falling back to defaults on any error.
    ///
    /// Mirrors the host application's own config loader: never fails the
    /// caller, always returns something usable, logs what happened.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("no engine config at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("loaded engine config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("failed to parse engine config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("failed to read engine config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save to a TOML file, writing to a temp file and renaming atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &contents)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Default location for the engine config file under the OS config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("daw-audio-engine").join("engine.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headroom_linear() {
        let cfg = EngineConfig {
            headroom_db: -6.0,
            ..Default::default()
        };
        assert!((cfg.headroom_linear() - 0.5012).abs() < 0.001);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut cfg = EngineConfig::default();
        cfg.headroom_db = -3.0;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load_or_default(&path);
        assert_eq!(loaded.headroom_db, -3.0);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = EngineConfig::load_or_default("/nonexistent/path/engine.toml");
        assert_eq!(cfg.dc_blocker_r, 0.9997);
    }
}
