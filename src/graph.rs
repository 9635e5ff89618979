//! Immutable, RT-safe render graph. Built off-thread by `graph_builder` and
//! handed to the RT thread through `EngineState`'s double buffer — nothing
//! in here allocates or locks once built.
//!
//! Grounded on `NomadAudio/include/AudioGraph.h`.

use std::sync::Arc;
use uuid::Uuid;

use crate::sample_pool::AudioBuffer;

/// One clip's placement, resolved so the RT thread never has to do
/// frame/trim/rate arithmetic per block.
///
/// `start_sample`/`end_sample` live on the **engine's** (output) sample-rate
/// timeline — the same clock `AudioEngine::global_sample_pos` advances on —
/// while `sample_offset` is the clip's trim-start expressed in the *source*
/// file's own sample rate. Keeping these separate (rather than reusing one
/// field for both, as the raw source-frame trim length) is what lets a clip
/// recorded at a different sample rate than the engine's output still end at
/// the right timeline position.
#[derive(Clone)]
pub struct ClipRenderState {
    pub clip_id: Uuid,
    pub audio_data: Arc<AudioBuffer>,
    /// First source-file frame this clip plays (post-trim), in the source's
    /// own sample rate.
    pub sample_offset: u64,
    /// Timeline frame (engine sample rate) at which this clip starts sounding.
    pub start_sample: u64,
    /// Timeline frame (engine sample rate) one past the clip's last audible frame.
    pub end_sample: u64,
    pub gain: f32,
    pub pan: f32,
}

impl ClipRenderState {
    /// Duration on the engine's own timeline, in engine-rate samples.
    pub fn duration_samples(&self) -> u64 {
        self.end_sample.saturating_sub(self.start_sample)
    }

    pub fn timeline_start(&self) -> u64 {
        self.start_sample
    }

    pub fn timeline_end(&self) -> u64 {
        self.end_sample
    }
}

#[derive(Clone)]
pub struct TrackRenderState {
    pub track_id: Uuid,
    pub track_index: usize,
    pub clips: Vec<ClipRenderState>,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
}

#[derive(Clone, Default)]
pub struct AudioGraph {
    pub tracks: Vec<TrackRenderState>,
    /// One past the last sounding sample across every track; used to detect
    /// end-of-timeline during transport playback.
    pub timeline_end_sample: u64,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any_track_soloed(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }
}
