//! Builds an `AudioGraph` from a `Project` off the RT thread.
//!
//! Grounded on `NomadAudio/src/AudioGraphBuilder.cpp`: resolves each clip's
//! pooled buffer, clamps trim/offset arithmetic defensively rather than
//! trusting the edit model, and tracks the graph's overall timeline length.

use crate::graph::{AudioGraph, ClipRenderState, TrackRenderState};
use crate::model::Project;

/// Convert a floating-point seconds offset to a sample count, clamping
/// rather than overflowing. The original used `long double`; Rust has no
/// portable wider type than `f64`, so the clamp is the safety net instead.
pub fn safe_seconds_to_samples(seconds: f64, sample_rate: f64) -> u64 {
    if !seconds.is_finite() || seconds < 0.0 {
        return 0;
    }
    let samples = seconds * sample_rate;
    if samples >= u64::MAX as f64 {
        u64::MAX
    } else {
        samples.round() as u64
    }
}

/// Build a render graph from the current project state, resolving every
/// clip's placement onto the engine's own `output_sample_rate` timeline.
///
/// A clip's `trim_start`/`trim_end`/`timeline_start` in the edit model are
/// all expressed in the clip's *source* sample rate; `start_sample`/
/// `end_sample` on the resulting `ClipRenderState` must instead be absolute
/// positions on the *engine's* timeline, so a clip recorded at a different
/// rate than the output still starts and ends at the right wall-clock time.
/// `sample_offset` carries the source-rate trim-start through separately,
/// for `render_clip_into`'s resampling read position.
///
/// Clips whose source buffer isn't `ready` yet (still streaming in) are
/// skipped for this snapshot — they'll appear once a later rebuild catches
/// them ready.
pub fn build_from_project(project: &Project, output_sample_rate: f64) -> AudioGraph {
    let mut graph = AudioGraph::new();
    let solo_active = project.any_track_soloed();
    let mut max_end_sample = 0u64;

    for (track_index, track) in project.tracks.iter().enumerate() {
        let mut clip_states = Vec::with_capacity(track.clips.len());

        for clip in &track.clips {
            if !clip.source.is_ready() {
                continue;
            }

            let source_sample_rate = clip.source.sample_rate as f64;
            let frames = clip.source.num_frames;
            // sourceOffset clamped to the buffer's own length.
            let sample_offset = clip.trim_start.min(frames);
            let trim_end_frames = clip.trim_end.min(frames.saturating_sub(sample_offset));
            let duration_source_frames = frames.saturating_sub(sample_offset).saturating_sub(trim_end_frames);

            let timeline_start_seconds = clip.timeline_start as f64 / source_sample_rate;
            let duration_seconds = duration_source_frames as f64 / source_sample_rate;

            let start_sample = safe_seconds_to_samples(timeline_start_seconds, output_sample_rate);
            let duration_output_samples = safe_seconds_to_samples(duration_seconds, output_sample_rate);
            let end_sample = start_sample.saturating_add(duration_output_samples);

            let render_state = ClipRenderState {
                clip_id: clip.id,
                audio_data: clip.source.clone(),
                sample_offset,
                start_sample,
                end_sample,
                gain: clip.gain,
                pan: 0.0,
            };
            max_end_sample = max_end_sample.max(render_state.timeline_end());
            clip_states.push(render_state);
        }

        // With any track soloed, non-soloed tracks render as implicitly
        // muted — resolved here so the RT thread only checks one flag.
        let effective_mute = track.mute || (solo_active && !track.solo);

        graph.tracks.push(TrackRenderState {
            track_id: track.id,
            track_index,
            clips: clip_states,
            volume: track.volume,
            pan: track.pan,
            mute: effective_mute,
            solo: track.solo,
        });
    }

    graph.timeline_end_sample = max_end_sample;
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Clip, Track};
    use crate::sample_pool::AudioBuffer;
    use std::path::PathBuf;

    fn ready_clip(timeline_start: u64, frames: u64, trim_start: u64, trim_end: u64) -> Clip {
        let source = AudioBuffer::new_ready(vec![0.0; frames as usize], 1, 44100, PathBuf::from("x.wav"));
        let mut clip = Clip::new("c", timeline_start, PathBuf::from("x.wav"), source);
        clip.trim_start = trim_start;
        clip.trim_end = trim_end;
        clip
    }

    #[test]
    fn test_safe_seconds_to_samples_clamps_overflow() {
        assert_eq!(safe_seconds_to_samples(f64::MAX, 48000.0), u64::MAX);
        assert_eq!(safe_seconds_to_samples(-1.0, 48000.0), 0);
        assert_eq!(safe_seconds_to_samples(1.0, 48000.0), 48000);
    }

    #[test]
    fn test_build_resolves_trim_to_sample_range() {
        let mut project = Project::new();
        let mut track = Track::new("t1");
        track.add_clip(ready_clip(0, 1000, 100, 50));
        project.add_track(track);

        let graph = build_from_project(&project, 44100.0);
        let clip = &graph.tracks[0].clips[0];
        assert_eq!(clip.sample_offset, 100);
        assert_eq!(clip.start_sample, 0);
        assert_eq!(clip.end_sample, 850);
        assert_eq!(graph.timeline_end_sample, 850);
    }

    #[test]
    fn test_build_converts_source_duration_to_output_rate() {
        // A clip recorded at 44100 Hz, untrimmed, placed on an engine
        // running at 48000 Hz: its duration must be expressed in
        // output-rate samples, not carried over as a raw source-frame count.
        let mut project = Project::new();
        let mut track = Track::new("t1");
        track.add_clip(ready_clip(0, 44100, 0, 0)); // 1 second at 44100 Hz
        project.add_track(track);

        let graph = build_from_project(&project, 48000.0);
        let clip = &graph.tracks[0].clips[0];
        assert_eq!(clip.sample_offset, 0);
        assert_eq!(clip.start_sample, 0);
        assert_eq!(clip.end_sample, 48000);
    }

    #[test]
    fn test_build_skips_not_ready_clips() {
        let source = not_ready_buffer();
        let mut project = Project::new();
        let mut track = Track::new("t1");
        track.add_clip(Clip::new("c", 0, PathBuf::from("x.wav"), source));
        project.add_track(track);

        let graph = build_from_project(&project, 44100.0);
        assert!(graph.tracks[0].clips.is_empty());
    }

    #[test]
    fn test_solo_mutes_other_tracks() {
        let mut project = Project::new();
        project.add_track(Track::new("a"));
        let mut b = Track::new("b");
        b.solo = true;
        project.add_track(b);

        let graph = build_from_project(&project, 44100.0);
        assert!(graph.tracks[0].mute);
        assert!(!graph.tracks[1].mute);
    }

    #[test]
    fn test_oversized_trim_clamps_end_to_start() {
        let mut project = Project::new();
        let mut track = Track::new("t1");
        // trim_end far exceeds the clip length; end_sample must not precede start_sample.
        track.add_clip(ready_clip(0, 100, 10, 1000));
        project.add_track(track);

        let graph = build_from_project(&project, 44100.0);
        let clip = &graph.tracks[0].clips[0];
        assert_eq!(clip.sample_offset, 10);
        assert_eq!(clip.start_sample, 0);
        assert_eq!(clip.end_sample, 0);
    }

    fn not_ready_buffer() -> std::sync::Arc<AudioBuffer> {
        let buf = AudioBuffer::new_ready(vec![0.0; 10], 1, 44100, PathBuf::from("y.wav"));
        buf.ready.store(false, std::sync::atomic::Ordering::Release);
        buf
    }
}
