//! Non-destructive clip/track editing model. Grounded on
//! `NomadAudio/include/AudioClip.h`, but identity uses the `uuid` crate
//! rather than the original's hand-rolled 128-bit struct.

use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::sample_pool::AudioBuffer;

/// A placement of (part of) a source file on the timeline. Trimming and
/// splitting only ever adjust `trim_start`/`trim_end`/`timeline_start` —
/// the underlying `source` buffer is never mutated.
#[derive(Clone)]
pub struct Clip {
    pub id: Uuid,
    pub name: String,
    /// Position of the clip's first audible frame on the track timeline.
    pub timeline_start: u64,
    /// Frames trimmed from the start of the source material.
    pub trim_start: u64,
    /// Frames trimmed from the end of the source material.
    pub trim_end: u64,
    pub gain: f32,
    pub source_path: PathBuf,
    pub source: Arc<AudioBuffer>,
}

impl Clip {
    pub fn new(name: impl Into<String>, timeline_start: u64, source_path: PathBuf, source: Arc<AudioBuffer>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timeline_start,
            trim_start: 0,
            trim_end: 0,
            gain: 1.0,
            source_path,
            source,
        }
    }

    /// Frames of source material actually played, after trimming.
    pub fn duration_frames(&self) -> u64 {
        let total = self.source.num_frames;
        total.saturating_sub(self.trim_start).saturating_sub(self.trim_end)
    }

    /// Timeline frame one past the clip's last audible frame.
    pub fn timeline_end(&self) -> u64 {
        self.timeline_start + self.duration_frames()
    }

    pub fn contains_timeline_position(&self, position: u64) -> bool {
        position >= self.timeline_start && position < self.timeline_end()
    }

    /// Map a timeline frame to the corresponding source-file frame.
    pub fn timeline_to_source_position(&self, position: u64) -> Option<u64> {
        if !self.contains_timeline_position(position) {
            return None;
        }
        Some(self.trim_start + (position - self.timeline_start))
    }

    /// Split this clip at a timeline position, returning `(left, right)`.
    /// `position` must fall strictly inside the clip's audible range.
    pub fn split_at(&self, position: u64) -> Option<(Clip, Clip)> {
        if !self.contains_timeline_position(position) || position == self.timeline_start {
            return None;
        }
        let offset_into_clip = position - self.timeline_start;

        let mut left = self.duplicate();
        left.id = Uuid::new_v4();
        // left keeps trim_start, gains a new trim_end to stop at the split.
        left.trim_end = self.trim_end + (self.duration_frames() - offset_into_clip);

        let mut right = self.duplicate();
        right.id = Uuid::new_v4();
        right.timeline_start = position;
        right.trim_start = self.trim_start + offset_into_clip;

        Some((left, right))
    }

    pub fn duplicate(&self) -> Clip {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy
    }
}

/// A single track (the original calls this a "playlist lane"): an ordered,
/// non-overlapping-by-convention set of clips plus per-track mix state.
#[derive(Clone)]
pub struct Track {
    pub id: Uuid,
    pub name: String,
    pub clips: Vec<Clip>,
    pub volume: f32,
    /// -1.0 (full left) to +1.0 (full right).
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            clips: Vec::new(),
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        }
    }

    pub fn add_clip(&mut self, clip: Clip) {
        self.clips.push(clip);
        self.clips.sort_by_key(|c| c.timeline_start);
    }

    pub fn remove_clip(&mut self, id: Uuid) -> Option<Clip> {
        let idx = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(idx))
    }

    pub fn clip_at(&self, position: u64) -> Option<&Clip> {
        self.clips.iter().find(|c| c.contains_timeline_position(position))
    }
}

/// The full editable project: an ordered set of tracks.
#[derive(Clone, Default)]
pub struct Project {
    pub tracks: Vec<Track>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Whether any track has `solo` set — if so, non-soloed tracks are
    /// implicitly muted at render time (see `graph_builder`).
    pub fn any_track_soloed(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_clip(timeline_start: u64, frames: u64) -> Clip {
        let source = AudioBuffer::new_ready(vec![0.0; frames as usize], 1, 44100, PathBuf::from("x.wav"));
        Clip::new("clip", timeline_start, PathBuf::from("x.wav"), source)
    }

    #[test]
    fn test_duration_accounts_for_trim() {
        let mut clip = dummy_clip(0, 1000);
        clip.trim_start = 100;
        clip.trim_end = 50;
        assert_eq!(clip.duration_frames(), 850);
        assert_eq!(clip.timeline_end(), 850);
    }

    #[test]
    fn test_contains_timeline_position() {
        let clip = dummy_clip(100, 500);
        assert!(!clip.contains_timeline_position(99));
        assert!(clip.contains_timeline_position(100));
        assert!(clip.contains_timeline_position(599));
        assert!(!clip.contains_timeline_position(600));
    }

    #[test]
    fn test_timeline_to_source_position_respects_trim() {
        let mut clip = dummy_clip(100, 500);
        clip.trim_start = 20;
        assert_eq!(clip.timeline_to_source_position(100), Some(20));
        assert_eq!(clip.timeline_to_source_position(150), Some(70));
        assert_eq!(clip.timeline_to_source_position(50), None);
    }

    #[test]
    fn test_split_produces_contiguous_halves() {
        let clip = dummy_clip(0, 1000);
        let (left, right) = clip.split_at(400).unwrap();
        assert_eq!(left.timeline_start, 0);
        assert_eq!(left.timeline_end(), 400);
        assert_eq!(right.timeline_start, 400);
        assert_eq!(right.timeline_end(), 1000);
        assert_ne!(left.id, right.id);
        assert_ne!(left.id, clip.id);
    }

    #[test]
    fn test_split_outside_range_fails() {
        let clip = dummy_clip(0, 1000);
        assert!(clip.split_at(1000).is_none());
        assert!(clip.split_at(0).is_none());
    }

    #[test]
    fn test_track_clips_sorted_by_timeline_start() {
        let mut track = Track::new("t1");
        track.add_clip(dummy_clip(500, 100));
        track.add_clip(dummy_clip(0, 100));
        assert_eq!(track.clips[0].timeline_start, 0);
        assert_eq!(track.clips[1].timeline_start, 500);
    }

    #[test]
    fn test_any_track_soloed() {
        let mut project = Project::new();
        project.add_track(Track::new("a"));
        let mut b = Track::new("b");
        b.solo = true;
        project.add_track(b);
        assert!(project.any_track_soloed());
    }
}
