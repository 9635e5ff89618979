//! The real-time audio callback core. Everything in `process_block` runs on
//! the audio thread: no allocation, no locking beyond the command queue's
//! producer-side mutex (never touched here), no blocking.
//!
//! Grounded on `NomadAudio/include/AudioEngine.h`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::command_queue::{Command, CommandQueue};
use crate::config::EngineConfig;
use crate::engine_state::EngineState;
use crate::graph::AudioGraph;
use crate::interpolators::{self, InterpolationQuality};
use crate::smoothing::SmoothedParamD;
use crate::telemetry::Telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeState {
    None,
    FadingIn,
    FadingOut,
    Silent,
}

/// Per-track real-time state carried across blocks: smoothed parameters,
/// mute/solo flags, and a per-track scratch bus.
struct TrackRtState {
    volume: SmoothedParamD,
    pan: SmoothedParamD,
    mute: bool,
    solo: bool,
    scratch: Vec<f64>, // interleaved stereo
}

impl TrackRtState {
    fn new(max_frames: usize, coeff: f64) -> Self {
        Self {
            volume: SmoothedParamD::new(1.0, coeff),
            pan: SmoothedParamD::new(0.0, coeff),
            mute: false,
            solo: false,
            scratch: vec![0.0; max_frames * 2],
        }
    }
}

struct DcBlocker {
    x1: f64,
    y1: f64,
    r: f64,
}

impl DcBlocker {
    fn new(r: f64) -> Self {
        Self { x1: 0.0, y1: 0.0, r }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let y = x - self.x1 + self.r * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }
}

#[inline]
fn soft_clip(x: f64) -> f64 {
    if x > 1.5 {
        1.0
    } else if x < -1.5 {
        -1.0
    } else {
        x * (27.0 + x * x) / (27.0 + 9.0 * x * x)
    }
}

#[inline]
fn constant_power_pan(pan: f64) -> (f64, f64) {
    let angle = (pan + 1.0) * std::f64::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// Block-averaged peak/RMS, one pair per channel, read by the UI.
#[derive(Debug, Default)]
pub struct PeakMeters {
    peak_l_bits: AtomicU32,
    peak_r_bits: AtomicU32,
    rms_l_bits: AtomicU32,
    rms_r_bits: AtomicU32,
}

impl PeakMeters {
    fn update(&self, peak_l: f32, peak_r: f32, rms_l: f32, rms_r: f32) {
        self.peak_l_bits.store(peak_l.to_bits(), Ordering::Relaxed);
        self.peak_r_bits.store(peak_r.to_bits(), Ordering::Relaxed);
        self.rms_l_bits.store(rms_l.to_bits(), Ordering::Relaxed);
        self.rms_r_bits.store(rms_r.to_bits(), Ordering::Relaxed);
    }

    pub fn peak(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_l_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_r_bits.load(Ordering::Relaxed)),
        )
    }

    pub fn rms(&self) -> (f32, f32) {
        (
            f32::from_bits(self.rms_l_bits.load(Ordering::Relaxed)),
            f32::from_bits(self.rms_r_bits.load(Ordering::Relaxed)),
        )
    }
}

/// Real-time engine core. Owns all RT-thread scratch state; the only
/// cross-thread surfaces are `engine_state`, `commands`, `telemetry`, and
/// `meters`, all designed for lock-free or mutex-light access.
pub struct AudioEngine {
    pub engine_state: std::sync::Arc<EngineState>,
    pub commands: std::sync::Arc<CommandQueue>,
    pub telemetry: std::sync::Arc<Telemetry>,
    pub meters: std::sync::Arc<PeakMeters>,

    sample_rate: f64,
    max_frames: usize,
    interpolation: InterpolationQuality,
    config: EngineConfig,

    track_states: HashMap<usize, TrackRtState>,
    master_gain: SmoothedParamD,
    headroom_linear: f64,
    dc_blocker_l: DcBlocker,
    dc_blocker_r: DcBlocker,

    /// Pre-allocated master bus scratch, sized to `max_frames` once in `new`
    /// so `process_block` never allocates.
    master_l: Vec<f64>,
    master_r: Vec<f64>,

    global_sample_pos: u64,
    playing: bool,
    transport_fade: FadeState,
    transport_fade_counter: u32,

    command_scratch: Vec<Command>,
    ftz_enabled: bool,
}

impl AudioEngine {
    pub fn new(
        sample_rate: f64,
        max_frames: usize,
        config: EngineConfig,
        engine_state: std::sync::Arc<EngineState>,
        commands: std::sync::Arc<CommandQueue>,
        telemetry: std::sync::Arc<Telemetry>,
    ) -> Self {
        let headroom_linear = config.headroom_linear() as f64;
        Self {
            engine_state,
            commands,
            telemetry,
            meters: std::sync::Arc::new(PeakMeters::default()),
            sample_rate,
            max_frames,
            interpolation: InterpolationQuality::Cubic,
            dc_blocker_l: DcBlocker::new(config.dc_blocker_r),
            dc_blocker_r: DcBlocker::new(config.dc_blocker_r),
            master_gain: SmoothedParamD::new(config.master_gain as f64, config.smoothing_coeff),
            headroom_linear,
            config,
            track_states: HashMap::new(),
            master_l: vec![0.0; max_frames],
            master_r: vec![0.0; max_frames],
            global_sample_pos: 0,
            playing: false,
            transport_fade: FadeState::None,
            transport_fade_counter: 0,
            command_scratch: Vec::with_capacity(64),
            ftz_enabled: false,
        }
    }

    pub fn set_interpolation_quality(&mut self, quality: InterpolationQuality) {
        self.interpolation = quality;
    }

    pub fn global_sample_pos(&self) -> u64 {
        self.global_sample_pos
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Enable flush-to-zero / denormals-are-zero on x86/x64. No-op on other
    /// architectures, called once on the audio thread's first callback.
    fn ensure_ftz(&mut self) {
        if self.ftz_enabled {
            return;
        }
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_MM_SET_FLUSH_ZERO_MODE, _MM_FLUSH_ZERO_ON, _MM_SET_DENORMALS_ZERO_MODE, _MM_DENORMALS_ZERO_ON};
            _MM_SET_FLUSH_ZERO_MODE(_MM_FLUSH_ZERO_ON);
            _MM_SET_DENORMALS_ZERO_MODE(_MM_DENORMALS_ZERO_ON);
        }
        self.ftz_enabled = true;
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::SetTrackVolume { track_index, volume } => {
                if let Some(state) = self.track_states.get_mut(&track_index) {
                    state.volume.set_target(volume as f64);
                }
            }
            Command::SetTrackPan { track_index, pan } => {
                if let Some(state) = self.track_states.get_mut(&track_index) {
                    state.pan.set_target(pan as f64);
                }
            }
            Command::SetTrackMute { track_index, mute } => {
                if let Some(state) = self.track_states.get_mut(&track_index) {
                    state.mute = mute;
                }
            }
            Command::SetTrackSolo { track_index, solo } => {
                if let Some(state) = self.track_states.get_mut(&track_index) {
                    state.solo = solo;
                }
            }
            Command::SetTransportPlaying(playing) => {
                let was_playing = self.playing;
                self.playing = playing;
                if playing && !was_playing {
                    self.transport_fade = FadeState::FadingIn;
                    self.transport_fade_counter = 0;
                } else if !playing && was_playing {
                    self.transport_fade = FadeState::FadingOut;
                    self.transport_fade_counter = 0;
                }
            }
            Command::SeekTo { timeline_frame } => {
                self.global_sample_pos = timeline_frame;
            }
        }
    }

    /// Linear gain for the transport fade state machine at a given sample
    /// offset within the current block; advances `transport_fade_counter`.
    fn transport_fade_gain(&mut self) -> f64 {
        let fade_in = self.config.transport_fade_in_frames;
        let fade_out = self.config.transport_fade_out_frames;
        match self.transport_fade {
            FadeState::None => 1.0,
            FadeState::Silent => 0.0,
            FadeState::FadingIn => {
                let g = (self.transport_fade_counter as f64 / fade_in as f64).min(1.0);
                self.transport_fade_counter += 1;
                if self.transport_fade_counter >= fade_in {
                    self.transport_fade = FadeState::None;
                }
                g
            }
            FadeState::FadingOut => {
                let g = 1.0 - (self.transport_fade_counter as f64 / fade_out as f64).min(1.0);
                self.transport_fade_counter += 1;
                if self.transport_fade_counter >= fade_out {
                    self.transport_fade = FadeState::Silent;
                }
                g
            }
        }
    }

    /// Render `frames` stereo frames into `out` (interleaved, length
    /// `frames * 2`). Never allocates, never blocks, never panics on bad
    /// input short of a debug assertion on buffer length.
    pub fn process_block(&mut self, out: &mut [f32], frames: usize) {
        debug_assert!(out.len() >= frames * 2);
        self.ensure_ftz();

        // Drain by index rather than draining the `Vec` itself — `Command`
        // is `Copy`, so indexing it out leaves `command_scratch`'s capacity
        // untouched for the next block instead of reallocating.
        self.command_scratch.clear();
        self.commands.drain_into(&mut self.command_scratch);
        for i in 0..self.command_scratch.len() {
            let command = self.command_scratch[i];
            self.apply_command(command);
        }

        let graph: &AudioGraph = self.engine_state.active_graph();
        let solo_active = graph.any_track_soloed();

        for sample in out.iter_mut().take(frames * 2) {
            *sample = 0.0;
        }

        for v in self.master_l.iter_mut().take(frames) {
            *v = 0.0;
        }
        for v in self.master_r.iter_mut().take(frames) {
            *v = 0.0;
        }

        let clip_edge_fade_frames = self.config.clip_edge_fade_frames;
        let coeff = self.config.smoothing_coeff;
        let max_frames = self.max_frames;

        for track in &graph.tracks {
            let state = self
                .track_states
                .entry(track.track_index)
                .or_insert_with(|| TrackRtState::new(max_frames, coeff));

            for v in state.scratch.iter_mut().take(frames * 2) {
                *v = 0.0;
            }

            if self.playing {
                for clip in &track.clips {
                    render_clip_into(
                        clip,
                        self.global_sample_pos,
                        frames,
                        self.sample_rate,
                        self.interpolation,
                        clip_edge_fade_frames,
                        &mut state.scratch,
                    );
                }
            }

            let effective_mute = track.mute || state.mute || (solo_active && !(track.solo || state.solo));

            for i in 0..frames {
                let vol = state.volume.next();
                let (pan_l, pan_r) = constant_power_pan(state.pan.next());
                let gain = if effective_mute { 0.0 } else { vol };
                self.master_l[i] += state.scratch[i * 2] * gain * pan_l;
                self.master_r[i] += state.scratch[i * 2 + 1] * gain * pan_r;
            }
        }

        let mut sum_sq_l = 0.0f64;
        let mut sum_sq_r = 0.0f64;
        let mut peak_l = 0.0f64;
        let mut peak_r = 0.0f64;

        for i in 0..frames {
            let fade_gain = self.transport_fade_gain();
            let gain = self.master_gain.next();

            let mut l = self.master_l[i] * gain * fade_gain * self.headroom_linear;
            let mut r = self.master_r[i] * gain * fade_gain * self.headroom_linear;

            if self.config.safety_processing_enabled {
                l = soft_clip(self.dc_blocker_l.process(l));
                r = soft_clip(self.dc_blocker_r.process(r));
            }

            peak_l = peak_l.max(l.abs());
            peak_r = peak_r.max(r.abs());
            sum_sq_l += l * l;
            sum_sq_r += r * r;

            out[i * 2] = l as f32;
            out[i * 2 + 1] = r as f32;

            if self.playing {
                self.global_sample_pos += 1;
            }
        }

        let rms_l = (sum_sq_l / frames.max(1) as f64).sqrt();
        let rms_r = (sum_sq_r / frames.max(1) as f64).sqrt();
        self.meters.update(peak_l as f32, peak_r as f32, rms_l as f32, rms_r as f32);
    }
}

/// Resample and mix one clip's contribution for this block into `scratch`
/// (interleaved stereo), applying edge fades and clip gain/pan.
fn render_clip_into(
    clip: &crate::graph::ClipRenderState,
    global_sample_pos: u64,
    frames: usize,
    engine_sample_rate: f64,
    quality: InterpolationQuality,
    clip_edge_fade_frames: u32,
    scratch: &mut [f64],
) {
    let block_start = global_sample_pos;
    let block_end = global_sample_pos + frames as u64;
    if clip.timeline_end() <= block_start || clip.timeline_start() >= block_end {
        return;
    }

    let source_sample_rate = clip.audio_data.sample_rate as f64;
    let rate_ratio = source_sample_rate / engine_sample_rate;
    let (pan_l, pan_r) = constant_power_pan(clip.pan as f64);
    let channels = clip.audio_data.channels.max(1);
    let total_frames = clip.audio_data.num_frames;

    for output_frame in 0..frames {
        let timeline_pos = block_start + output_frame as u64;
        if timeline_pos < clip.timeline_start() || timeline_pos >= clip.timeline_end() {
            continue;
        }

        // `frames_into_clip` advances at the engine's own rate; multiplying
        // by `rate_ratio` converts that into source-rate frames read from
        // `sample_offset`, the clip's trim-start in the source's own rate.
        let frames_into_clip = timeline_pos - clip.timeline_start();
        let source_pos = clip.sample_offset as f64 + frames_into_clip as f64 * rate_ratio;

        let left = interpolators::interpolate(quality, &clip.audio_data.data, total_frames, source_pos, 0, channels);
        let right = if channels > 1 {
            interpolators::interpolate(quality, &clip.audio_data.data, total_frames, source_pos, 1, channels)
        } else {
            left
        };

        let edge_fade = clip_edge_fade_gain(frames_into_clip, clip.duration_samples(), clip_edge_fade_frames);
        let gain = clip.gain as f64 * edge_fade;

        scratch[output_frame * 2] += left as f64 * gain * pan_l;
        scratch[output_frame * 2 + 1] += right as f64 * gain * pan_r;
    }
}

/// Linear ramp over `fade_frames` at the head and tail of a clip.
fn clip_edge_fade_gain(frames_into_clip: u64, duration: u64, fade_frames: u32) -> f64 {
    let fade = fade_frames as u64;
    if duration <= fade * 2 {
        return 1.0; // too short to fade both ends without overlap
    }
    if frames_into_clip < fade {
        frames_into_clip as f64 / fade as f64
    } else if frames_into_clip >= duration - fade {
        (duration - frames_into_clip) as f64 / fade as f64
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ClipRenderState, TrackRenderState};
    use crate::sample_pool::AudioBuffer;
    use std::path::PathBuf;
    use std::sync::Arc;
    use uuid::Uuid;

    fn sine_buffer(freq: f64, sample_rate: f64, seconds: f64) -> Arc<AudioBuffer> {
        let frames = (sample_rate * seconds) as usize;
        let mut data = Vec::with_capacity(frames);
        for i in 0..frames {
            let t = i as f64 / sample_rate;
            data.push((2.0 * std::f64::consts::PI * freq * t).sin() as f32);
        }
        AudioBuffer::new_ready(data, 1, sample_rate as u32, PathBuf::from("sine.wav"))
    }

    fn make_engine(sample_rate: f64, max_frames: usize) -> AudioEngine {
        let state = std::sync::Arc::new(EngineState::new());
        let commands = std::sync::Arc::new(CommandQueue::new(64));
        let telemetry = std::sync::Arc::new(Telemetry::new());
        AudioEngine::new(sample_rate, max_frames, EngineConfig::default(), state, commands, telemetry)
    }

    #[test]
    fn test_silence_when_not_playing() {
        let mut engine = make_engine(48000.0, 256);
        let mut out = vec![0.0f32; 256 * 2];
        engine.process_block(&mut out, 256);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_scenario_a_steady_mix_peaks_and_no_clipping() {
        let sample_rate = 48000.0;
        let frames = 256;
        let mut engine = make_engine(sample_rate, frames);

        let buf1 = sine_buffer(440.0, 48000.0, 1.0);
        let buf2 = sine_buffer(880.0, 44100.0, 1.0);

        let mut graph = AudioGraph::new();
        let track1_id = Uuid::new_v4();
        let track2_id = Uuid::new_v4();

        graph.tracks.push(TrackRenderState {
            track_id: track1_id,
            track_index: 0,
            clips: vec![ClipRenderState {
                clip_id: Uuid::new_v4(),
                audio_data: buf1.clone(),
                sample_offset: 0,
                start_sample: 0,
                // buf1 is already at the engine's own 48000 Hz rate, so its
                // one-second duration is 48000 samples on both clocks.
                end_sample: 48000,
                gain: 1.0,
                pan: -1.0,
            }],
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        });
        graph.tracks.push(TrackRenderState {
            track_id: track2_id,
            track_index: 1,
            clips: vec![ClipRenderState {
                clip_id: Uuid::new_v4(),
                audio_data: buf2.clone(),
                sample_offset: 0,
                start_sample: 0,
                // buf2 is recorded at 44100 Hz (source rate) but still plays
                // for a full real second, which is 48000 samples on the
                // engine's own 48000 Hz output-rate timeline — not buf2's
                // own 44100-frame length.
                end_sample: 48000,
                gain: 1.0,
                pan: 1.0,
            }],
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        });
        graph.timeline_end_sample = 48000;
        engine.engine_state.swap_graph(graph);
        engine.commands.push(Command::SetTransportPlaying(true));
        engine.set_interpolation_quality(InterpolationQuality::Cubic);

        let mut max_abs = 0.0f32;
        let total_blocks = 48000 / frames;
        for _ in 0..total_blocks {
            let mut out = vec![0.0f32; frames * 2];
            engine.process_block(&mut out, frames);
            for &s in &out {
                max_abs = max_abs.max(s.abs());
            }
        }
        assert!(max_abs <= 1.0);
        assert_eq!(engine.telemetry.xruns(), 0);
    }

    #[test]
    fn test_solo_silences_non_soloed_tracks() {
        let sample_rate = 48000.0;
        let frames = 128;
        let mut engine = make_engine(sample_rate, frames);
        let buf = sine_buffer(440.0, sample_rate, 0.1);

        let mut graph = AudioGraph::new();
        let soloed_id = Uuid::new_v4();
        let quiet_id = Uuid::new_v4();
        graph.tracks.push(TrackRenderState {
            track_id: soloed_id,
            track_index: 0,
            clips: vec![ClipRenderState {
                clip_id: Uuid::new_v4(),
                audio_data: buf.clone(),
                sample_offset: 0,
                start_sample: 0,
                end_sample: buf.num_frames,
                gain: 1.0,
                pan: 0.0,
            }],
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: true,
        });
        graph.tracks.push(TrackRenderState {
            track_id: quiet_id,
            track_index: 1,
            clips: vec![ClipRenderState {
                clip_id: Uuid::new_v4(),
                audio_data: buf.clone(),
                sample_offset: 0,
                start_sample: 0,
                end_sample: buf.num_frames,
                gain: 1.0,
                pan: 0.0,
            }],
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        });
        engine.engine_state.swap_graph(graph);
        engine.commands.push(Command::SetTransportPlaying(true));

        let mut out = vec![0.0f32; frames * 2];
        engine.process_block(&mut out, frames);
        let (peak_l, _) = engine.meters.peak();
        // With one track soloed contributing a full sine and one silenced,
        // peak should reflect roughly one track, not clip at full scale from two.
        assert!(peak_l > 0.0);
    }

    #[test]
    fn test_master_output_never_exceeds_unity_with_safety_processing() {
        let mut engine = make_engine(48000.0, 256);
        engine.config.master_gain = 4.0; // deliberately hot signal
        engine.master_gain = SmoothedParamD::new(4.0, engine.config.smoothing_coeff);
        let buf = sine_buffer(1000.0, 48000.0, 0.2);

        let mut graph = AudioGraph::new();
        graph.tracks.push(TrackRenderState {
            track_id: Uuid::new_v4(),
            track_index: 0,
            clips: vec![ClipRenderState {
                clip_id: Uuid::new_v4(),
                audio_data: buf.clone(),
                sample_offset: 0,
                start_sample: 0,
                end_sample: buf.num_frames,
                gain: 1.0,
                pan: 0.0,
            }],
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
        });
        engine.engine_state.swap_graph(graph);
        engine.commands.push(Command::SetTransportPlaying(true));

        for _ in 0..30 {
            let mut out = vec![0.0f32; 256 * 2];
            engine.process_block(&mut out, 256);
            for &s in &out {
                assert!(s.abs() <= 1.0001, "sample exceeded unity: {s}");
            }
        }
    }
}
