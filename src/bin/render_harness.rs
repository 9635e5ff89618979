//! Offline validation harness: builds a small graph, renders it block by
//! block through `AudioEngine::process_block` with no live device involved,
//! and writes the result to a WAV file. Used to reproduce the spec's
//! end-to-end scenarios without opening a real audio stream.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use daw_audio_engine::command_queue::{Command, CommandQueue};
use daw_audio_engine::config::EngineConfig;
use daw_audio_engine::engine::AudioEngine;
use daw_audio_engine::engine_state::EngineState;
use daw_audio_engine::graph_builder::build_from_project;
use daw_audio_engine::interpolators::InterpolationQuality;
use daw_audio_engine::model::{Clip, Project, Track};
use daw_audio_engine::sample_pool::{AudioBuffer, SamplePool};
use daw_audio_engine::telemetry::Telemetry;
use daw_audio_engine::wav::write_wav;

/// Render a timeline of input clips to a single stereo WAV file offline.
#[derive(Parser, Debug)]
#[command(name = "render-harness")]
struct Args {
    /// Input audio files to place as clips, one per track, starting at timeline 0.
    #[arg(long, value_name = "FILE", num_args = 1..)]
    input: Vec<PathBuf>,

    /// Output WAV path.
    #[arg(long, default_value = "render.wav")]
    output: PathBuf,

    /// Output sample rate.
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Block size in frames.
    #[arg(long, default_value_t = 256)]
    block_frames: usize,

    /// Total seconds to render.
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,

    /// Interpolation quality: linear, cubic, sinc8, sinc16, sinc32, sinc64.
    #[arg(long, default_value = "cubic")]
    quality: String,

    /// Path to an engine config TOML (defaults are used if absent).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_quality(s: &str) -> InterpolationQuality {
    match s.to_ascii_lowercase().as_str() {
        "linear" => InterpolationQuality::Linear,
        "sinc8" => InterpolationQuality::Sinc8,
        "sinc16" => InterpolationQuality::Sinc16,
        "sinc32" => InterpolationQuality::Sinc32,
        "sinc64" => InterpolationQuality::Sinc64,
        _ => InterpolationQuality::Cubic,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load_or_default(path),
        None => EngineConfig::default(),
    };

    let pool = SamplePool::new(config.sample_pool_budget_bytes);
    let mut project = Project::new();

    for input_path in &args.input {
        let buffer = pool.acquire(input_path, |p| load_any(p))?;
        let mut track = Track::new(input_path.to_string_lossy().to_string());
        track.add_clip(Clip::new("clip", 0, input_path.clone(), buffer));
        project.add_track(track);
    }

    let graph = build_from_project(&project, args.sample_rate as f64);
    let engine_state = Arc::new(EngineState::new());
    engine_state.swap_graph(graph);

    let commands = Arc::new(CommandQueue::new(64));
    let telemetry = Arc::new(Telemetry::new());
    let max_frames = args.block_frames;

    let mut engine = AudioEngine::new(
        args.sample_rate as f64,
        max_frames,
        config,
        engine_state,
        commands.clone(),
        telemetry.clone(),
    );
    engine.set_interpolation_quality(parse_quality(&args.quality));
    commands.push(Command::SetTransportPlaying(true));

    let total_frames = (args.seconds * args.sample_rate as f64) as u64;
    let mut rendered = Vec::with_capacity((total_frames * 2) as usize);
    let mut remaining = total_frames;

    while remaining > 0 {
        let this_block = remaining.min(max_frames as u64) as usize;
        let mut out = vec![0.0f32; this_block * 2];
        engine.process_block(&mut out, this_block);
        rendered.extend_from_slice(&out);
        remaining -= this_block as u64;
    }

    write_wav(&args.output, 2, args.sample_rate, &rendered)?;

    tracing::info!(
        "rendered {} frames to {:?} ({} x-runs, {} blocks)",
        total_frames,
        args.output,
        telemetry.xruns(),
        telemetry.blocks_processed(),
    );

    Ok(())
}

fn load_any(path: &std::path::Path) -> daw_audio_engine::Result<Arc<AudioBuffer>> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        let wav = daw_audio_engine::wav::load_wav(path)?;
        Ok(AudioBuffer::new_ready(wav.samples, wav.channels, wav.sample_rate, path.to_path_buf()))
    } else {
        let decoded = daw_audio_engine::platform_decoder::decode_file(path)?;
        Ok(AudioBuffer::new_ready(decoded.samples, decoded.channels, decoded.sample_rate, path.to_path_buf()))
    }
}
