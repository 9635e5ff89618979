//! Symphonia-backed decoding for everything that isn't WAV (`wav.rs` handles
//! that format itself, per §9 Open Questions — there is no silent format
//! guessing fallback between the two paths).

use std::path::Path;

use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{EngineError, Result};

/// Fully decoded, non-WAV audio. Channels are interleaved `f32` in `[-1, 1]`.
pub struct DecodedAudio {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

/// Decode an entire file up front. Used by the sample pool for non-streaming
/// (fully cached) clips; `streaming_decoder` drives the same symphonia
/// machinery incrementally for large files.
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound(path.to_path_buf())
        } else {
            EngineError::Io(e)
        }
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| EngineError::Decode(format!("probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::Decode("no decodable audio track".to_string()))?
        .clone();

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .ok_or_else(|| EngineError::Decode("track has no channel layout".to_string()))?;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EngineError::Decode("track has no sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::Decode(format!("unsupported codec: {e}")))?;

    let track_id = track.id;
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(EngineError::Decode(format!("packet read failed: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(audio_buf) => append_interleaved(&audio_buf, &mut samples),
            Err(SymphoniaError::DecodeError(_)) => continue, // skip corrupt packet, keep going
            Err(e) => return Err(EngineError::Decode(format!("decode failed: {e}"))),
        }
    }

    Ok(DecodedAudio {
        channels,
        sample_rate,
        samples,
    })
}

fn append_interleaved(audio_buf: &AudioBufferRef, out: &mut Vec<f32>) {
    match audio_buf {
        AudioBufferRef::F32(buf) => interleave_into(buf.planes().planes(), buf.frames(), out),
        AudioBufferRef::U8(buf) => interleave_convert(buf.planes().planes(), buf.frames(), out, |s| {
            (*s as f32 - 128.0) / 128.0
        }),
        AudioBufferRef::S16(buf) => interleave_convert(buf.planes().planes(), buf.frames(), out, |s| {
            *s as f32 / i16::MAX as f32
        }),
        AudioBufferRef::S24(buf) => interleave_convert(buf.planes().planes(), buf.frames(), out, |s| {
            s.inner() as f32 / 8_388_608.0
        }),
        AudioBufferRef::S32(buf) => interleave_convert(buf.planes().planes(), buf.frames(), out, |s| {
            *s as f32 / i32::MAX as f32
        }),
        AudioBufferRef::F64(buf) => interleave_convert(buf.planes().planes(), buf.frames(), out, |s| *s as f32),
        _ => {
            // Remaining symphonia sample types (S8, U16, U24, U32) are not
            // produced by the codecs this crate enables; skip silently
            // rather than failing a whole decode over one unusual packet.
        }
    }
}

fn interleave_into(planes: &[&[f32]], frames: usize, out: &mut Vec<f32>) {
    let channels = planes.len();
    out.reserve(frames * channels);
    for frame in 0..frames {
        for plane in planes {
            out.push(plane[frame]);
        }
    }
}

fn interleave_convert<S: Copy>(planes: &[&[S]], frames: usize, out: &mut Vec<f32>, convert: impl Fn(&S) -> f32) {
    let channels = planes.len();
    out.reserve(frames * channels);
    for frame in 0..frames {
        for plane in planes {
            out.push(convert(&plane[frame]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reports_not_found() {
        let result = decode_file("/nonexistent/path/clip.mp3");
        assert!(matches!(result, Err(EngineError::FileNotFound(_))));
    }
}
