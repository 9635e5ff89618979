//! Pure interpolation kernels used to resample clip audio to arbitrary
//! fractional source positions. All internal math is `f64` for headroom;
//! results are clamped to `[-1.0, 1.0]` before being handed back as `f32`.
//!
//! Source samples are addressed as `source[frame * num_channels + channel]`;
//! out-of-range frame indices read as silence (0.0).

use std::sync::OnceLock;

const PI: f64 = std::f64::consts::PI;

/// Interpolation quality, selectable per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationQuality {
    Linear,
    #[default]
    Cubic,
    Sinc8,
    Sinc16,
    Sinc32,
    Sinc64,
}

impl InterpolationQuality {
    fn sinc_half_width(self) -> Option<usize> {
        match self {
            InterpolationQuality::Sinc8 => Some(4),
            InterpolationQuality::Sinc16 => Some(8),
            InterpolationQuality::Sinc32 => Some(16),
            InterpolationQuality::Sinc64 => Some(32),
            _ => None,
        }
    }
}

#[inline]
fn read_sample(source: &[f32], total_samples: u64, frame: i64, channel: usize, num_channels: usize) -> f64 {
    if frame < 0 || frame as u64 >= total_samples {
        return 0.0;
    }
    let idx = frame as usize * num_channels + channel;
    source.get(idx).copied().unwrap_or(0.0) as f64
}

/// Dispatch to the selected interpolation kernel.
///
/// `position` is a fractional frame index into `source`. `total_samples` is
/// the frame count (not raw sample count) so bounds checks are channel-agnostic.
pub fn interpolate(
    quality: InterpolationQuality,
    source: &[f32],
    total_samples: u64,
    position: f64,
    channel: usize,
    num_channels: usize,
) -> f32 {
    match quality {
        InterpolationQuality::Linear => linear(source, total_samples, position, channel, num_channels),
        InterpolationQuality::Cubic => cubic_hermite(source, total_samples, position, channel, num_channels),
        _ => sinc(quality, source, total_samples, position, channel, num_channels),
    }
}

/// 2-point linear interpolation.
pub fn linear(source: &[f32], total_samples: u64, position: f64, channel: usize, num_channels: usize) -> f32 {
    let i0 = position.floor() as i64;
    let frac = position - i0 as f64;
    let s0 = read_sample(source, total_samples, i0, channel, num_channels);
    let s1 = read_sample(source, total_samples, i0 + 1, channel, num_channels);
    let y = s0 + frac * (s1 - s0);
    y.clamp(-1.0, 1.0) as f32
}

/// 4-point Catmull-Rom / cubic Hermite interpolation.
pub fn cubic_hermite(source: &[f32], total_samples: u64, position: f64, channel: usize, num_channels: usize) -> f32 {
    let i1 = position.floor() as i64;
    let frac = position - i1 as f64;

    let p0 = read_sample(source, total_samples, i1 - 1, channel, num_channels);
    let p1 = read_sample(source, total_samples, i1, channel, num_channels);
    let p2 = read_sample(source, total_samples, i1 + 1, channel, num_channels);
    let p3 = read_sample(source, total_samples, i1 + 2, channel, num_channels);

    let a0 = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let a1 = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let a2 = -0.5 * p0 + 0.5 * p2;
    let a3 = p1;

    let y = ((a0 * frac + a1) * frac + a2) * frac + a3;
    y.clamp(-1.0, 1.0) as f32
}

#[inline]
fn sinc_fn(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

#[inline]
fn blackman_window(n: f64, window_len: f64) -> f64 {
    // n in [0, window_len], centered window of total width window_len.
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    let frac = n / window_len;
    a0 - a1 * (2.0 * PI * frac).cos() + a2 * (4.0 * PI * frac).cos()
}

fn bessel_i0(x: f64) -> f64 {
    // Series expansion, sufficient precision for window coefficients.
    let mut sum = 1.0;
    let mut term = 1.0;
    let half_x_sq = (x / 2.0) * (x / 2.0);
    for k in 1..32 {
        term *= half_x_sq / (k as f64 * k as f64);
        sum += term;
        if term < 1e-15 * sum {
            break;
        }
    }
    sum
}

fn kaiser_beta(half_width: usize) -> f64 {
    match half_width {
        8 => 8.6,   // Sinc16
        16 => 9.6,  // Sinc32 (unstated in spec; midpoint of named endpoints)
        32 => 10.0, // Sinc64
        _ => 8.6,
    }
}

struct KaiserTable {
    half_width: usize,
    coeffs: Vec<f64>,
}

impl KaiserTable {
    fn build(half_width: usize) -> Self {
        let beta = kaiser_beta(half_width);
        let n = half_width * 2;
        let denom = bessel_i0(beta);
        let mut coeffs = vec![0.0; n + 1];
        for (i, c) in coeffs.iter_mut().enumerate() {
            let x = i as f64 - half_width as f64;
            let ratio = x / half_width as f64;
            let arg = beta * (1.0 - ratio * ratio).max(0.0).sqrt();
            *c = bessel_i0(arg) / denom;
        }
        Self { half_width, coeffs }
    }

    /// Index by `i + half_width`, matching spec §4.4's indexing rule.
    fn at(&self, i: i64) -> f64 {
        let idx = i + self.half_width as i64;
        if idx < 0 || idx as usize >= self.coeffs.len() {
            0.0
        } else {
            self.coeffs[idx as usize]
        }
    }
}

fn kaiser_table(half_width: usize) -> &'static KaiserTable {
    static TABLE_16: OnceLock<KaiserTable> = OnceLock::new();
    static TABLE_32: OnceLock<KaiserTable> = OnceLock::new();
    static TABLE_64: OnceLock<KaiserTable> = OnceLock::new();
    match half_width {
        4 => unreachable!("sinc8 uses the Blackman window, not Kaiser"),
        8 => TABLE_16.get_or_init(|| KaiserTable::build(8)),
        16 => TABLE_32.get_or_init(|| KaiserTable::build(16)),
        32 => TABLE_64.get_or_init(|| KaiserTable::build(32)),
        _ => TABLE_16.get_or_init(|| KaiserTable::build(8)),
    }
}

/// Windowed-sinc interpolation at one of the four supported widths.
pub fn sinc(
    quality: InterpolationQuality,
    source: &[f32],
    total_samples: u64,
    position: f64,
    channel: usize,
    num_channels: usize,
) -> f32 {
    let half_width = quality
        .sinc_half_width()
        .expect("sinc() called with a non-sinc quality");
    let center = position.floor() as i64;
    let frac = position - center as f64;

    let mut acc = 0.0f64;
    for tap in -(half_width as i64) + 1..=half_width as i64 {
        let sample_index = center + tap;
        let x = tap as f64 - frac;
        let window = if half_width == 4 {
            // Sinc8: Blackman window over the 8-tap span.
            blackman_window((tap + half_width as i64) as f64, (2 * half_width) as f64)
        } else {
            kaiser_table(half_width).at(tap)
        };
        let s = read_sample(source, total_samples, sample_index, channel, num_channels);
        acc += s * sinc_fn(x) * window;
    }

    acc.clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.01).collect()
    }

    #[test]
    fn test_linear_identity_at_integer_positions() {
        let source = ramp(8);
        for i in 0..8u64 {
            let y = linear(&source, 8, i as f64, 0, 1);
            assert_abs_diff_eq!(y, source[i as usize], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cubic_identity_at_integer_positions() {
        let source = ramp(8);
        for i in 2..6u64 {
            let y = cubic_hermite(&source, 8, i as f64, 0, 1);
            assert_abs_diff_eq!(y, source[i as usize], epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sinc_identity_at_integer_positions_interior() {
        let source = ramp(64);
        for quality in [
            InterpolationQuality::Sinc8,
            InterpolationQuality::Sinc16,
            InterpolationQuality::Sinc32,
            InterpolationQuality::Sinc64,
        ] {
            for i in 32..40u64 {
                let y = interpolate(quality, &source, 64, i as f64, 0, 1);
                assert_abs_diff_eq!(y, source[i as usize], epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_out_of_range_reads_as_silence() {
        let source = ramp(4);
        let y = linear(&source, 4, -1.0, 0, 1);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_results_clamped_to_unit_range() {
        let source = [2.0f32, -2.0, 2.0, -2.0];
        let y = cubic_hermite(&source, 4, 1.5, 0, 1);
        assert!((-1.0..=1.0).contains(&y));
    }

    #[test]
    fn test_stereo_channel_selection() {
        let source = [0.0f32, 1.0, 0.0, 1.0]; // L=0, R=1 repeating
        assert_abs_diff_eq!(linear(&source, 2, 0.0, 0, 2), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(linear(&source, 2, 0.0, 1, 2), 1.0, epsilon = 1e-6);
    }
}
