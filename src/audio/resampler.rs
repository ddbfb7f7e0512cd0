//! Sample-rate conversion between the fixed capture format and playback devices.
//!
//! Everything here is a pure function over sample slices.

/// Sample rate of every buffer returned by the capture backend.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

const I16_SCALE: f64 = 32768.0;

/// Convert 16-bit-range integer PCM at `in_rate` into normalized floats at `out_rate`
/// using linear interpolation.
///
/// Values are divided by 32768 without clamping, so inputs slightly outside the
/// 16-bit range come through scaled rather than clipped.
pub fn resample_i16_to_f32<S>(samples: &[S], in_rate: u32, out_rate: u32) -> Vec<f32>
where
    S: Copy + Into<f64>,
{
    if samples.is_empty() {
        return Vec::new();
    }

    if in_rate == out_rate {
        return samples
            .iter()
            .map(|&s| (s.into() / I16_SCALE) as f32)
            .collect();
    }

    let ratio = out_rate as f64 / in_rate as f64;
    let out_len = ((samples.len() as f64 * ratio).round() as usize).max(1);
    let last = samples.len() - 1;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let i0 = (src_pos.floor() as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = src_pos - i0 as f64;

        let s0: f64 = samples[i0].into();
        let s1: f64 = samples[i1].into();
        let value = s0 + (s1 - s0) * frac;

        out.push((value / I16_SCALE) as f32);
    }

    out
}

/// Resample normalized audio from one rate to another using linear interpolation.
/// Suitable for speech audio where perfect quality isn't critical.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = ((samples.len() as f64 * ratio).round() as usize).max(1);
    let last = samples.len() - 1;
    let mut resampled = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 / ratio;
        let src_idx = (src_pos as usize).min(last);
        let next_idx = (src_idx + 1).min(last);
        let frac = src_pos - src_idx as f64;

        let sample =
            samples[src_idx] as f64 * (1.0 - frac) + samples[next_idx] as f64 * frac;
        resampled.push(sample as f32);
    }

    resampled
}

/// Clamp a normalized sample and scale it to the signed 16-bit range.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
