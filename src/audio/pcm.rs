//! Linear PCM helpers
//!
//! Capture produces normalized f32 samples; the wire carries 16-bit signed
//! little-endian PCM. Negative values scale by 32768 and positive values by
//! 32767 so both ends of the range map exactly.

/// Convert one normalized sample to i16, clamping to [-1, 1] first.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Inverse of [`f32_to_i16`].
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Encode normalized samples as little-endian 16-bit PCM bytes.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| f32_to_i16(s).to_le_bytes())
        .collect()
}

/// Decode little-endian 16-bit PCM bytes. Returns `None` on odd length.
pub fn decode_pcm16(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(2)
            .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
            .collect(),
    )
}

/// True when every sample's magnitude is below `threshold`.
pub fn is_silent(samples: &[f32], threshold: f32) -> bool {
    samples.iter().all(|s| s.abs() < threshold)
}

/// Root-mean-square energy, 0.0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler for mono audio.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            if idx >= last {
                return samples[last];
            }
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[idx + 1] - samples[idx]) * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale_round_trip() {
        let step = 1.0 / 32768.0;

        let pos = i16_to_f32(f32_to_i16(1.0));
        assert!((pos - 1.0).abs() <= step, "+1.0 came back as {}", pos);

        let neg = i16_to_f32(f32_to_i16(-1.0));
        assert!((neg + 1.0).abs() <= step, "-1.0 came back as {}", neg);
    }

    #[test]
    fn test_zero_round_trips_exactly() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(i16_to_f32(f32_to_i16(0.0)), 0.0);
    }

    #[test]
    fn test_extremes_map_to_i16_bounds() {
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(f32_to_i16(3.5), i16::MAX);
        assert_eq!(f32_to_i16(-7.0), i16::MIN);
        assert_eq!(f32_to_i16(f32::NAN), 0);
    }

    #[test]
    fn test_encode_is_little_endian() {
        let bytes = encode_pcm16(&[1.0, -1.0]);
        assert_eq!(bytes, vec![0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        assert!(decode_pcm16(&[0, 1, 2]).is_none());
        assert_eq!(decode_pcm16(&[]).map(|v| v.len()), Some(0));
    }

    #[test]
    fn test_silence_detection() {
        assert!(is_silent(&[0.0, 0.001, -0.002], 0.01));
        assert!(!is_silent(&[0.0, 0.5, 0.0], 0.01));
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_downmix() {
        let mono = downmix_to_mono(&[0.2, 0.4, -1.0, 1.0], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_resample_halves_length() {
        let input: Vec<f32> = (0..3200).map(|i| (i as f32 / 3200.0)).collect();
        let output = resample_linear(&input, 32000, 16000);
        assert_eq!(output.len(), 1600);
        assert!((output[100] - input[200]).abs() < 1e-4);
    }
}
