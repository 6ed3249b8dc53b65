//! Sample conversion and resampling helpers for little-endian linear PCM.

use crate::AudioError;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Input per resampler chunk; device callbacks arrive at about this cadence.
const CHUNK_MILLIS: u32 = 20;

/// A mono rate converter from `from_rate` to `to_rate` Hz.
pub fn rate_converter(from_rate: u32, to_rate: u32) -> Result<FastFixedIn<f32>, AudioError> {
    let chunk = (from_rate * CHUNK_MILLIS / 1000).max(1) as usize;
    let converter = FastFixedIn::<f32>::new(
        f64::from(to_rate) / f64::from(from_rate),
        1.0,
        PolynomialDegree::Cubic,
        chunk,
        1,
    )?;
    Ok(converter)
}

/// Runs a whole buffer through `resampler`, flushing the trailing partial chunk.
pub fn resample(resampler: &mut FastFixedIn<f32>, input: &[f32]) -> Vec<f32> {
    let mut output = Vec::with_capacity(input.len());
    let mut remaining = input;
    while remaining.len() >= resampler.input_frames_next() {
        let (chunk, rest) = remaining.split_at(resampler.input_frames_next());
        match resampler.process(&[chunk], None) {
            Ok(mut res) => output.append(&mut res[0]),
            Err(e) => {
                tracing::warn!(error = %e, "Resampler rejected a chunk");
                return output;
            }
        }
        remaining = rest;
    }
    if !remaining.is_empty() {
        let tail: [&[f32]; 1] = [remaining];
        match resampler.process_partial(Some(&tail[..]), None) {
            Ok(mut res) => output.append(&mut res[0]),
            Err(e) => tracing::warn!(error = %e, "Resampler rejected the trailing chunk"),
        }
    }
    output
}

/// Quantises normalised samples to little-endian PCM16, saturating at full scale.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&sample| (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
        .flat_map(i16::to_le_bytes)
        .collect()
}

/// Serialises i16 samples as little-endian bytes.
pub fn i16_to_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Reads little-endian i16 samples; a trailing odd byte is ignored.
pub fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Decodes little-endian PCM of the given depth into normalised f32 samples.
///
/// 8-bit PCM is unsigned (WAV convention); wider depths are signed.
pub fn bytes_to_f32(bytes: &[u8], bits_per_sample: u16) -> Vec<f32> {
    match bits_per_sample {
        8 => bytes.iter().map(|&b| (b as f32 - 128.0) / 128.0).collect(),
        16 => bytes_to_i16(bytes)
            .into_iter()
            .map(|sample| f32::from(sample) / 32_768.0)
            .collect(),
        24 => bytes
            .chunks_exact(3)
            .map(|c| {
                let v = i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8;
                v as f32 / 8_388_608.0
            })
            .collect(),
        32 => bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32 / 2_147_483_648.0)
            .collect(),
        _ => Vec::new(),
    }
}

/// Averages interleaved frames down to one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Copies each mono sample into every channel of an interleaved frame.
pub fn upmix_from_mono(mono: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    mono.iter()
        .flat_map(|&sample| std::iter::repeat_n(sample, channels))
        .collect()
}

/// Root-mean-square of normalised samples; 0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_microphone_rate_to_session_rate() {
        let mut converter = rate_converter(48_000, 16_000).unwrap();
        // 100ms captured at 48kHz comes out as roughly 100ms at 16kHz.
        let output = resample(&mut converter, &vec![0.1f32; 4_800]);
        assert!((1_500..=1_650).contains(&output.len()), "got {}", output.len());
    }

    #[test]
    fn test_session_rate_to_speaker_rate() {
        let mut converter = rate_converter(24_000, 44_100).unwrap();
        let output = resample(&mut converter, &vec![0.1f32; 2_400]);
        assert!((4_200..=4_500).contains(&output.len()), "got {}", output.len());
    }

    #[test]
    fn test_f32_to_pcm16_saturates() {
        let bytes = f32_to_pcm16(&[0.0, 0.5, -0.5, 3.0, -3.0]);
        assert_eq!(
            bytes_to_i16(&bytes),
            vec![0, 16_383, -16_383, i16::MAX, -i16::MAX]
        );
        assert!(f32_to_pcm16(&[]).is_empty());
    }

    #[test]
    fn test_byte_conversions() {
        let samples = vec![256i16, -256i16, 0i16, i16::MIN];
        let bytes = i16_to_bytes(&samples);
        assert_eq!(bytes.len(), 8);
        assert_eq!(bytes_to_i16(&bytes), samples);

        // Odd trailing byte is dropped.
        assert_eq!(bytes_to_i16(&[0x00, 0x40, 0x7f]), vec![16384]);
    }

    #[test]
    fn test_bytes_to_f32_depths() {
        assert_eq!(bytes_to_f32(&[128, 0], 8), vec![0.0, -1.0]);
        assert_eq!(bytes_to_f32(&[0x00, 0x40, 0x00, 0x80], 16), vec![0.5, -1.0]);
        let half24 = bytes_to_f32(&[0x00, 0x00, 0x40], 24);
        assert_abs_diff_eq!(half24[0], 0.5, epsilon = 0.0001);
        let neg32 = bytes_to_f32(&i32::MIN.to_le_bytes(), 32);
        assert_abs_diff_eq!(neg32[0], -1.0, epsilon = 0.0001);
        assert!(bytes_to_f32(&[1, 2, 3], 12).is_empty());
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert_abs_diff_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5, epsilon = 0.0001);
        assert_abs_diff_eq!(rms(&[1.0, 0.0]), (0.5f32).sqrt(), epsilon = 0.0001);
    }

    #[test]
    fn test_channel_mixing() {
        assert_eq!(downmix_to_mono(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5f32, 0.0]);
        assert_eq!(downmix_to_mono(&[0.5, 0.25], 1), vec![0.5, 0.25]);
        assert_eq!(upmix_from_mono(&[0.1, 0.2], 2), vec![0.1, 0.1, 0.2, 0.2]);
        assert_eq!(upmix_from_mono(&[0.1], 0), vec![0.1]);
    }
}
