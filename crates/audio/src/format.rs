//! Linear PCM format descriptions.
//!
//! Audio on the realtime channel is always little-endian signed linear PCM.
//! The service labels each chunk with a MIME-style type such as
//! `audio/pcm;rate=24000`; a missing `rate` means [`DEFAULT_OUTPUT_SAMPLE_RATE`].

use crate::AudioError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Sample rate assumed for model audio whose MIME type carries no `rate`.
pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Sample rate the service expects for microphone input.
pub const DEFAULT_INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample layout of a PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 16 kHz mono 16-bit, the input format of the live API.
    pub const INPUT: Self = Self::mono16(DEFAULT_INPUT_SAMPLE_RATE);
    /// 24 kHz mono 16-bit, the output format of the live API.
    pub const OUTPUT: Self = Self::mono16(DEFAULT_OUTPUT_SAMPLE_RATE);

    pub const fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            bits_per_sample: 16,
        }
    }

    /// Parses a MIME-style type (`audio/pcm;rate=24000`, `audio/L16;codec=pcm;rate=16000`).
    pub fn from_mime(mime: &str) -> Result<Self, AudioError> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next().unwrap_or("").to_ascii_lowercase();
        let bits_per_sample = match essence.as_str() {
            "audio/pcm" | "audio/l16" => 16,
            "audio/l8" => 8,
            "audio/l24" => 24,
            _ => return Err(AudioError::UnsupportedMime(mime.to_string())),
        };

        let mut format = Self {
            sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            channels: 1,
            bits_per_sample,
        };
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => format.sample_rate = parse_positive(param, value)?,
                "channels" => format.channels = parse_positive(param, value)?,
                "bits" => format.bits_per_sample = parse_positive(param, value)?,
                _ => {}
            }
        }
        format.validate()?;
        Ok(format)
    }

    /// Renders the MIME-style type the service understands for this format.
    pub fn to_mime(&self) -> String {
        let mut mime = if self.bits_per_sample == 16 {
            format!("audio/pcm;rate={}", self.sample_rate)
        } else {
            format!("audio/L{};rate={}", self.bits_per_sample, self.sample_rate)
        };
        if self.channels != 1 {
            mime.push_str(&format!(";channels={}", self.channels));
        }
        mime
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(AudioError::UnsupportedDepth(self.bits_per_sample));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(AudioError::InvalidMimeParameter(format!(
                "rate={} channels={}",
                self.sample_rate, self.channels
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.sample_rate as usize
    }

    /// Playback duration of `bytes` bytes of audio in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = (bytes / self.frame_size().max(1)) as u128;
        let nanos = frames * 1_000_000_000 / u128::from(self.sample_rate.max(1));
        Duration::from_nanos(nanos as u64)
    }

    /// Whole-frame byte count that plays for (at most) `duration`.
    pub fn bytes_in(&self, duration: Duration) -> usize {
        let frames = duration.as_nanos() * u128::from(self.sample_rate) / 1_000_000_000;
        frames as usize * self.frame_size()
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz/{} ch/{}-bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

fn parse_positive<T>(param: &str, value: &str) -> Result<T, AudioError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    value
        .parse::<T>()
        .ok()
        .filter(|v| *v != T::default())
        .ok_or_else(|| AudioError::InvalidMimeParameter(param.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mime_with_rate() {
        let format = PcmFormat::from_mime("audio/pcm;rate=16000").unwrap();
        assert_eq!(format, PcmFormat::INPUT);
    }

    #[test]
    fn test_from_mime_defaults_rate() {
        let format = PcmFormat::from_mime("audio/pcm").unwrap();
        assert_eq!(format.sample_rate, DEFAULT_OUTPUT_SAMPLE_RATE);
        assert_eq!(format.channels, 1);
        assert_eq!(format.bits_per_sample, 16);
    }

    #[test]
    fn test_from_mime_l16_with_extra_params() {
        let format = PcmFormat::from_mime("audio/L16; codec=pcm; rate=24000; channels=2").unwrap();
        assert_eq!(format.sample_rate, 24000);
        assert_eq!(format.channels, 2);
        assert_eq!(format.bits_per_sample, 16);
    }

    #[test]
    fn test_from_mime_rejects_unknown_types() {
        assert!(matches!(
            PcmFormat::from_mime("audio/opus"),
            Err(AudioError::UnsupportedMime(_))
        ));
        assert!(matches!(
            PcmFormat::from_mime("audio/pcm;rate=fast"),
            Err(AudioError::InvalidMimeParameter(_))
        ));
        assert!(matches!(
            PcmFormat::from_mime("audio/pcm;rate=0"),
            Err(AudioError::InvalidMimeParameter(_))
        ));
    }

    #[test]
    fn test_to_mime() {
        assert_eq!(PcmFormat::OUTPUT.to_mime(), "audio/pcm;rate=24000");
        let stereo24 = PcmFormat {
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 24,
        };
        assert_eq!(stereo24.to_mime(), "audio/L24;rate=48000;channels=2");
        assert_eq!(PcmFormat::from_mime(&stereo24.to_mime()).unwrap(), stereo24);
    }

    #[test]
    fn test_durations() {
        let format = PcmFormat::INPUT;
        assert_eq!(format.bytes_per_second(), 32000);
        assert_eq!(format.duration_of(32000), Duration::from_secs(1));
        assert_eq!(format.duration_of(3200), Duration::from_millis(100));
        assert_eq!(format.bytes_in(Duration::from_millis(20)), 640);
        // Partial trailing frames never count.
        assert_eq!(format.duration_of(3), format.duration_of(2));
    }
}
