//! Keeps the tutor's audio for writing out as WAV.

use anyhow::{Context, Result};
use parla_audio::{AudioFragment, PcmFormat, wav::write_wav};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the tutor said, in arrival order.
///
/// Fragments share their samples with the playback queue, so holding them
/// costs no copies. Audio later cut off by an interruption is kept.
#[derive(Debug, Default)]
pub struct Recorder {
    format: Option<PcmFormat>,
    fragments: Vec<AudioFragment>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps `fragment` unless its format differs from the first one seen.
    pub fn record(&mut self, fragment: &AudioFragment) -> bool {
        let format = *self.format.get_or_insert(fragment.format());
        if fragment.format() != format {
            warn!(
                expected = %format,
                found = %fragment.format(),
                seq = fragment.seq(),
                "Skipping fragment in a different format"
            );
            return false;
        }
        self.fragments.push(fragment.clone());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.fragments.iter().map(AudioFragment::duration).sum()
    }

    /// Writes the recording to `path`. Nothing is written when it is empty.
    pub fn save(&self, path: &Path) -> Result<bool> {
        let Some(format) = self.format else {
            info!(path = %path.display(), "Nothing recorded; no file written");
            return Ok(false);
        };
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_wav(BufWriter::new(file), format, &self.fragments)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            path = %path.display(),
            seconds = self.duration().as_secs_f32(),
            "Recording saved"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_fragments_as_one_wav() {
        let mut recorder = Recorder::new();
        let first = AudioFragment::new(1, PcmFormat::OUTPUT, vec![1u8, 0, 2, 0]).unwrap();
        let second = AudioFragment::new(2, PcmFormat::OUTPUT, vec![3u8, 0]).unwrap();
        let other = AudioFragment::new(3, PcmFormat::INPUT, vec![9u8, 0]).unwrap();
        assert!(recorder.record(&first));
        assert!(recorder.record(&second));
        assert!(!recorder.record(&other));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tutor.wav");
        assert!(recorder.save(&path).unwrap());

        let mut reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24_000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3]);
    }

    #[test]
    fn empty_recording_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        assert!(!Recorder::new().save(&path).unwrap());
        assert!(!path.exists());
    }
}
