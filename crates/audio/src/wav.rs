//! WAV container encoding.
//!
//! A pure transform: fragments in, a self-describing RIFF/WAVE byte buffer
//! out. Nothing here touches the playback queue.

use crate::{AudioError, AudioFragment, PcmFormat};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::{Cursor, Seek, Write};

/// Serialises `fragments` (all in `format`) into one WAV file image.
pub fn encode_wav<'a>(
    format: PcmFormat,
    fragments: impl IntoIterator<Item = &'a AudioFragment>,
) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, format, fragments)?;
    Ok(cursor.into_inner())
}

/// Streams `fragments` as WAV into any seekable writer.
pub fn write_wav<'a, W: Write + Seek>(
    out: W,
    format: PcmFormat,
    fragments: impl IntoIterator<Item = &'a AudioFragment>,
) -> Result<(), AudioError> {
    format.validate()?;
    let spec = WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::new(out, spec)?;
    for fragment in fragments {
        if fragment.format() != format {
            return Err(AudioError::FormatMismatch {
                expected: format,
                found: fragment.format(),
            });
        }
        let data = fragment.data();
        match format.bits_per_sample {
            // WAV stores 8-bit as unsigned; hound takes signed and offsets it.
            8 => {
                for &b in data.iter() {
                    writer.write_sample((i16::from(b) - 128) as i8)?;
                }
            }
            16 => {
                for c in data.chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([c[0], c[1]]))?;
                }
            }
            24 => {
                for c in data.chunks_exact(3) {
                    writer.write_sample(i32::from_le_bytes([0, c[0], c[1], c[2]]) >> 8)?;
                }
            }
            _ => {
                for c in data.chunks_exact(4) {
                    writer.write_sample(i32::from_le_bytes([c[0], c[1], c[2], c[3]]))?;
                }
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm;
    use hound::WavReader;

    #[test]
    fn test_encodes_concatenated_fragments() {
        let format = PcmFormat::OUTPUT;
        let first = AudioFragment::new(1, format, pcm::i16_to_bytes(&[1, -2, 3])).unwrap();
        let second = AudioFragment::new(2, format, pcm::i16_to_bytes(&[400, -500])).unwrap();

        let bytes = encode_wav(format, [&first, &second]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");

        let mut reader = WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, vec![1, -2, 3, 400, -500]);
    }

    #[test]
    fn test_empty_sequence_is_a_valid_file() {
        let bytes = encode_wav(PcmFormat::INPUT, []).unwrap();
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.len(), 0);
        assert_eq!(reader.spec().sample_rate, 16000);
    }

    #[test]
    fn test_rejects_mixed_formats() {
        let a = AudioFragment::new(1, PcmFormat::OUTPUT, vec![0u8; 4]).unwrap();
        let b = AudioFragment::new(2, PcmFormat::INPUT, vec![0u8; 4]).unwrap();
        let err = encode_wav(PcmFormat::OUTPUT, [&a, &b]).unwrap_err();
        assert!(matches!(err, AudioError::FormatMismatch { .. }));
    }

    #[test]
    fn test_eight_bit_stays_unsigned_on_disk() {
        let format = PcmFormat {
            sample_rate: 8000,
            channels: 1,
            bits_per_sample: 8,
        };
        let fragment = AudioFragment::new(1, format, vec![0u8, 128, 255, 127]).unwrap();
        let bytes = encode_wav(format, [&fragment]).unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[0u8, 128, 255, 127]);
    }
}
