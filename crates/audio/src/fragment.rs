use crate::{AudioError, PcmFormat};
use bytes::Bytes;
use std::time::Duration;

/// A decoded, schedulable segment of model audio.
///
/// Fragments are immutable once built. The sample buffer is a `Bytes`, so
/// handing a clone to a recorder shares the same memory instead of copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    seq: u64,
    format: PcmFormat,
    data: Bytes,
}

impl AudioFragment {
    /// Wraps raw little-endian PCM. The buffer must hold whole frames.
    pub fn new(seq: u64, format: PcmFormat, data: impl Into<Bytes>) -> Result<Self, AudioError> {
        format.validate()?;
        let data = data.into();
        let frame = format.frame_size();
        if data.len() % frame != 0 {
            return Err(AudioError::Misaligned {
                len: data.len(),
                frame,
            });
        }
        Ok(Self { seq, format, data })
    }

    /// Arrival sequence number, assigned by whoever produced the fragment.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.data.len())
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_partial_frames() {
        let err = AudioFragment::new(0, PcmFormat::OUTPUT, vec![0u8; 3]).unwrap_err();
        assert!(matches!(err, AudioError::Misaligned { len: 3, frame: 2 }));
    }

    #[test]
    fn test_duration_follows_declared_rate() {
        let fragment = AudioFragment::new(1, PcmFormat::OUTPUT, vec![0u8; 4800]).unwrap();
        assert_eq!(fragment.duration(), Duration::from_millis(100));
        assert_eq!(fragment.seq(), 1);
    }

    #[test]
    fn test_clones_share_the_buffer() {
        let fragment = AudioFragment::new(2, PcmFormat::OUTPUT, vec![1u8; 480]).unwrap();
        let copy = fragment.clone();
        assert_eq!(fragment.data().as_ptr(), copy.data().as_ptr());
    }
}
