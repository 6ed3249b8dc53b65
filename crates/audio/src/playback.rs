//! The playback queue: strict FIFO of fragments, cut into device-sized slices.

use crate::{AudioFragment, PcmFormat, pcm};
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

/// A contiguous run of frames cut from one fragment, ready for the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmSlice {
    pub seq: u64,
    pub format: PcmFormat,
    pub data: Bytes,
}

impl PcmSlice {
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.data.len())
    }

    pub fn rms(&self) -> f32 {
        pcm::rms(&pcm::bytes_to_f32(&self.data, self.format.bits_per_sample))
    }
}

/// Fragments awaiting or undergoing playback, in arrival order.
///
/// The head fragment is consumed slice by slice; a fragment is released as
/// soon as its last slice has been handed out.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<AudioFragment>,
    offset: usize,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: AudioFragment) {
        if fragment.is_empty() {
            return;
        }
        self.pending.push_back(fragment);
    }

    /// Number of fragments not yet fully handed out (including a partially played head).
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Audio still to be handed out.
    pub fn remaining(&self) -> Duration {
        self.pending
            .iter()
            .map(AudioFragment::duration)
            .sum::<Duration>()
            .saturating_sub(
                self.pending
                    .front()
                    .map(|f| f.format().duration_of(self.offset))
                    .unwrap_or_default(),
            )
    }

    /// Cuts the next slice of at most `max` (never less than one frame).
    pub fn next_slice(&mut self, max: Duration) -> Option<PcmSlice> {
        let head = self.pending.front()?;
        let format = head.format();
        let frame = format.frame_size();
        let want = format.bytes_in(max).max(frame);
        let end = (self.offset + want).min(head.len());
        let slice = PcmSlice {
            seq: head.seq(),
            format,
            data: head.data().slice(self.offset..end),
        };

        if end >= head.len() {
            self.pending.pop_front();
            self.offset = 0;
        } else {
            self.offset = end;
        }
        Some(slice)
    }

    /// Drops everything, including the unplayed tail of the head fragment.
    /// Returns how many fragments were released.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.offset = 0;
        dropped
    }
}
