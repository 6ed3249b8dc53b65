//! Device collaborator traits.
//!
//! The pipeline never talks to hardware directly. It writes raw PCM to an
//! [`AudioSink`] and microphone audio arrives through an [`AudioSource`];
//! binding either to a real device is up to the host.

use crate::{AudioError, PcmFormat};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// An output device accepting raw little-endian PCM.
pub trait AudioSink: Send {
    /// Queues `pcm` for playback. Must not block for longer than a slice.
    fn write(&mut self, format: PcmFormat, pcm: &[u8]) -> Result<(), AudioError>;

    /// Silences the device immediately, dropping anything it has buffered.
    fn stop(&mut self);
}

/// A capture device producing raw little-endian PCM.
#[async_trait]
pub trait AudioSource: Send {
    fn format(&self) -> PcmFormat;

    /// Next captured buffer, or `None` once the source has ended.
    async fn next_buffer(&mut self) -> Option<Bytes>;
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn write(&mut self, format: PcmFormat, pcm: &[u8]) -> Result<(), AudioError> {
        (**self).write(format, pcm)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, _format: PcmFormat, _pcm: &[u8]) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// What a [`CaptureSink`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Write { format: PcmFormat, pcm: Bytes },
    Stop,
}

/// A sink that records every call, for headless hosts and diagnostics.
///
/// Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    log: Arc<Mutex<Vec<SinkEvent>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Concatenation of everything written so far.
    pub fn written(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Write { pcm, .. } => Some(pcm),
                SinkEvent::Stop => None,
            })
            .flat_map(|pcm| pcm.to_vec())
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Stop))
            .count()
    }
}

impl AudioSink for CaptureSink {
    fn write(&mut self, format: PcmFormat, pcm: &[u8]) -> Result<(), AudioError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkEvent::Write {
                format,
                pcm: Bytes::copy_from_slice(pcm),
            });
        Ok(())
    }

    fn stop(&mut self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SinkEvent::Stop);
    }
}

/// A source fed through a channel, e.g. from a device callback thread.
pub struct ChannelSource {
    format: PcmFormat,
    rx: mpsc::Receiver<Bytes>,
}

impl ChannelSource {
    /// Creates the source and the sender a capture callback pushes into.
    pub fn new(format: PcmFormat, capacity: usize) -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { format, rx })
    }
}

#[async_trait]
impl AudioSource for ChannelSource {
    fn format(&self) -> PcmFormat {
        self.format
    }

    async fn next_buffer(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}
