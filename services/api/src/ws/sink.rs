//! Plays model audio "into" a browser socket.

use super::protocol::ServerMessage;
use base64::{Engine, engine::general_purpose::STANDARD};
use parla_audio::{AudioError, AudioSink, PcmFormat};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Forwards paced PCM slices as `audio_chunk` messages.
///
/// The output pipeline decides when each slice is written, so the browser
/// receives audio at playback speed and an interruption stops it at once.
/// `playback_stopped` is only sent when audio went out since the last stop.
pub struct BrowserSink {
    outbound: mpsc::Sender<ServerMessage>,
    playing: bool,
}

impl BrowserSink {
    pub fn new(outbound: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            outbound,
            playing: false,
        }
    }
}

impl AudioSink for BrowserSink {
    fn write(&mut self, format: PcmFormat, pcm: &[u8]) -> Result<(), AudioError> {
        let message = ServerMessage::AudioChunk {
            data: STANDARD.encode(pcm),
            sample_rate: format.sample_rate,
        };
        match self.outbound.try_send(message) {
            Ok(()) => {
                self.playing = true;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(AudioError::Device(
                "browser connection is not keeping up".to_string(),
            )),
            Err(TrySendError::Closed(_)) => {
                Err(AudioError::Device("browser connection closed".to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if !std::mem::take(&mut self.playing) {
            return;
        }
        if self.outbound.try_send(ServerMessage::PlaybackStopped).is_err() {
            debug!("Could not notify browser that playback stopped");
        }
    }
}
