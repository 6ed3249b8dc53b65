//! Parla Audio
//!
//! Everything the realtime session does with sound once the protocol layer
//! has handed it over: PCM format descriptions, owned audio fragments, the
//! playback queue and the scheduling task that feeds an output device, a
//! volume meter for visualisation, and a WAV encoder for persisting what the
//! model said.
//!
//! - `format`: sample rate / channel / depth descriptions and MIME parsing.
//! - `fragment`: the owned, schedulable unit of decoded audio.
//! - `playback`: the FIFO queue that slices fragments for the device.
//! - `pipeline`: the output pipeline that runs playback on its own clock.
//! - `meter`: smoothed RMS level published for the UI.
//! - `io`: the device collaborator traits (sink and source).
//! - `wav`: the self-describing container encoder.
//! - `pcm`: sample conversion and resampling helpers.

pub mod error;
pub mod format;
pub mod fragment;
pub mod io;
pub mod meter;
pub mod pcm;
pub mod pipeline;
pub mod playback;
pub mod wav;

pub use error::AudioError;
pub use format::PcmFormat;
pub use fragment::AudioFragment;
pub use io::{AudioSink, AudioSource, CaptureSink, ChannelSource, NullSink, SinkEvent};
pub use pipeline::{OutputPipeline, PipelineConfig};
pub use playback::{PcmSlice, PlaybackQueue};
pub use wav::encode_wav;
