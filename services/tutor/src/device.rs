//! Speaker and microphone bindings through `cpal`.
//!
//! `cpal` streams are not `Send` on every host, so each stream is built and
//! kept alive on its own thread; dropping the returned guard stops it.

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parla_audio::{AudioError, AudioSink, AudioSource, ChannelSource, PcmFormat, pcm};
use ringbuf::{HeapProd, HeapRb, traits::*};
use rubato::FastFixedIn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

/// Seconds of device audio the output ring buffer holds.
const OUTPUT_BUFFER_SECS: usize = 2;
/// Captured buffers that may wait for the session before new ones are dropped.
const CAPTURE_QUEUE: usize = 64;

fn device_error(e: impl std::fmt::Display) -> AudioError {
    AudioError::Device(e.to_string())
}

/// Keeps a stream's thread (and so the stream) alive.
pub struct StreamGuard {
    _stop: std_mpsc::Sender<()>,
}

/// Builds a stream on a dedicated thread and parks that thread until the
/// guard is dropped.
fn spawn_stream<T, F>(name: &str, build: F) -> Result<(StreamGuard, T), AudioError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<(cpal::Stream, T), AudioError> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let started = build().and_then(|(stream, value)| {
                stream.play().map_err(device_error)?;
                Ok((stream, value))
            });
            let stream = match started {
                Ok((stream, value)) => {
                    let _ = ready_tx.send(Ok(value));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // Blocks until the guard's sender is dropped.
            let _ = stop_rx.recv();
            drop(stream);
        })
        .map_err(device_error)?;

    let value = ready_rx
        .recv()
        .map_err(|_| AudioError::Device(format!("{name} thread exited during setup")))??;
    Ok((StreamGuard { _stop: stop_tx }, value))
}

/// The default output device, fed through a lock-free ring buffer.
pub struct CpalSink {
    producer: HeapProd<f32>,
    flush: Arc<AtomicBool>,
    device_rate: u32,
    channels: usize,
    resampler: Option<(u32, FastFixedIn<f32>)>,
    _guard: StreamGuard,
}

impl CpalSink {
    pub fn open_default() -> Result<Self, AudioError> {
        let (guard, (producer, flush, config)) = spawn_stream("parla-output", || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| AudioError::Device("no default output device".to_string()))?;
            let supported = device.default_output_config().map_err(device_error)?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(AudioError::Device(format!(
                    "output device wants {:?} samples; only f32 is supported",
                    supported.sample_format()
                )));
            }
            let config: cpal::StreamConfig = supported.into();
            let capacity =
                config.sample_rate.0 as usize * config.channels as usize * OUTPUT_BUFFER_SECS;
            let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();
            let flush = Arc::new(AtomicBool::new(false));
            let flush_requested = flush.clone();

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if flush_requested.swap(false, Ordering::AcqRel) {
                            consumer.clear();
                        }
                        let filled = consumer.pop_slice(data);
                        data[filled..].fill(0.0);
                    },
                    |err| error!(error = %err, "Output stream error"),
                    None,
                )
                .map_err(device_error)?;
            Ok((stream, (producer, flush, config)))
        })?;

        info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "Speaker opened"
        );
        Ok(Self {
            producer,
            flush,
            device_rate: config.sample_rate.0,
            channels: config.channels as usize,
            resampler: None,
            _guard: guard,
        })
    }

    fn resampler_for(&mut self, source_rate: u32) -> Result<&mut FastFixedIn<f32>, AudioError> {
        let stale = !matches!(&self.resampler, Some((rate, _)) if *rate == source_rate);
        if stale {
            let resampler = pcm::rate_converter(source_rate, self.device_rate)?;
            self.resampler = Some((source_rate, resampler));
        }
        match &mut self.resampler {
            Some((_, resampler)) => Ok(resampler),
            None => Err(AudioError::Device("resampler unavailable".to_string())),
        }
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, format: PcmFormat, bytes: &[u8]) -> Result<(), AudioError> {
        let samples = pcm::bytes_to_f32(bytes, format.bits_per_sample);
        let mono = pcm::downmix_to_mono(&samples, format.channels as usize);
        let mono = if format.sample_rate == self.device_rate {
            mono
        } else {
            pcm::resample(self.resampler_for(format.sample_rate)?, &mono)
        };
        let frames = pcm::upmix_from_mono(&mono, self.channels);
        let pushed = self.producer.push_slice(&frames);
        if pushed < frames.len() {
            warn!(dropped = frames.len() - pushed, "Speaker buffer full");
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.flush.store(true, Ordering::Release);
        debug!("Speaker flushed");
    }
}

/// The default input device, delivered as PCM16 in the session's input format.
pub struct Microphone {
    source: ChannelSource,
    _guard: StreamGuard,
}

impl Microphone {
    pub fn open_default(format: PcmFormat) -> Result<Self, AudioError> {
        format.validate()?;
        if format.bits_per_sample != 16 || format.channels != 1 {
            return Err(AudioError::Device(format!(
                "microphone delivers 16-bit mono, not {format}"
            )));
        }
        let (tx, source) = ChannelSource::new(format, CAPTURE_QUEUE);
        let (guard, config) = spawn_stream("parla-input", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| AudioError::Device("no default input device".to_string()))?;
            let supported = device.default_input_config().map_err(device_error)?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                return Err(AudioError::Device(format!(
                    "input device delivers {:?} samples; only f32 is supported",
                    supported.sample_format()
                )));
            }
            let config: cpal::StreamConfig = supported.into();
            let device_rate = config.sample_rate.0;
            let channels = config.channels as usize;
            let mut resampler = if device_rate == format.sample_rate {
                None
            } else {
                Some(pcm::rate_converter(device_rate, format.sample_rate)?)
            };

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let mono = pcm::downmix_to_mono(data, channels);
                        let mono = match resampler.as_mut() {
                            Some(resampler) => pcm::resample(resampler, &mono),
                            None => mono,
                        };
                        let pcm16 = pcm::f32_to_pcm16(&mono);
                        match tx.try_send(Bytes::from(pcm16)) {
                            Ok(()) | Err(TrySendError::Closed(_)) => {}
                            Err(TrySendError::Full(_)) => debug!("Dropping captured audio"),
                        }
                    },
                    |err| error!(error = %err, "Input stream error"),
                    None,
                )
                .map_err(device_error)?;
            Ok((stream, config))
        })?;

        info!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "Microphone opened"
        );
        Ok(Self {
            source,
            _guard: guard,
        })
    }
}

#[async_trait]
impl AudioSource for Microphone {
    fn format(&self) -> PcmFormat {
        self.source.format()
    }

    async fn next_buffer(&mut self) -> Option<Bytes> {
        self.source.next_buffer().await
    }
}
