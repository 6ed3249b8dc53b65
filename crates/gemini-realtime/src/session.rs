//! The session facade: the one object a host talks to.
//!
//! A [`LiveSession`] owns its output pipeline for its whole life and a fresh
//! [`Transport`] per connection. Everything a connection receives is handled
//! by one worker task, in order, so the turn aggregator never sees two frames
//! at once and an interruption reaches the pipeline before the next frame is
//! looked at.

use crate::config::LiveConfig;
use crate::protocol::{
    self, ClientContent, Frame, FunctionCall, FunctionResponse, InlineAudio, RealtimeInput,
};
use crate::transport::{ABNORMAL_CLOSURE, Transport, TransportEvent, TransportState};
use crate::turn::{Turn, TurnAggregator, TurnOutput};
use crate::LiveError;
use bytes::Bytes;
use parla_audio::{AudioFragment, AudioSink, AudioSource, OutputPipeline, PipelineConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, instrument, warn};

const EVENT_BUFFER: usize = 256;

/// What a session tells its subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    TextDelta(String),
    /// A fragment handed to playback. Shares its samples with the queued copy.
    Audio(AudioFragment),
    TurnComplete(Turn),
    /// Queued audio has already been discarded when this arrives.
    Interrupted(Turn),
    /// The host must eventually answer with `send_tool_response`.
    ToolCall(Vec<FunctionCall>),
    ToolCallCancelled(Vec<String>),
    InputTranscription(String),
    OutputTranscription(String),
    GoAway { time_left: Option<String> },
    Error(String),
    Closed { code: u16, reason: String },
}

pub struct LiveSession {
    id: String,
    config: LiveConfig,
    pipeline: Arc<OutputPipeline>,
    events: broadcast::Sender<SessionEvent>,
    transport: Mutex<Option<Arc<Transport>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    span: Span,
}

impl LiveSession {
    /// Creates a disconnected session playing into `sink`.
    ///
    /// Spawns the playback task, so it must be called inside a tokio runtime.
    pub fn new(id: impl Into<String>, config: LiveConfig, sink: impl AudioSink + 'static) -> Self {
        Self::with_pipeline(id, config, sink, PipelineConfig::default())
    }

    pub fn with_pipeline(
        id: impl Into<String>,
        config: LiveConfig,
        sink: impl AudioSink + 'static,
        pipeline: PipelineConfig,
    ) -> Self {
        let id = id.into();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let span = info_span!("live_session", session_id = %id);
        Self {
            id,
            config,
            pipeline: Arc::new(OutputPipeline::spawn(sink, pipeline)),
            events,
            transport: Mutex::new(None),
            worker: Mutex::new(None),
            span,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// State of the current connection; `Idle` before the first connect.
    pub fn state(&self) -> TransportState {
        self.lock_transport()
            .as_ref()
            .map(|transport| transport.state())
            .unwrap_or(TransportState::Idle)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Open
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Smoothed playback level for visualisation.
    pub fn volume(&self) -> watch::Receiver<f32> {
        self.pipeline.level()
    }

    /// Fragments still waiting to be played.
    pub fn queued_audio(&self) -> usize {
        self.pipeline.queued()
    }

    /// Opens a new connection and negotiates the configured setup.
    ///
    /// Resolves once the service acknowledges the setup, or with the error
    /// that ended the attempt. Works again after the previous connection has
    /// closed; each attempt uses a new transport.
    #[instrument(name = "live_connect", skip_all, fields(session_id = %self.id))]
    pub async fn connect(&self) -> Result<(), LiveError> {
        let url = self.config.endpoint_url()?;
        let setup = protocol::encode(&Frame::Setup(self.config.setup()))?;
        let (transport, transport_events) = Transport::new(
            url,
            self.config.handshake_timeout,
            self.config.outbound_capacity,
        );
        let transport = Arc::new(transport);
        {
            let mut current = self.lock_transport();
            if let Some(existing) = current.as_ref() {
                if existing.state() != TransportState::Closed {
                    return Err(LiveError::InvalidState(format!(
                        "session {} is already {}",
                        self.id,
                        existing.state()
                    )));
                }
            }
            *current = Some(transport.clone());
        }

        info!(model = %self.config.model, "Connecting live session");
        if let Err(e) = transport.open(setup).await {
            let closed = match &e {
                LiveError::Cancelled => SessionEvent::Closed {
                    code: 1000,
                    reason: "client disconnect".to_string(),
                },
                other => {
                    self.publish(SessionEvent::Error(other.to_string()));
                    SessionEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: other.to_string(),
                    }
                }
            };
            self.publish(closed);
            return Err(e);
        }

        let worker = tokio::spawn(
            run_worker(transport_events, self.pipeline.clone(), self.events.clone())
                .instrument(self.span.clone()),
        );
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
        Ok(())
    }

    /// Sends one complete user text turn.
    pub fn send(&self, text: impl Into<String>) -> Result<(), LiveError> {
        self.send_frame(&Frame::ClientContent(ClientContent::user_text(text)))
    }

    /// Streams raw PCM in the configured input format. Does not end the turn.
    pub fn send_audio(&self, pcm: impl Into<Bytes>) -> Result<(), LiveError> {
        let pcm = pcm.into();
        let format = self.config.input_format;
        if pcm.len() % format.frame_size() != 0 {
            return Err(LiveError::Encoding(format!(
                "{} bytes is not whole {format} frames",
                pcm.len()
            )));
        }
        self.send_frame(&Frame::RealtimeInput(RealtimeInput {
            audio: InlineAudio::new(format, pcm),
        }))
    }

    pub fn send_tool_response(&self, response: FunctionResponse) -> Result<(), LiveError> {
        self.send_frame(&Frame::ToolResponse(vec![response]))
    }

    /// Streams `source` to the current connection until the source ends or
    /// the connection leaves `Open`.
    pub fn forward_audio(
        &self,
        mut source: impl AudioSource + 'static,
    ) -> Result<JoinHandle<()>, LiveError> {
        let transport = self.open_transport()?;
        let mut state = transport.watch_state();
        let format = source.format();
        let task = async move {
            loop {
                let buffer = tokio::select! {
                    buffer = source.next_buffer() => buffer,
                    _ = state.wait_for(|s| *s != TransportState::Open) => None,
                };
                let Some(buffer) = buffer else {
                    break;
                };
                if buffer.is_empty() {
                    continue;
                }
                let frame = Frame::RealtimeInput(RealtimeInput {
                    audio: InlineAudio::new(format, buffer),
                });
                match protocol::encode(&frame).and_then(|wire| transport.send(wire)) {
                    Ok(()) => {}
                    Err(LiveError::NotConnected) => break,
                    Err(e) => warn!(error = %e, "Dropping captured audio"),
                }
            }
            debug!("Audio forwarding stopped");
        };
        Ok(tokio::spawn(task.instrument(self.span.clone())))
    }

    /// Closes the connection, cancelling a pending handshake, and silences
    /// playback. Safe from any state, any number of times.
    pub async fn disconnect(&self) {
        let transport = self.lock_transport().clone();
        if let Some(transport) = transport {
            transport.close().await;
        }
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(session_id = %self.id, error = %e, "Session worker failed");
            }
        }
        self.pipeline.discard_queued();
        debug!(session_id = %self.id, "Live session disconnected");
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Arc<Transport>>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_transport(&self) -> Result<Arc<Transport>, LiveError> {
        self.lock_transport()
            .clone()
            .filter(|transport| transport.state() == TransportState::Open)
            .ok_or(LiveError::NotConnected)
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), LiveError> {
        let transport = self.open_transport()?;
        let wire = protocol::encode(frame)?;
        transport.send(wire)
    }

    fn publish(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
    }
}

/// Processes one connection's events strictly in arrival order.
async fn run_worker(
    mut transport_events: mpsc::Receiver<TransportEvent>,
    pipeline: Arc<OutputPipeline>,
    events: broadcast::Sender<SessionEvent>,
) {
    let publish = |event: SessionEvent| {
        let _ = events.send(event);
    };
    let mut aggregator = TurnAggregator::new();

    while let Some(event) = transport_events.recv().await {
        match event {
            TransportEvent::Opened => publish(SessionEvent::Connected),
            TransportEvent::FrameReceived(text) => match protocol::decode(&text) {
                Ok(frame) => handle_frame(frame, &mut aggregator, &pipeline, &publish),
                Err(e) => warn!(error = %e, "Dropping malformed frame"),
            },
            TransportEvent::Error(message) => publish(SessionEvent::Error(message)),
            TransportEvent::Closed { code, reason } => {
                if aggregator.reset().is_some() {
                    debug!("Connection closed mid-turn");
                }
                pipeline.discard_queued();
                info!(code, %reason, "Live session closed");
                publish(SessionEvent::Closed { code, reason });
                break;
            }
        }
    }
}

fn handle_frame(
    frame: Frame,
    aggregator: &mut TurnAggregator,
    pipeline: &OutputPipeline,
    publish: &impl Fn(SessionEvent),
) {
    match frame {
        Frame::ServerContent(mut content) => {
            if let Some(text) = content.input_transcription.take() {
                publish(SessionEvent::InputTranscription(text));
            }
            if let Some(text) = content.output_transcription.take() {
                publish(SessionEvent::OutputTranscription(text));
            }
            for output in aggregator.ingest(content) {
                match output {
                    TurnOutput::Text(delta) => publish(SessionEvent::TextDelta(delta)),
                    TurnOutput::Audio(fragment) => {
                        publish(SessionEvent::Audio(fragment.clone()));
                        pipeline.enqueue(fragment);
                    }
                    TurnOutput::Completed(turn) => {
                        debug!(chars = turn.text.len(), fragments = turn.audio.len(), "Turn complete");
                        publish(SessionEvent::TurnComplete(turn));
                    }
                    TurnOutput::Interrupted(turn) => {
                        let dropped = pipeline.discard_queued();
                        info!(dropped, "Model turn interrupted");
                        publish(SessionEvent::Interrupted(turn));
                    }
                }
            }
        }
        Frame::ToolCall(calls) => {
            info!(count = calls.len(), "Tool call requested");
            publish(SessionEvent::ToolCall(calls));
        }
        Frame::ToolCallCancellation(ids) => publish(SessionEvent::ToolCallCancelled(ids)),
        Frame::GoAway { time_left } => {
            warn!(?time_left, "Live service is going away");
            publish(SessionEvent::GoAway { time_left });
        }
        Frame::SetupComplete => debug!("Ignoring repeated setupComplete"),
        other => warn!(kind = other.kind(), "Ignoring unexpected client frame from service"),
    }
}
