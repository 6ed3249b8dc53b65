//! One physical WebSocket connection to the live service.
//!
//! A [`Transport`] walks `Idle → Connecting → Open → Closing → Closed` exactly
//! once. It knows nothing about conversations: it sends the setup text it is
//! given, waits for `SetupComplete`, then shuttles wire text in both
//! directions until either side closes. Reconnecting means building a new
//! transport.

use crate::LiveError;
use crate::protocol::{self, Frame};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError, Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type LiveSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 64;

/// Close code reported when the connection ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
const NORMAL_CLOSURE: u16 = 1000;
const NO_STATUS: u16 = 1005;
const CLIENT_DISCONNECT: &str = "client disconnect";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Idle => "idle",
            TransportState::Connecting => "connecting",
            TransportState::Open => "open",
            TransportState::Closing => "closing",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle and data events, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    FrameReceived(String),
    Error(String),
    Closed { code: u16, reason: String },
}

pub struct Transport {
    url: String,
    handshake_timeout: Duration,
    state: Arc<watch::Sender<TransportState>>,
    events: mpsc::Sender<TransportEvent>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    cancel: CancellationToken,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Creates an idle transport and the receiver its events arrive on.
    pub fn new(
        url: impl Into<String>,
        handshake_timeout: Duration,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity.max(1));
        let (state, _) = watch::channel(TransportState::Idle);
        let transport = Self {
            url: url.into(),
            handshake_timeout,
            state: Arc::new(state),
            events,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            cancel: CancellationToken::new(),
            task: tokio::sync::Mutex::new(None),
        };
        (transport, events_rx)
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Connects, sends `setup` and resolves once the service acknowledges it.
    ///
    /// Connecting and waiting for `SetupComplete` share one deadline. On any
    /// failure the transport ends in `Closed` and emits no events.
    pub async fn open(&self, setup: String) -> Result<(), LiveError> {
        let started = self.state.send_if_modified(|state| {
            if *state != TransportState::Idle {
                return false;
            }
            *state = TransportState::Connecting;
            true
        });
        if !started {
            return Err(LiveError::InvalidState(format!(
                "cannot open a transport that is {}",
                self.state()
            )));
        }

        let deadline = Instant::now() + self.handshake_timeout;
        let handshake = async {
            let (mut socket, _) = connect_async(self.url.as_str())
                .await
                .map_err(map_connect_error)?;
            debug!("Socket connected, sending setup");
            socket
                .send(Message::Text(setup.into()))
                .await
                .map_err(|e| LiveError::Transport(format!("failed to send setup: {e}")))?;
            await_setup_complete(&mut socket).await?;
            Ok::<_, LiveError>(socket)
        };

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => Err(LiveError::Cancelled),
            result = timeout_at(deadline, handshake) => match result {
                Ok(result) => result,
                Err(_) => Err(LiveError::HandshakeTimeout(self.handshake_timeout.as_millis() as u64)),
            },
        };

        let socket = match outcome {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "Live handshake failed");
                self.state.send_replace(TransportState::Closed);
                return Err(e);
            }
        };

        let mut task = self.task.lock().await;
        let outbound = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(outbound) = outbound.filter(|_| !self.cancel.is_cancelled()) else {
            drop(socket);
            self.state.send_replace(TransportState::Closed);
            return Err(LiveError::Cancelled);
        };
        self.state.send_replace(TransportState::Open);
        info!("Live connection open");
        if self.events.try_send(TransportEvent::Opened).is_err() {
            debug!("Opened event not delivered");
        }
        *task = Some(tokio::spawn(run_io(
            socket,
            outbound,
            self.events.clone(),
            self.state.clone(),
            self.cancel.clone(),
        )));
        Ok(())
    }

    /// Queues wire text for the I/O task. Never waits for delivery.
    pub fn send(&self, wire: String) -> Result<(), LiveError> {
        if self.state() != TransportState::Open {
            return Err(LiveError::NotConnected);
        }
        self.outbound_tx.try_send(wire).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                LiveError::Transport("outbound queue is full".into())
            }
            mpsc::error::TrySendError::Closed(_) => LiveError::NotConnected,
        })
    }

    /// Closes the connection from any state. Safe to call repeatedly.
    ///
    /// A pending `open` is cancelled; a live socket gets a close frame before
    /// the I/O task finishes.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Live I/O task failed");
            }
        }
        self.state.send_replace(TransportState::Closed);
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn map_connect_error(error: WsError) -> LiveError {
    match error {
        WsError::Http(response) => LiveError::Transport(format!(
            "live endpoint rejected the connection with status {}",
            response.status().as_u16()
        )),
        WsError::Url(e) => LiveError::Configuration(format!("invalid live endpoint: {e}")),
        other => LiveError::Transport(format!("failed to connect: {other}")),
    }
}

/// Message text, if the message carries any. The service sends JSON in
/// binary frames as well as text frames.
fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                None
            }
        },
        _ => None,
    }
}

fn close_details(frame: Option<CloseFrame>) -> (u16, String) {
    frame
        .map(|frame| (u16::from(frame.code), frame.reason.to_string()))
        .unwrap_or((NO_STATUS, String::new()))
}

async fn await_setup_complete(socket: &mut LiveSocket) -> Result<(), LiveError> {
    while let Some(message) = socket.next().await {
        let message = message.map_err(|e| LiveError::Transport(e.to_string()))?;
        if let Message::Close(frame) = message {
            let (code, reason) = close_details(frame);
            return Err(LiveError::Transport(format!(
                "closed during handshake ({code}): {reason}"
            )));
        }
        let Some(text) = message_text(message) else {
            continue;
        };
        match protocol::decode(&text) {
            Ok(Frame::SetupComplete) => return Ok(()),
            Ok(frame) => warn!(kind = frame.kind(), "Ignoring frame received before setup completed"),
            Err(e) => warn!(error = %e, "Ignoring undecodable frame during handshake"),
        }
    }
    Err(LiveError::Transport("connection closed during handshake".into()))
}

async fn run_io(
    mut socket: LiveSocket,
    mut outbound: mpsc::Receiver<String>,
    events: mpsc::Sender<TransportEvent>,
    state: Arc<watch::Sender<TransportState>>,
    cancel: CancellationToken,
) {
    let emit = |event: TransportEvent| {
        let events = events.clone();
        async move {
            // A dropped receiver only means nobody is listening any more.
            let _ = events.send(event).await;
        }
    };

    let (code, reason) = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.send_replace(TransportState::Closing);
                // Frames accepted by `send` go out before the close frame.
                while let Ok(wire) = outbound.try_recv() {
                    if let Err(e) = socket.send(Message::Text(wire.into())).await {
                        debug!(error = %e, "Pending frame not delivered");
                        break;
                    }
                }
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: CLIENT_DISCONNECT.into(),
                };
                if let Err(e) = socket.close(Some(frame)).await {
                    debug!(error = %e, "Close frame not delivered");
                }
                break (NORMAL_CLOSURE, CLIENT_DISCONNECT.to_string());
            }
            Some(wire) = outbound.recv() => {
                if let Err(e) = socket.send(Message::Text(wire.into())).await {
                    error!(error = %e, "Failed to write to live socket");
                    emit(TransportEvent::Error(e.to_string())).await;
                    break (ABNORMAL_CLOSURE, e.to_string());
                }
            }
            incoming = socket.next() => match incoming {
                Some(Ok(Message::Close(frame))) => {
                    state.send_replace(TransportState::Closing);
                    // Flushes the close reply tungstenite queued for us.
                    let _ = socket.close(None).await;
                    let (code, reason) = close_details(frame);
                    info!(code, %reason, "Live service closed the connection");
                    break (code, reason);
                }
                Some(Ok(message)) => {
                    if let Some(text) = message_text(message) {
                        emit(TransportEvent::FrameReceived(text)).await;
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Live socket failed");
                    emit(TransportEvent::Error(e.to_string())).await;
                    break (ABNORMAL_CLOSURE, e.to_string());
                }
                None => {
                    let reason = "connection dropped".to_string();
                    error!("Live socket ended without a close frame");
                    emit(TransportEvent::Error(reason.clone())).await;
                    break (ABNORMAL_CLOSURE, reason);
                }
            },
        }
    };

    state.send_replace(TransportState::Closed);
    emit(TransportEvent::Closed { code, reason }).await;
}
