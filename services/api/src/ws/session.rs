//! Manages the WebSocket connection lifecycle for one browser conversation.

use super::{
    protocol::{ClientMessage, ServerMessage},
    sink::BrowserSink,
};
use crate::state::AppState;
use anyhow::{Context, Result, anyhow, bail};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use gemini_realtime::{FunctionResponse, LiveSession, SessionEvent, Turn};
use parla_core::{MessageRole, load_instruction};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

const OUTBOUND_CAPACITY: usize = 256;
const INIT_TIMEOUT: Duration = Duration::from_secs(30);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// A live session bound to the conversation it was opened for.
struct Bridge {
    session: Arc<LiveSession>,
    conversation_id: String,
    events: broadcast::Receiver<SessionEvent>,
}

/// Main handler for an individual WebSocket connection.
///
/// Waits for `init`, opens a live session for the conversation, relays until
/// either side closes and then destroys the session.
#[instrument(name = "ws_session", skip_all, fields(conversation_id, session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New WebSocket connection. Awaiting initialization...");

    let (socket_tx, mut socket_rx) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_outbound(socket_tx, outbound_rx).instrument(Span::current()));

    match start_session(&mut socket_rx, &state, &outbound_tx).await {
        Ok(Some(bridge)) => {
            let session_id = bridge.session.id().to_string();
            relay(&state, bridge, socket_rx, &outbound_tx).await;
            state.registry.destroy(&session_id).await;
            info!("Live session torn down.");
        }
        Ok(None) => info!("Client disconnected before sending init message."),
        Err(e) => {
            error!(error = ?e, "Session initialization failed");
            let _ = outbound_tx
                .send(ServerMessage::Error {
                    message: format!("{e:#}"),
                })
                .await;
        }
    }

    drop(outbound_tx);
    flush(writer).await;
}

/// Reads `init`, loads history and connects a new live session.
async fn start_session(
    socket_rx: &mut SplitStream<WebSocket>,
    state: &Arc<AppState>,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) -> Result<Option<Bridge>> {
    let first = timeout(INIT_TIMEOUT, socket_rx.next())
        .await
        .context("Timed out waiting for the init message")?;
    let conversation_id = match first {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str())? {
            ClientMessage::Init { conversation_id } => conversation_id,
            _ => bail!("First message must be `init`"),
        },
        Some(Ok(Message::Close(_))) | None => return Ok(None),
        Some(Ok(_)) => bail!("First message was not a text `init` message."),
        Some(Err(e)) => return Err(anyhow!(e).context("Failed to read the init message")),
    };
    if conversation_id.trim().is_empty() {
        bail!("`conversation_id` must not be empty");
    }
    Span::current().record("conversation_id", conversation_id.as_str());

    let instruction = load_instruction(
        state.store.as_ref(),
        &conversation_id,
        &state.system_prompt,
        state.config.history_limit,
    )
    .await?;
    let config = state.config.live_config(instruction);
    let session = state
        .registry
        .create(config, BrowserSink::new(outbound_tx.clone()));
    Span::current().record("session_id", session.id());

    // Subscribe first so nothing published right after the handshake is missed.
    let events = session.subscribe();
    if let Err(e) = session.connect().await {
        state.registry.destroy(session.id()).await;
        return Err(anyhow!(e).context("Failed to connect the live session"));
    }
    info!("Live session connected");

    announce(state, &session, &conversation_id, outbound_tx).await?;

    Ok(Some(Bridge {
        session,
        conversation_id,
        events,
    }))
}

/// Tells the browser its session is ready. A browser that is already gone
/// takes the session with it.
async fn announce(
    state: &AppState,
    session: &LiveSession,
    conversation_id: &str,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) -> Result<()> {
    let initialized = ServerMessage::Initialized {
        session_id: session.id().to_string(),
        conversation_id: conversation_id.to_string(),
    };
    if outbound_tx.send(initialized).await.is_err() {
        state.registry.destroy(session.id()).await;
        bail!("Browser went away during initialization");
    }
    Ok(())
}

/// The main loop for an initialized connection.
async fn relay(
    state: &AppState,
    mut bridge: Bridge,
    mut socket_rx: SplitStream<WebSocket>,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) {
    let mut transcript = Transcript::default();
    loop {
        tokio::select! {
            incoming = socket_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_text(state, &bridge, text.as_str(), outbound_tx).await;
                }
                Some(Ok(Message::Binary(pcm))) => {
                    if let Err(e) = bridge.session.send_audio(pcm) {
                        warn!(error = %e, "Dropping microphone audio");
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed the socket.");
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Err(e)) => {
                    error!(error = ?e, "Error receiving from client WebSocket");
                    break;
                }
            },
            event = bridge.events.recv() => match event {
                Ok(event) => {
                    transcript.record(state, &bridge.conversation_id, &event).await;
                    let closed = matches!(event, SessionEvent::Closed { .. });
                    if let Some(message) = ServerMessage::from_event(&event) {
                        if outbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    if closed {
                        info!("Live session closed; ending bridge.");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Bridge fell behind the session's events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

async fn handle_client_text(
    state: &AppState,
    bridge: &Bridge,
    text: &str,
    outbound_tx: &mpsc::Sender<ServerMessage>,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable client message");
            return;
        }
    };

    let result = match message {
        ClientMessage::UserMessage { text } => {
            let sent = bridge.session.send(text.clone());
            if sent.is_ok() {
                store_message(state, &bridge.conversation_id, MessageRole::User, &text, false)
                    .await;
            }
            sent
        }
        ClientMessage::ToolResponse { id, name, response } => bridge
            .session
            .send_tool_response(FunctionResponse { id, name, response }),
        ClientMessage::Init { .. } => {
            warn!("Ignoring repeated init message.");
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(error = %e, "Client message rejected");
        let _ = outbound_tx
            .send(ServerMessage::Error {
                message: e.to_string(),
            })
            .await;
    }
}

/// Transcriptions gathered since the last turn boundary.
#[derive(Default)]
struct Transcript {
    heard: String,
    spoken: String,
}

impl Transcript {
    /// Persists what a turn boundary settles: the learner's transcribed
    /// speech, then the model's turn.
    async fn record(&mut self, state: &AppState, conversation_id: &str, event: &SessionEvent) {
        let (turn, interrupted) = match event {
            SessionEvent::InputTranscription(text) => {
                self.heard.push_str(text);
                return;
            }
            SessionEvent::OutputTranscription(text) => {
                self.spoken.push_str(text);
                return;
            }
            SessionEvent::TurnComplete(turn) => (turn, false),
            SessionEvent::Interrupted(turn) => (turn, true),
            _ => return,
        };

        let heard = std::mem::take(&mut self.heard);
        if !heard.trim().is_empty() {
            store_message(state, conversation_id, MessageRole::User, heard.trim(), false).await;
        }
        let content = self.model_text(turn);
        if !content.trim().is_empty() {
            store_message(state, conversation_id, MessageRole::Model, content.trim(), interrupted)
                .await;
        }
    }

    /// Text of a finished turn, falling back to the transcription of its audio.
    fn model_text(&mut self, turn: &Turn) -> String {
        let spoken = std::mem::take(&mut self.spoken);
        if turn.text.trim().is_empty() {
            spoken
        } else {
            turn.text.clone()
        }
    }
}

async fn store_message(
    state: &AppState,
    conversation_id: &str,
    role: MessageRole,
    content: &str,
    interrupted: bool,
) {
    if let Err(e) = state
        .store
        .append_message(conversation_id, role, content, interrupted)
        .await
    {
        error!(error = ?e, %role, "Failed to store conversation message");
    }
}

/// Drains queued messages into the socket, then closes it.
async fn write_outbound(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound_rx.recv().await {
        if let Err(e) = send_msg(&mut socket_tx, message).await {
            debug!(error = ?e, "Browser socket is gone; dropping outbound messages");
            return;
        }
    }
    let _ = socket_tx.close().await;
}

async fn flush(mut writer: JoinHandle<()>) {
    if timeout(FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use gemini_realtime::{LiveConfig, Modality};
    use parla_audio::NullSink;
    use parla_core::InMemoryStore;
    use std::path::PathBuf;
    use tracing::Level;

    fn app_state() -> AppState {
        let config = Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: "test-key".into(),
            database_url: None,
            live_endpoint: "ws://127.0.0.1:9/live".into(),
            live_model: "models/test-live".into(),
            live_voice: None,
            response_modalities: vec![Modality::Text],
            handshake_timeout: Duration::from_secs(1),
            history_limit: 10,
            log_level: Level::INFO,
            prompts_path: PathBuf::from("./prompts"),
        };
        AppState::new(config, Arc::new(InMemoryStore::new()), String::new())
    }

    #[tokio::test]
    async fn announcing_to_a_departed_browser_destroys_the_session() {
        let state = app_state();
        let session = state.registry.create(LiveConfig::new("test-key"), NullSink);
        let (outbound_tx, outbound_rx) = mpsc::channel(1);
        drop(outbound_rx);

        let result = announce(&state, &session, "conv-1", &outbound_tx).await;
        assert!(result.is_err());
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn announcing_sends_initialized() {
        let state = app_state();
        let session = state.registry.create(LiveConfig::new("test-key"), NullSink);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(1);

        announce(&state, &session, "conv-1", &outbound_tx)
            .await
            .unwrap();
        assert_eq!(
            outbound_rx.recv().await.unwrap(),
            ServerMessage::Initialized {
                session_id: session.id().to_string(),
                conversation_id: "conv-1".into(),
            }
        );
        assert_eq!(state.registry.len(), 1);
    }
}
