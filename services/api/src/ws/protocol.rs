//! Defines the WebSocket message protocol between the browser client and the API server.
//!
//! Microphone audio travels as binary frames (raw 16 kHz mono PCM16) and is
//! not represented here.

use gemini_realtime::{FunctionCall, SessionEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a live session for a conversation. This must be the first message.
    Init { conversation_id: String },
    /// A complete text turn from the learner.
    UserMessage { text: String },
    /// The answer to a previous `tool_call`.
    ToolResponse {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        response: Value,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ToolCallPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

impl From<&FunctionCall> for ToolCallPayload {
    fn from(call: &FunctionCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.args.clone(),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionSource {
    Input,
    Output,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the live session is open.
    Initialized {
        session_id: String,
        conversation_id: String,
    },
    /// Streamed model text, in arrival order.
    TextDelta { text: String },
    /// The model finished its turn.
    TurnComplete { text: String, audio_ms: u64 },
    /// The model was cut off; `text` is what it had produced so far.
    Interrupted { text: String },
    /// A slice of model speech, base64 PCM16, paced for playback.
    AudioChunk { data: String, sample_rate: u32 },
    /// Drop anything still buffered for playback.
    PlaybackStopped,
    ToolCall { calls: Vec<ToolCallPayload> },
    ToolCallCancelled { ids: Vec<String> },
    Transcription {
        source: TranscriptionSource,
        text: String,
    },
    /// The service will close the connection soon.
    GoAway { time_left: Option<String> },
    Error { message: String },
    Closed { code: u16, reason: String },
}

impl ServerMessage {
    /// The browser-facing form of a session event.
    ///
    /// Audio and connection events have no direct counterpart: audio reaches
    /// the browser through the playback sink and the bridge announces the
    /// connection itself.
    pub fn from_event(event: &SessionEvent) -> Option<Self> {
        let message = match event {
            SessionEvent::Connected | SessionEvent::Audio(_) => return None,
            SessionEvent::TextDelta(text) => ServerMessage::TextDelta { text: text.clone() },
            SessionEvent::TurnComplete(turn) => ServerMessage::TurnComplete {
                text: turn.text.clone(),
                audio_ms: turn.audio_duration().as_millis() as u64,
            },
            SessionEvent::Interrupted(turn) => ServerMessage::Interrupted {
                text: turn.text.clone(),
            },
            SessionEvent::ToolCall(calls) => ServerMessage::ToolCall {
                calls: calls.iter().map(ToolCallPayload::from).collect(),
            },
            SessionEvent::ToolCallCancelled(ids) => {
                ServerMessage::ToolCallCancelled { ids: ids.clone() }
            }
            SessionEvent::InputTranscription(text) => ServerMessage::Transcription {
                source: TranscriptionSource::Input,
                text: text.clone(),
            },
            SessionEvent::OutputTranscription(text) => ServerMessage::Transcription {
                source: TranscriptionSource::Output,
                text: text.clone(),
            },
            SessionEvent::GoAway { time_left } => ServerMessage::GoAway {
                time_left: time_left.clone(),
            },
            SessionEvent::Error(message) => ServerMessage::Error {
                message: message.clone(),
            },
            SessionEvent::Closed { code, reason } => ServerMessage::Closed {
                code: *code,
                reason: reason.clone(),
            },
        };
        Some(message)
    }
}
