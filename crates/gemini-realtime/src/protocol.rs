//! Frame types and the JSON codec for the Gemini Live wire format.
//!
//! [`Frame`] is the domain view of one protocol message. The `wire` module
//! below mirrors the camelCase JSON exactly; [`encode`] and [`decode`] are the
//! only places the two meet. Both are pure.

use crate::LiveError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use parla_audio::{AudioError, AudioFragment, PcmFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Output modalities the model may respond with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Text,
    Audio,
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// JSON schema of the arguments object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// The first frame on every connection; negotiates the session's capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    pub model: String,
    pub response_modalities: Vec<Modality>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub tools: Vec<FunctionDeclaration>,
    pub input_transcription: bool,
    pub output_transcription: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// Inline PCM audio, decoded from (or encoded to) base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineAudio {
    /// The MIME type exactly as labelled on the wire.
    pub mime_type: String,
    pub format: PcmFormat,
    pub data: Bytes,
}

impl InlineAudio {
    pub fn new(format: PcmFormat, data: impl Into<Bytes>) -> Self {
        Self {
            mime_type: format.to_mime(),
            format,
            data: data.into(),
        }
    }

    fn from_wire(mime_type: String, payload: &str) -> Result<Self, LiveError> {
        let format =
            PcmFormat::from_mime(&mime_type).map_err(|e| LiveError::malformed(e.to_string()))?;
        let data = BASE64
            .decode(payload)
            .map_err(|e| LiveError::malformed(format!("inline audio is not base64: {e}")))?;
        if data.len() % format.frame_size() != 0 {
            return Err(LiveError::malformed(format!(
                "inline audio of {} bytes is not whole {format} frames",
                data.len()
            )));
        }
        Ok(Self {
            mime_type,
            format,
            data: data.into(),
        })
    }

    /// Wraps the samples as a numbered fragment, sharing the buffer.
    pub fn to_fragment(&self, seq: u64) -> Result<AudioFragment, AudioError> {
        AudioFragment::new(seq, self.format, self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineAudio(InlineAudio),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

/// A user turn (or turns) sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

impl ClientContent {
    /// One complete user turn holding a single text part.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            turns: vec![Content {
                role: Role::User,
                parts: vec![Part::text(text)],
            }],
            turn_complete: true,
        }
    }

    fn part_count(&self) -> usize {
        self.turns.iter().map(|turn| turn.parts.len()).sum()
    }
}

/// A raw media chunk with no turn semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeInput {
    pub audio: InlineAudio,
}

/// One streamed piece of a model turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerContent {
    pub parts: Vec<Part>,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub generation_complete: bool,
    pub input_transcription: Option<String>,
    pub output_transcription: Option<String>,
}

impl ServerContent {
    /// No parts, no flags and no transcription.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
            && !self.turn_complete
            && !self.interrupted
            && !self.generation_complete
            && self.input_transcription.is_none()
            && self.output_transcription.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

/// One protocol message, inbound or outbound.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Setup(Setup),
    SetupComplete,
    ClientContent(ClientContent),
    RealtimeInput(RealtimeInput),
    ServerContent(ServerContent),
    ToolCall(Vec<FunctionCall>),
    ToolCallCancellation(Vec<String>),
    ToolResponse(Vec<FunctionResponse>),
    /// The service will close the connection soon.
    GoAway { time_left: Option<String> },
}

impl Frame {
    /// The wire key of this frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Setup(_) => "setup",
            Frame::SetupComplete => "setupComplete",
            Frame::ClientContent(_) => "clientContent",
            Frame::RealtimeInput(_) => "realtimeInput",
            Frame::ServerContent(_) => "serverContent",
            Frame::ToolCall(_) => "toolCall",
            Frame::ToolCallCancellation(_) => "toolCallCancellation",
            Frame::ToolResponse(_) => "toolResponse",
            Frame::GoAway { .. } => "goAway",
        }
    }
}

mod wire {
    use super::{FunctionDeclaration, Modality, Role};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    fn is_false(value: &bool) -> bool {
        !*value
    }

    /// An object whose contents are irrelevant, e.g. `"setupComplete": {}`.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct Empty {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Message {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub setup: Option<Setup>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub setup_complete: Option<Empty>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub client_content: Option<ClientContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub realtime_input: Option<RealtimeInput>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub server_content: Option<ServerContent>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_call: Option<ToolCall>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_call_cancellation: Option<ToolCallCancellation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tool_response: Option<ToolResponse>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub go_away: Option<GoAway>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Setup {
        pub model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub generation_config: Option<GenerationConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub system_instruction: Option<Content>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub tools: Vec<Tool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub input_audio_transcription: Option<Empty>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub output_audio_transcription: Option<Empty>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GenerationConfig {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub response_modalities: Vec<Modality>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub speech_config: Option<SpeechConfig>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SpeechConfig {
        pub voice_config: VoiceConfig,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct VoiceConfig {
        pub prebuilt_voice_config: PrebuiltVoiceConfig,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PrebuiltVoiceConfig {
        pub voice_name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Tool {
        #[serde(default)]
        pub function_declarations: Vec<FunctionDeclaration>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Content {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub role: Option<Role>,
        #[serde(default)]
        pub parts: Vec<Part>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Part {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub inline_data: Option<Blob>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Blob {
        pub mime_type: String,
        pub data: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ClientContent {
        #[serde(default)]
        pub turns: Vec<Content>,
        #[serde(default)]
        pub turn_complete: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RealtimeInput {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub audio: Option<Blob>,
        /// Older form of `audio`, still accepted on decode.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub media_chunks: Vec<Blob>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ServerContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub model_turn: Option<Content>,
        #[serde(default, skip_serializing_if = "is_false")]
        pub turn_complete: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        pub interrupted: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        pub generation_complete: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub input_transcription: Option<Transcription>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub output_transcription: Option<Transcription>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Transcription {
        #[serde(default)]
        pub text: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ToolCall {
        #[serde(default)]
        pub function_calls: Vec<FunctionCall>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        pub name: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        pub args: Value,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ToolCallCancellation {
        #[serde(default)]
        pub ids: Vec<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ToolResponse {
        #[serde(default)]
        pub function_responses: Vec<FunctionResponse>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct FunctionResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub id: Option<String>,
        pub name: String,
        #[serde(default)]
        pub response: Value,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GoAway {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub time_left: Option<String>,
    }
}

/// Serialises `frame` to wire text.
///
/// Fails with [`LiveError::Encoding`] when a required field is missing; the
/// caller must not transmit anything in that case.
pub fn encode(frame: &Frame) -> Result<String, LiveError> {
    let mut message = wire::Message::default();
    match frame {
        Frame::Setup(setup) => {
            if setup.model.trim().is_empty() {
                return Err(LiveError::encoding("setup requires a model"));
            }
            message.setup = Some(setup_to_wire(setup));
        }
        Frame::SetupComplete => message.setup_complete = Some(wire::Empty {}),
        Frame::ClientContent(content) => {
            if content.part_count() == 0 {
                return Err(LiveError::encoding("clientContent requires at least one part"));
            }
            message.client_content = Some(wire::ClientContent {
                turns: content
                    .turns
                    .iter()
                    .map(|turn| content_to_wire(Some(turn.role), &turn.parts))
                    .collect(),
                turn_complete: content.turn_complete,
            });
        }
        Frame::RealtimeInput(input) => {
            if input.audio.data.is_empty() {
                return Err(LiveError::encoding("realtimeInput requires a non-empty chunk"));
            }
            message.realtime_input = Some(wire::RealtimeInput {
                audio: Some(blob_to_wire(&input.audio)),
                media_chunks: Vec::new(),
            });
        }
        Frame::ServerContent(content) => {
            message.server_content = Some(wire::ServerContent {
                model_turn: (!content.parts.is_empty()).then(|| content_to_wire(None, &content.parts)),
                turn_complete: content.turn_complete,
                interrupted: content.interrupted,
                generation_complete: content.generation_complete,
                input_transcription: content
                    .input_transcription
                    .clone()
                    .map(|text| wire::Transcription { text }),
                output_transcription: content
                    .output_transcription
                    .clone()
                    .map(|text| wire::Transcription { text }),
            });
        }
        Frame::ToolCall(calls) => {
            if calls.is_empty() {
                return Err(LiveError::encoding("toolCall requires at least one call"));
            }
            message.tool_call = Some(wire::ToolCall {
                function_calls: calls
                    .iter()
                    .map(|call| wire::FunctionCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        args: call.args.clone(),
                    })
                    .collect(),
            });
        }
        Frame::ToolCallCancellation(ids) => {
            if ids.is_empty() {
                return Err(LiveError::encoding("toolCallCancellation requires at least one id"));
            }
            message.tool_call_cancellation = Some(wire::ToolCallCancellation { ids: ids.clone() });
        }
        Frame::ToolResponse(responses) => {
            if responses.is_empty() {
                return Err(LiveError::encoding("toolResponse requires at least one response"));
            }
            message.tool_response = Some(wire::ToolResponse {
                function_responses: responses
                    .iter()
                    .map(|response| wire::FunctionResponse {
                        id: response.id.clone(),
                        name: response.name.clone(),
                        response: response.response.clone(),
                    })
                    .collect(),
            });
        }
        Frame::GoAway { time_left } => {
            message.go_away = Some(wire::GoAway {
                time_left: time_left.clone(),
            });
        }
    }
    serde_json::to_string(&message).map_err(|e| LiveError::encoding(e.to_string()))
}

/// Parses wire text into a [`Frame`].
///
/// Unknown fields and unknown part kinds are ignored. Anything that is not an
/// object carrying a known frame key of the right shape is
/// [`LiveError::MalformedFrame`].
pub fn decode(text: &str) -> Result<Frame, LiveError> {
    let message: wire::Message =
        serde_json::from_str(text).map_err(|e| LiveError::malformed(e.to_string()))?;

    if message.setup_complete.is_some() {
        return Ok(Frame::SetupComplete);
    }
    if let Some(content) = message.server_content {
        return Ok(Frame::ServerContent(server_content_from_wire(content)));
    }
    if let Some(tool_call) = message.tool_call {
        return Ok(Frame::ToolCall(
            tool_call
                .function_calls
                .into_iter()
                .map(|call| FunctionCall {
                    id: call.id,
                    name: call.name,
                    args: call.args,
                })
                .collect(),
        ));
    }
    if let Some(cancellation) = message.tool_call_cancellation {
        return Ok(Frame::ToolCallCancellation(cancellation.ids));
    }
    if let Some(go_away) = message.go_away {
        return Ok(Frame::GoAway {
            time_left: go_away.time_left,
        });
    }
    if let Some(setup) = message.setup {
        return Ok(Frame::Setup(setup_from_wire(setup)));
    }
    if let Some(content) = message.client_content {
        let turns = content
            .turns
            .into_iter()
            .map(|turn| Content {
                role: turn.role.unwrap_or(Role::User),
                parts: parts_from_wire(turn.parts),
            })
            .collect();
        return Ok(Frame::ClientContent(ClientContent {
            turns,
            turn_complete: content.turn_complete,
        }));
    }
    if let Some(input) = message.realtime_input {
        return realtime_input_from_wire(input).map(Frame::RealtimeInput);
    }
    if let Some(response) = message.tool_response {
        return Ok(Frame::ToolResponse(
            response
                .function_responses
                .into_iter()
                .map(|response| FunctionResponse {
                    id: response.id,
                    name: response.name,
                    response: response.response,
                })
                .collect(),
        ));
    }
    Err(LiveError::malformed("no known frame kind"))
}

fn setup_to_wire(setup: &Setup) -> wire::Setup {
    let speech_config = setup.voice.as_ref().map(|voice| wire::SpeechConfig {
        voice_config: wire::VoiceConfig {
            prebuilt_voice_config: wire::PrebuiltVoiceConfig {
                voice_name: voice.clone(),
            },
        },
    });
    let generation_config = (!setup.response_modalities.is_empty() || speech_config.is_some())
        .then(|| wire::GenerationConfig {
            response_modalities: setup.response_modalities.clone(),
            speech_config,
        });
    wire::Setup {
        model: setup.model.clone(),
        generation_config,
        system_instruction: setup
            .system_instruction
            .as_ref()
            .map(|text| content_to_wire(None, &[Part::text(text.clone())])),
        tools: if setup.tools.is_empty() {
            Vec::new()
        } else {
            vec![wire::Tool {
                function_declarations: setup.tools.clone(),
            }]
        },
        input_audio_transcription: setup.input_transcription.then(wire::Empty::default),
        output_audio_transcription: setup.output_transcription.then(wire::Empty::default),
    }
}

fn setup_from_wire(setup: wire::Setup) -> Setup {
    let generation_config = setup.generation_config.unwrap_or_default();
    Setup {
        model: setup.model,
        response_modalities: generation_config.response_modalities,
        voice: generation_config
            .speech_config
            .map(|speech| speech.voice_config.prebuilt_voice_config.voice_name),
        system_instruction: setup.system_instruction.map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        }),
        tools: setup
            .tools
            .into_iter()
            .flat_map(|tool| tool.function_declarations)
            .collect(),
        input_transcription: setup.input_audio_transcription.is_some(),
        output_transcription: setup.output_audio_transcription.is_some(),
    }
}

fn blob_to_wire(audio: &InlineAudio) -> wire::Blob {
    wire::Blob {
        mime_type: audio.mime_type.clone(),
        data: BASE64.encode(&audio.data),
    }
}

fn content_to_wire(role: Option<Role>, parts: &[Part]) -> wire::Content {
    wire::Content {
        role,
        parts: parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => wire::Part {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                Part::InlineAudio(audio) => wire::Part {
                    text: None,
                    inline_data: Some(blob_to_wire(audio)),
                },
            })
            .collect(),
    }
}

fn is_audio_mime(mime_type: &str) -> bool {
    mime_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("audio/"))
}

/// Decodes content parts. An audio part that cannot be decoded is skipped so
/// the rest of the frame, turn flags included, still arrives.
fn parts_from_wire(parts: Vec<wire::Part>) -> Vec<Part> {
    let mut decoded = Vec::with_capacity(parts.len());
    for part in parts {
        if let Some(text) = part.text {
            decoded.push(Part::Text(text));
        } else if let Some(blob) = part.inline_data {
            if !is_audio_mime(&blob.mime_type) {
                tracing::debug!(mime_type = %blob.mime_type, "Skipping non-audio inline data");
                continue;
            }
            match InlineAudio::from_wire(blob.mime_type, &blob.data) {
                Ok(audio) => decoded.push(Part::InlineAudio(audio)),
                Err(e) => tracing::warn!(error = %e, "Skipping undecodable audio part"),
            }
        }
    }
    decoded
}

fn server_content_from_wire(content: wire::ServerContent) -> ServerContent {
    let parts = match content.model_turn {
        Some(turn) => parts_from_wire(turn.parts),
        None => Vec::new(),
    };
    ServerContent {
        parts,
        turn_complete: content.turn_complete,
        interrupted: content.interrupted,
        generation_complete: content.generation_complete,
        input_transcription: content.input_transcription.map(|t| t.text),
        output_transcription: content.output_transcription.map(|t| t.text),
    }
}

fn realtime_input_from_wire(input: wire::RealtimeInput) -> Result<RealtimeInput, LiveError> {
    let blob = match (input.audio, input.media_chunks.len()) {
        (Some(blob), 0) => blob,
        (None, 1) => input
            .media_chunks
            .into_iter()
            .next()
            .ok_or_else(|| LiveError::malformed("realtimeInput without audio"))?,
        (None, 0) => return Err(LiveError::malformed("realtimeInput without audio")),
        _ => return Err(LiveError::malformed("realtimeInput carries more than one chunk")),
    };
    if !is_audio_mime(&blob.mime_type) {
        return Err(LiveError::malformed(format!(
            "realtimeInput chunk is not audio: {}",
            blob.mime_type
        )));
    }
    Ok(RealtimeInput {
        audio: InlineAudio::from_wire(blob.mime_type, &blob.data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_round_trip(wire_text: &str) {
        let frame = decode(wire_text).unwrap();
        let encoded = encode(&frame).unwrap();
        let expected: Value = serde_json::from_str(wire_text).unwrap();
        let actual: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(actual, expected, "frame kind {}", frame.kind());
    }

    #[test]
    fn test_decode_setup_complete() {
        assert_eq!(decode(r#"{"setupComplete":{}}"#).unwrap(), Frame::SetupComplete);
    }

    #[test]
    fn test_decode_server_content_with_text_and_audio() {
        let text = json!({
            "serverContent": {
                "modelTurn": {"parts": [
                    {"text": "Hi"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAABAA=="}}
                ]},
                "turnComplete": true
            }
        })
        .to_string();

        let Frame::ServerContent(content) = decode(&text).unwrap() else {
            panic!("expected serverContent");
        };
        assert!(content.turn_complete);
        assert!(!content.interrupted);
        assert_eq!(content.parts[0], Part::text("Hi"));
        let Part::InlineAudio(audio) = &content.parts[1] else {
            panic!("expected audio part");
        };
        assert_eq!(audio.format, PcmFormat::OUTPUT);
        assert_eq!(audio.data.as_ref(), &[0, 0, 1, 0]);
    }

    #[test]
    fn test_missing_rate_uses_default() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm","data":"AAA="}}]}}}"#;
        let Frame::ServerContent(content) = decode(text).unwrap() else {
            panic!("expected serverContent");
        };
        let Part::InlineAudio(audio) = &content.parts[0] else {
            panic!("expected audio part");
        };
        assert_eq!(audio.format.sample_rate, 24_000);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let text = json!({
            "serverContent": {
                "modelTurn": {"role": "model", "parts": [{"text": "ok", "thought": false}]},
                "groundingMetadata": {}
            },
            "usageMetadata": {"totalTokenCount": 12}
        })
        .to_string();
        let Frame::ServerContent(content) = decode(&text).unwrap() else {
            panic!("expected serverContent");
        };
        assert_eq!(content.parts, vec![Part::text("ok")]);
    }

    #[test]
    fn test_unknown_part_kinds_are_skipped() {
        let text = json!({
            "serverContent": {"modelTurn": {"parts": [
                {"executableCode": {"code": "print(1)"}},
                {"inlineData": {"mimeType": "image/png", "data": "AAAA"}},
                {"text": "after"}
            ]}}
        })
        .to_string();
        let Frame::ServerContent(content) = decode(&text).unwrap() else {
            panic!("expected serverContent");
        };
        assert_eq!(content.parts, vec![Part::text("after")]);
    }

    #[test]
    fn test_unrecognised_messages_are_malformed() {
        for text in [
            "not json",
            "[1, 2]",
            "{}",
            r#"{"usageMetadata":{}}"#,
            r#"{"serverContent":"nope"}"#,
            r#"{"toolCall":{"functionCalls":[{"args":{}}]}}"#,
        ] {
            assert!(
                matches!(decode(text), Err(LiveError::MalformedFrame(_))),
                "{text} should be malformed"
            );
        }
    }

    #[test]
    fn test_bad_audio_parts_are_skipped_and_the_frame_kept() {
        let bad_base64 = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm","data":"!!"}}]},"interrupted":true}}"#;
        let bad_mime = r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Hi"},{"inlineData":{"mimeType":"audio/opus","data":"AAAA"}}]},"turnComplete":true}}"#;
        let odd_length = r#"{"serverContent":{"modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}}]},"interrupted":true}}"#;

        for text in [bad_base64, odd_length] {
            let Frame::ServerContent(content) = decode(text).unwrap() else {
                panic!("expected serverContent");
            };
            assert!(content.parts.is_empty());
            assert!(content.interrupted);
        }

        let Frame::ServerContent(content) = decode(bad_mime).unwrap() else {
            panic!("expected serverContent");
        };
        assert_eq!(content.parts, vec![Part::text("Hi")]);
        assert!(content.turn_complete);
    }

    #[test]
    fn test_bad_realtime_input_audio_is_malformed() {
        let odd_length = r#"{"realtimeInput":{"audio":{"mimeType":"audio/pcm;rate=16000","data":"AAAA"}}}"#;
        let bad_base64 = r#"{"realtimeInput":{"audio":{"mimeType":"audio/pcm","data":"!!"}}}"#;
        for text in [odd_length, bad_base64] {
            assert!(matches!(decode(text), Err(LiveError::MalformedFrame(_))));
        }
    }

    #[test]
    fn test_encode_user_text() {
        let encoded = encode(&Frame::ClientContent(ClientContent::user_text("Hello"))).unwrap();
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            json!({"clientContent": {
                "turns": [{"role": "user", "parts": [{"text": "Hello"}]}],
                "turnComplete": true
            }})
        );
    }

    #[test]
    fn test_encode_setup() {
        let setup = Setup {
            model: "models/gemini-2.0-flash-live-001".to_string(),
            response_modalities: vec![Modality::Audio],
            voice: Some("Puck".to_string()),
            system_instruction: Some("Be brief.".to_string()),
            tools: vec![FunctionDeclaration {
                name: "lookup_word".to_string(),
                description: String::new(),
                parameters: None,
            }],
            input_transcription: true,
            output_transcription: false,
        };
        let value: Value = serde_json::from_str(&encode(&Frame::Setup(setup.clone())).unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"setup": {
                "model": "models/gemini-2.0-flash-live-001",
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {"voiceConfig": {"prebuiltVoiceConfig": {"voiceName": "Puck"}}}
                },
                "systemInstruction": {"parts": [{"text": "Be brief."}]},
                "tools": [{"functionDeclarations": [{"name": "lookup_word"}]}],
                "inputAudioTranscription": {}
            }})
        );
        assert_eq!(decode(&value.to_string()).unwrap(), Frame::Setup(setup));
    }

    #[test]
    fn test_encode_rejects_missing_required_fields() {
        let empty_turn = Frame::ClientContent(ClientContent {
            turns: vec![Content {
                role: Role::User,
                parts: Vec::new(),
            }],
            turn_complete: true,
        });
        let no_model = Frame::Setup(Setup {
            model: " ".to_string(),
            response_modalities: vec![Modality::Text],
            voice: None,
            system_instruction: None,
            tools: Vec::new(),
            input_transcription: false,
            output_transcription: false,
        });
        let empty_audio = Frame::RealtimeInput(RealtimeInput {
            audio: InlineAudio::new(PcmFormat::INPUT, Bytes::new()),
        });
        for frame in [empty_turn, no_model, empty_audio, Frame::ToolResponse(Vec::new())] {
            assert!(matches!(encode(&frame), Err(LiveError::Encoding(_))));
        }
    }

    #[test]
    fn test_round_trip_of_each_kind() {
        assert_round_trip(r#"{"setupComplete":{}}"#);
        assert_round_trip(
            r#"{"clientContent":{"turns":[{"role":"user","parts":[{"text":"Hola"}]},{"role":"model","parts":[{"text":"¡Hola!"}]}],"turnComplete":false}}"#,
        );
        assert_round_trip(r#"{"realtimeInput":{"audio":{"mimeType":"audio/pcm;rate=16000","data":"AQACAA=="}}}"#);
        assert_round_trip(
            r#"{"serverContent":{"modelTurn":{"parts":[{"text":"Hi"},{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAABAA=="}}]},"interrupted":true}}"#,
        );
        assert_round_trip(r#"{"serverContent":{"outputTranscription":{"text":"hi there"},"generationComplete":true}}"#);
        assert_round_trip(
            r#"{"toolCall":{"functionCalls":[{"id":"call-1","name":"lookup_word","args":{"word":"gato"}}]}}"#,
        );
        assert_round_trip(r#"{"toolCallCancellation":{"ids":["call-1"]}}"#);
        assert_round_trip(
            r#"{"toolResponse":{"functionResponses":[{"id":"call-1","name":"lookup_word","response":{"meaning":"cat"}}]}}"#,
        );
        assert_round_trip(r#"{"goAway":{"timeLeft":"10s"}}"#);
    }

    #[test]
    fn test_legacy_media_chunks_decode() {
        let text = r#"{"realtimeInput":{"mediaChunks":[{"mimeType":"audio/pcm;rate=16000","data":"AQACAA=="}]}}"#;
        let Frame::RealtimeInput(input) = decode(text).unwrap() else {
            panic!("expected realtimeInput");
        };
        assert_eq!(input.audio.format, PcmFormat::INPUT);
        // Re-encoded in the current form.
        assert!(encode(&Frame::RealtimeInput(input)).unwrap().contains(r#""audio":"#));
    }

    #[test]
    fn test_to_fragment_shares_samples() {
        let audio = InlineAudio::new(PcmFormat::OUTPUT, vec![1u8, 0, 2, 0]);
        let fragment = audio.to_fragment(7).unwrap();
        assert_eq!(fragment.seq(), 7);
        assert_eq!(fragment.data().as_ptr(), audio.data.as_ptr());
    }
}
