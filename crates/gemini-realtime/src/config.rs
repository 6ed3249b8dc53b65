//! Live session configuration.

use crate::LiveError;
use crate::protocol::{FunctionDeclaration, Modality, Setup};
use parla_audio::PcmFormat;
use std::time::Duration;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Everything needed to open a connection and negotiate a session.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub endpoint: String,
    /// Appended as the `key` query parameter; left off when empty.
    pub api_key: String,
    pub model: String,
    pub response_modalities: Vec<Modality>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub tools: Vec<FunctionDeclaration>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    /// Format of audio passed to `send_audio`.
    pub input_format: PcmFormat,
    /// Covers both the socket connect and the wait for `SetupComplete`.
    pub handshake_timeout: Duration,
    /// Outbound frames that may be queued before `send` starts failing.
    pub outbound_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            response_modalities: vec![Modality::Audio],
            voice: None,
            system_instruction: None,
            tools: Vec::new(),
            input_transcription: false,
            output_transcription: false,
            input_format: PcmFormat::INPUT,
            handshake_timeout: Duration::from_secs(10),
            outbound_capacity: 256,
        }
    }
}

impl LiveConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_modalities(mut self, modalities: impl IntoIterator<Item = Modality>) -> Self {
        self.response_modalities = modalities.into_iter().collect();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_tool(mut self, tool: FunctionDeclaration) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_transcription(mut self, input: bool, output: bool) -> Self {
        self.input_transcription = input;
        self.output_transcription = output;
        self
    }

    pub fn with_input_format(mut self, format: PcmFormat) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// The URL to dial, with the API key attached as an encoded query pair.
    pub fn endpoint_url(&self) -> Result<String, LiveError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(LiveError::Configuration("endpoint cannot be empty".into()));
        }
        let mut url = Url::parse(endpoint)
            .map_err(|e| LiveError::Configuration(format!("invalid endpoint {endpoint}: {e}")))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(LiveError::Configuration(format!(
                "endpoint must be a ws:// or wss:// URL: {endpoint}"
            )));
        }
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.api_key);
        }
        Ok(url.into())
    }

    /// The `Setup` frame replayed at the start of every connection.
    pub fn setup(&self) -> Setup {
        Setup {
            model: self.model.clone(),
            response_modalities: self.response_modalities.clone(),
            voice: self.voice.clone(),
            system_instruction: self.system_instruction.clone(),
            tools: self.tools.clone(),
            input_transcription: self.input_transcription,
            output_transcription: self.output_transcription,
        }
    }
}
