//! Command-line arguments and the session settings derived from them.

use anyhow::{Context, Result};
use clap::Parser;
use gemini_realtime::config::DEFAULT_MODEL;
use gemini_realtime::{LiveConfig, Modality};
use std::path::PathBuf;
use std::time::Duration;

/// Practise a language with a Gemini Live tutor from the terminal.
///
/// Type a line and press enter to speak to the tutor; `/quit` ends the
/// session. The API key is read from `GEMINI_API_KEY`.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Live model to talk to.
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Prebuilt voice for spoken replies.
    #[arg(long)]
    pub voice: Option<String>,

    /// Ask for text replies instead of audio.
    #[arg(long)]
    pub text_only: bool,

    /// File holding the tutor's system instruction.
    #[arg(long, value_name = "FILE")]
    pub instruction: Option<PathBuf>,

    /// Write every audio fragment the tutor sends to this WAV file on exit.
    #[arg(long, value_name = "WAV")]
    pub record: Option<PathBuf>,

    /// Stream the default microphone to the tutor.
    #[cfg(feature = "device")]
    #[arg(long)]
    pub mic: bool,

    /// Override the service endpoint.
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Give up on the handshake after this many milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub handshake_timeout_ms: u64,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Args {
    pub fn live_config(&self, api_key: String) -> Result<LiveConfig> {
        let mut config = LiveConfig::new(api_key)
            .with_model(self.model.clone())
            .with_handshake_timeout(Duration::from_millis(self.handshake_timeout_ms));

        config = if self.text_only {
            config
                .with_modalities([Modality::Text])
                .with_transcription(true, false)
        } else {
            config
                .with_modalities([Modality::Audio])
                .with_transcription(true, true)
        };

        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        if let Some(voice) = &self.voice {
            config = config.with_voice(voice.clone());
        }
        if let Some(path) = &self.instruction {
            let instruction = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read instruction file {}", path.display()))?;
            if !instruction.trim().is_empty() {
                config = config.with_system_instruction(instruction.trim());
            }
        }
        Ok(config)
    }
}
