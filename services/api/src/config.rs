use gemini_realtime::config::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use gemini_realtime::{LiveConfig, Modality};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    /// Conversations are kept in memory when unset.
    pub database_url: Option<String>,
    pub live_endpoint: String,
    pub live_model: String,
    pub live_voice: Option<String>,
    pub response_modalities: Vec<Modality>,
    pub handshake_timeout: Duration,
    /// How many stored messages are replayed into a new session's instruction.
    pub history_limit: usize,
    pub log_level: Level,
    pub prompts_path: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let live_endpoint =
            std::env::var("LIVE_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let live_model = std::env::var("LIVE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let live_voice = std::env::var("LIVE_VOICE")
            .ok()
            .filter(|voice| !voice.trim().is_empty());

        let modalities_str =
            std::env::var("RESPONSE_MODALITIES").unwrap_or_else(|_| "audio".to_string());
        let response_modalities = parse_modalities(&modalities_str)?;

        let handshake_timeout = Duration::from_millis(parse_number(
            "HANDSHAKE_TIMEOUT_MS",
            10_000,
        )?);
        let history_limit = parse_number("HISTORY_LIMIT", 20)? as usize;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./prompts"));

        Ok(Self {
            bind_address,
            gemini_api_key,
            database_url,
            live_endpoint,
            live_model,
            live_voice,
            response_modalities,
            handshake_timeout,
            history_limit,
            log_level,
            prompts_path,
        })
    }

    /// Session settings for one browser conversation.
    pub fn live_config(&self, system_instruction: String) -> LiveConfig {
        let mut config = LiveConfig::new(self.gemini_api_key.clone())
            .with_endpoint(self.live_endpoint.clone())
            .with_model(self.live_model.clone())
            .with_modalities(self.response_modalities.iter().copied())
            .with_handshake_timeout(self.handshake_timeout)
            .with_transcription(true, self.response_modalities.contains(&Modality::Audio));
        if !system_instruction.trim().is_empty() {
            config = config.with_system_instruction(system_instruction);
        }
        if let Some(voice) = &self.live_voice {
            config = config.with_voice(voice.clone());
        }
        config
    }
}

fn parse_modalities(value: &str) -> Result<Vec<Modality>, ConfigError> {
    let mut modalities = Vec::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let modality = match item.to_lowercase().as_str() {
            "audio" => Modality::Audio,
            "text" => Modality::Text,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RESPONSE_MODALITIES".to_string(),
                    format!("unknown modality '{other}'"),
                ));
            }
        };
        if !modalities.contains(&modality) {
            modalities.push(modality);
        }
    }
    if modalities.is_empty() {
        return Err(ConfigError::InvalidValue(
            "RESPONSE_MODALITIES".to_string(),
            "at least one modality is required".to_string(),
        ));
    }
    Ok(modalities)
}

fn parse_number(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(var.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
