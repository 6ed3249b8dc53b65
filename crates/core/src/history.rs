//! Stored conversation messages and the instruction built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who produced a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Model => "model",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MessageRole::User => "Learner",
            MessageRole::Model => "Tutor",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "model" => Ok(MessageRole::Model),
            other => Err(anyhow::anyhow!("unknown message role '{other}'")),
        }
    }
}

/// One message as persisted by a [`crate::ConversationStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    /// The model was cut off before finishing this message.
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
}

/// Appends `history` (oldest first) to `base_prompt` as a transcript.
///
/// With no history the base prompt is returned trimmed and unchanged.
/// Messages with blank content are left out.
pub fn compose_instruction(base_prompt: &str, history: &[StoredMessage]) -> String {
    let base = base_prompt.trim_end();
    let lines: Vec<String> = history
        .iter()
        .filter(|message| !message.content.trim().is_empty())
        .map(|message| {
            let mut line = format!("{}: {}", message.role.label(), message.content.trim());
            if message.interrupted {
                line.push_str(" [interrupted]");
            }
            line
        })
        .collect();

    if lines.is_empty() {
        return base.to_string();
    }

    let mut instruction = String::with_capacity(base.len() + 64);
    if !base.is_empty() {
        instruction.push_str(base);
        instruction.push_str("\n\n");
    }
    instruction.push_str("Conversation so far, oldest first. Continue from where it stopped.\n");
    instruction.push_str(&lines.join("\n"));
    instruction
}
