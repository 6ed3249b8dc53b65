//! Database Models
//!
//! Row types for the `sqlx` conversation store and their mapping onto the
//! domain types in `parla_core`.

use chrono::{DateTime, Utc};
use parla_core::{MessageRole, StoredMessage};
use sqlx::FromRow;
use std::fmt;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "message_role", rename_all = "lowercase")]
pub enum DbMessageRole {
    User,
    Model,
}

impl fmt::Display for DbMessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbMessageRole::User => write!(f, "user"),
            DbMessageRole::Model => write!(f, "model"),
        }
    }
}

impl From<MessageRole> for DbMessageRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => DbMessageRole::User,
            MessageRole::Model => DbMessageRole::Model,
        }
    }
}

impl From<DbMessageRole> for MessageRole {
    fn from(role: DbMessageRole) -> Self {
        match role {
            DbMessageRole::User => MessageRole::User,
            DbMessageRole::Model => MessageRole::Model,
        }
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub conversation_id: String,
    pub role: DbMessageRole,
    pub content: String,
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        StoredMessage {
            conversation_id: row.conversation_id,
            role: row.role.into(),
            content: row.content,
            interrupted: row.interrupted,
            created_at: row.created_at,
        }
    }
}
