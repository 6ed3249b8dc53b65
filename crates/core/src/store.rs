//! The data-access collaborator sessions persist their history through.

use crate::history::{MessageRole, StoredMessage, compose_instruction};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Persistent message history, keyed by conversation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends one message and returns it as stored.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        interrupted: bool,
    ) -> Result<StoredMessage>;

    /// The latest `limit` messages of a conversation, oldest first.
    async fn recent_history(&self, conversation_id: &str, limit: usize)
    -> Result<Vec<StoredMessage>>;
}

/// A process-local store, used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        interrupted: bool,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            interrupted,
            created_at: Utc::now(),
        };
        self.conversations
            .write()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn recent_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }
}

/// Builds the system instruction for a (re)connecting conversation.
pub async fn load_instruction(
    store: &dyn ConversationStore,
    conversation_id: &str,
    base_prompt: &str,
    limit: usize,
) -> Result<String> {
    if limit == 0 {
        return Ok(compose_instruction(base_prompt, &[]));
    }
    let history = store.recent_history(conversation_id, limit).await?;
    debug!(conversation_id, messages = history.len(), "Loaded conversation history");
    Ok(compose_instruction(base_prompt, &history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_returns_latest_messages_oldest_first() {
        let store = InMemoryStore::new();
        for (i, role) in [MessageRole::User, MessageRole::Model, MessageRole::User]
            .into_iter()
            .enumerate()
        {
            store
                .append_message("c1", role, &format!("m{i}"), false)
                .await
                .unwrap();
        }
        store
            .append_message("c2", MessageRole::User, "other", false)
            .await
            .unwrap();

        let recent = store.recent_history("c1", 2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);
        assert_eq!(recent[0].role, MessageRole::Model);

        assert_eq!(store.recent_history("c1", 10).await.unwrap().len(), 3);
        assert!(store.recent_history("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn appended_message_keeps_interrupted_flag() {
        let store = InMemoryStore::new();
        let stored = store
            .append_message("c1", MessageRole::Model, "Half a sen", true)
            .await
            .unwrap();
        assert!(stored.interrupted);
        assert_eq!(store.recent_history("c1", 1).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn load_instruction_asks_the_store_for_the_configured_window() {
        let mut store = MockConversationStore::new();
        store
            .expect_recent_history()
            .withf(|conversation_id, limit| conversation_id == "c9" && *limit == 4)
            .times(1)
            .returning(|_, _| {
                Ok(vec![StoredMessage {
                    conversation_id: "c9".into(),
                    role: MessageRole::User,
                    content: "Hola".into(),
                    interrupted: false,
                    created_at: Utc::now(),
                }])
            });

        let instruction = load_instruction(&store, "c9", "Teach Spanish.", 4)
            .await
            .unwrap();
        assert!(instruction.starts_with("Teach Spanish."));
        assert!(instruction.ends_with("Learner: Hola"));
    }

    #[tokio::test]
    async fn zero_limit_skips_the_store() {
        let mut store = MockConversationStore::new();
        store.expect_recent_history().never();
        let instruction = load_instruction(&store, "c1", "Base", 0).await.unwrap();
        assert_eq!(instruction, "Base");
    }

    #[tokio::test]
    async fn store_failures_propagate() {
        let mut store = MockConversationStore::new();
        store
            .expect_recent_history()
            .returning(|_, _| Err(anyhow::anyhow!("database unavailable")));
        let err = load_instruction(&store, "c1", "Base", 3).await.unwrap_err();
        assert!(err.to_string().contains("database unavailable"));
    }
}
