//! Data Access Layer
//!
//! The PostgreSQL implementation of [`ConversationStore`]. Queries are
//! checked at runtime so the crate builds without a database at hand.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parla_core::{ConversationStore, MessageRole, StoredMessage};
use sqlx::PgPool;

use crate::models::{DbMessageRole, MessageRow};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    /// Creates a new `PgConversationStore` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        interrupted: bool,
    ) -> Result<StoredMessage> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO conversation_messages (conversation_id, role, content, interrupted)
            VALUES ($1, $2, $3, $4)
            RETURNING id, conversation_id, role, content, interrupted, created_at
            "#,
        )
        .bind(conversation_id)
        .bind(DbMessageRole::from(role))
        .bind(content)
        .bind(interrupted)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to store message for conversation {conversation_id}"))?;
        Ok(row.into())
    }

    async fn recent_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, role, content, interrupted, created_at
            FROM (
                SELECT id, conversation_id, role, content, interrupted, created_at
                FROM conversation_messages
                WHERE conversation_id = $1
                ORDER BY id DESC
                LIMIT $2
            ) AS recent
            ORDER BY id ASC
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load history for conversation {conversation_id}"))?;
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }
}
