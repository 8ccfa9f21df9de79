//! Database query functions for the `chat_messages` table.

use anyhow::{Context, Result};
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::{ChatMessage, TurnMetadata};

/// Append a chat turn. The role is derived from the metadata variant, so a
/// turn can never carry metadata belonging to another role.
///
/// Accepts a pool or a transaction connection.
pub async fn insert_message<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    content: &str,
    metadata: &TurnMetadata,
) -> Result<ChatMessage> {
    let message = sqlx::query_as::<_, ChatMessage>(
        "INSERT INTO chat_messages (user_id, role, content, metadata) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(user_id)
    .bind(metadata.role())
    .bind(content)
    .bind(Json(metadata))
    .fetch_one(executor)
    .await
    .context("failed to insert chat message")?;

    Ok(message)
}

/// The most recent `limit` turns for a user, returned oldest-first.
pub async fn list_recent_messages<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<ChatMessage>> {
    let messages = sqlx::query_as::<_, ChatMessage>(
        "SELECT * FROM ( \
             SELECT * FROM chat_messages \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 \
         ) recent \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(limit.max(0))
    .fetch_all(executor)
    .await
    .context("failed to list chat messages")?;

    Ok(messages)
}

/// Count all turns owned by a user.
pub async fn count_messages_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(executor)
        .await
        .context("failed to count chat messages")?;

    Ok(count)
}
