//! PostgreSQL-backed [`ChatStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use fitgenie_db::models::{ChatMessage, Plan, TurnMetadata};
use fitgenie_db::queries::{chat_messages, plans};
use fitgenie_db::queries::plans::NewPlan;

use super::ChatStore;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ChatStore for PgStore {
    async fn append_turn(
        &self,
        user_id: Uuid,
        content: &str,
        metadata: &TurnMetadata,
    ) -> Result<ChatMessage> {
        chat_messages::insert_message(&self.pool, user_id, content, metadata).await
    }

    async fn create_plan_with_turn(
        &self,
        plan: &NewPlan<'_>,
        assistant_text: &str,
    ) -> Result<(Plan, ChatMessage)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        let stored = plans::insert_plan(&mut *tx, plan).await?;
        let turn = chat_messages::insert_message(
            &mut *tx,
            plan.user_id,
            assistant_text,
            &TurnMetadata::AssistantSuccess { plan_id: stored.id },
        )
        .await?;

        tx.commit()
            .await
            .context("failed to commit plan transaction")?;

        tracing::debug!(plan_id = %stored.id, message_id = turn.id, "plan and turn stored");
        Ok((stored, turn))
    }

    async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        chat_messages::list_recent_messages(&self.pool, user_id, limit).await
    }

    async fn list_plans(&self, user_id: Uuid) -> Result<Vec<Plan>> {
        plans::list_plans_for_user(&self.pool, user_id).await
    }

    async fn get_plan(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<Plan>> {
        plans::get_plan_for_user(&self.pool, user_id, plan_id).await
    }
}
