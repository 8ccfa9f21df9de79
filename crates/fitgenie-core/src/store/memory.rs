//! In-process [`ChatStore`].

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use fitgenie_db::models::{ChatMessage, Plan, TurnMetadata};
use fitgenie_db::queries::plans::NewPlan;

use super::ChatStore;

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<ChatMessage>,
    plans: Vec<Plan>,
    next_message_id: i64,
}

impl Inner {
    fn push_message(&mut self, user_id: Uuid, content: &str, metadata: &TurnMetadata) -> ChatMessage {
        self.next_message_id += 1;
        let message = ChatMessage {
            id: self.next_message_id,
            user_id,
            role: metadata.role(),
            content: content.to_owned(),
            metadata: metadata.clone(),
            created_at: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }
}

/// Keeps turns and plans in insertion order behind a mutex. Contents are
/// lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Every turn for `user_id`, oldest-first.
    pub fn messages_for(&self, user_id: Uuid) -> Result<Vec<ChatMessage>> {
        Ok(self
            .lock()?
            .messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Total number of stored plans across all users.
    pub fn plan_count(&self) -> Result<usize> {
        Ok(self.lock()?.plans.len())
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn append_turn(
        &self,
        user_id: Uuid,
        content: &str,
        metadata: &TurnMetadata,
    ) -> Result<ChatMessage> {
        Ok(self.lock()?.push_message(user_id, content, metadata))
    }

    async fn create_plan_with_turn(
        &self,
        plan: &NewPlan<'_>,
        assistant_text: &str,
    ) -> Result<(Plan, ChatMessage)> {
        let mut inner = self.lock()?;
        if inner.plans.iter().any(|p| p.id == plan.id) {
            return Err(anyhow!("plan {} already exists", plan.id));
        }

        let stored = Plan {
            id: plan.id,
            user_id: plan.user_id,
            source: plan.source.to_owned(),
            prompt_snapshot: plan.prompt_snapshot.to_owned(),
            plan_json: plan.plan_json.clone(),
            created_at: Utc::now(),
        };
        inner.plans.push(stored.clone());
        let turn = inner.push_message(
            plan.user_id,
            assistant_text,
            &TurnMetadata::AssistantSuccess { plan_id: plan.id },
        );
        Ok((stored, turn))
    }

    async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let mut recent: Vec<ChatMessage> = self
            .lock()?
            .messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn list_plans(&self, user_id: Uuid) -> Result<Vec<Plan>> {
        Ok(self
            .lock()?
            .plans
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_plan(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<Plan>> {
        Ok(self
            .lock()?
            .plans
            .iter()
            .find(|p| p.id == plan_id && p.user_id == user_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use fitgenie_db::models::ChatRole;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn history_is_recent_window_oldest_first() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        for i in 0..5 {
            store
                .append_turn(user, &format!("m{i}"), &TurnMetadata::User { context: None })
                .await
                .unwrap();
        }
        store
            .append_turn(other, "not mine", &TurnMetadata::User { context: None })
            .await
            .unwrap();

        let history = store.history(user, 3).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
        assert!(store.history(user, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn plan_and_turn_are_linked() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let payload = json!({ "plan": { "type": "hiit" } });
        let new = NewPlan {
            id: Uuid::new_v4(),
            user_id: user,
            source: "stub",
            prompt_snapshot: "prompt",
            plan_json: &payload,
        };

        let (plan, turn) = store.create_plan_with_turn(&new, "done").await.unwrap();
        assert_eq!(plan.id, new.id);
        assert_eq!(turn.role, ChatRole::Assistant);
        assert_eq!(turn.metadata.plan_id(), Some(plan.id));

        assert!(store.create_plan_with_turn(&new, "again").await.is_err());
        assert_eq!(store.plan_count().unwrap(), 1);
        assert_eq!(store.messages_for(user).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plans_are_scoped_and_newest_first() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let payload = json!({});

        let mut ids = Vec::new();
        for _ in 0..2 {
            let new = NewPlan {
                id: Uuid::new_v4(),
                user_id: owner,
                source: "stub",
                prompt_snapshot: "p",
                plan_json: &payload,
            };
            store.create_plan_with_turn(&new, "ok").await.unwrap();
            ids.push(new.id);
        }

        let listed: Vec<_> = store
            .list_plans(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(listed, vec![ids[1], ids[0]]);

        assert!(store.get_plan(owner, ids[0]).await.unwrap().is_some());
        assert!(store.get_plan(stranger, ids[0]).await.unwrap().is_none());
        assert!(store.list_plans(stranger).await.unwrap().is_empty());
    }
}
