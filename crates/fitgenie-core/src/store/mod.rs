//! Persistence seam for conversation turns and plans.
//!
//! [`PgStore`] is the production backend; [`MemoryStore`] keeps everything
//! in process and is used by tests and the offline CLI paths.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use fitgenie_db::models::{ChatMessage, Plan, TurnMetadata};
use fitgenie_db::queries::plans::NewPlan;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage operations the chat pipeline needs.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append one turn. The role follows from `metadata`.
    async fn append_turn(
        &self,
        user_id: Uuid,
        content: &str,
        metadata: &TurnMetadata,
    ) -> Result<ChatMessage>;

    /// Insert `plan` and the assistant turn that references it, atomically:
    /// either both are stored or neither is.
    async fn create_plan_with_turn(
        &self,
        plan: &NewPlan<'_>,
        assistant_text: &str,
    ) -> Result<(Plan, ChatMessage)>;

    /// The most recent `limit` turns for a user, oldest-first.
    async fn history(&self, user_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>>;

    /// All plans owned by a user, newest first.
    async fn list_plans(&self, user_id: Uuid) -> Result<Vec<Plan>>;

    /// One plan, only if owned by `user_id`.
    async fn get_plan(&self, user_id: Uuid, plan_id: Uuid) -> Result<Option<Plan>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn ChatStore) {}
};
