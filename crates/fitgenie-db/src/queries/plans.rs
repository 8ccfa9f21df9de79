//! Database query functions for the `plans` table.

use anyhow::{Context, Result};
use sqlx::postgres::PgExecutor;
use uuid::Uuid;

use crate::models::Plan;

/// Fields of a plan row supplied by the caller.
///
/// The id is chosen by the caller so the assistant turn that references the
/// plan can be written in the same transaction.
#[derive(Debug, Clone)]
pub struct NewPlan<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: &'a str,
    pub prompt_snapshot: &'a str,
    pub plan_json: &'a serde_json::Value,
}

/// Insert a plan row and return it with `created_at` filled in.
pub async fn insert_plan<'e>(executor: impl PgExecutor<'e>, new: &NewPlan<'_>) -> Result<Plan> {
    let plan = sqlx::query_as::<_, Plan>(
        "INSERT INTO plans (id, user_id, source, prompt_snapshot, plan_json) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.id)
    .bind(new.user_id)
    .bind(new.source)
    .bind(new.prompt_snapshot)
    .bind(new.plan_json)
    .fetch_one(executor)
    .await
    .context("failed to insert plan")?;

    Ok(plan)
}

/// Fetch a plan by id, scoped to its owner. Plans of other users are
/// reported as absent.
pub async fn get_plan_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<Plan>> {
    let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
        .context("failed to fetch plan")?;

    Ok(plan)
}

/// List a user's plans, newest first.
pub async fn list_plans_for_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Vec<Plan>> {
    let plans = sqlx::query_as::<_, Plan>(
        "SELECT * FROM plans WHERE user_id = $1 ORDER BY created_at DESC, id",
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .context("failed to list plans")?;

    Ok(plans)
}
