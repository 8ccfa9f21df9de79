//! `fitgenie prompt`, `ask`, `history`, `plans`, and `token` commands.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use uuid::Uuid;

use fitgenie_core::document::PlanDocument;
use fitgenie_core::orchestrator::{ChatOrchestrator, ChatReply, ChatRequest, PipelineError};
use fitgenie_core::profile::UserContext;
use fitgenie_core::prompt;
use fitgenie_core::store::ChatStore;
use fitgenie_core::token::{self, TokenConfig};
use fitgenie_db::models::{ChatMessage, Plan, TurnMetadata};

pub fn parse_user_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("invalid user ID: {raw}"))
}

/// Read a JSON profile file for `--context`.
pub fn load_context(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read context file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("context file {} is not valid JSON", path.display()))
}

/// Print the prompt that would be sent for `message` without calling the
/// model. With no message, prints only the system prompt.
pub fn run_prompt(context: Option<&Value>, message: Option<&str>) {
    let profile = context.map(UserContext::from_json);
    let text = match message {
        Some(message) => prompt::build_prompt(profile.as_ref(), message),
        None => prompt::build_system_prompt(profile.as_ref()),
    };
    println!("{text}");
}

/// Mint a bearer token for a user.
pub fn run_token(config: &TokenConfig, user_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    println!("{}", token::generate_token(config, user_id));
    Ok(())
}

/// Run the pipeline once and print the reply.
pub async fn run_ask(
    orchestrator: &ChatOrchestrator,
    user_id: &str,
    message: &str,
    context: Option<Value>,
) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let reply = orchestrator
        .handle(ChatRequest {
            user_id,
            message: message.to_owned(),
            context,
        })
        .await;

    match reply {
        Ok(reply) => {
            print!("{}", format_reply(&reply));
            Ok(())
        }
        Err(PipelineError::Generation(e)) => {
            bail!("plan generation failed after {} attempt(s): {}", e.attempts, e.last_error)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn run_history(store: &dyn ChatStore, user_id: &str, limit: i64) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let messages = store.history(user_id, limit).await?;
    print!("{}", format_history(&messages));
    Ok(())
}

pub async fn run_plans_list(store: &dyn ChatStore, user_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let plans = store.list_plans(user_id).await?;
    print!("{}", format_plan_list(&plans));
    Ok(())
}

pub async fn run_plans_show(store: &dyn ChatStore, user_id: &str, plan_id: &str) -> Result<()> {
    let user_id = parse_user_id(user_id)?;
    let plan_id =
        Uuid::parse_str(plan_id).with_context(|| format!("invalid plan ID: {plan_id}"))?;
    let plan = store
        .get_plan(user_id, plan_id)
        .await?
        .with_context(|| format!("plan {plan_id} not found"))?;
    print!("{}", format_plan(&plan));
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

fn format_reply(reply: &ChatReply) -> String {
    let mut out = format!("{}\n", reply.assistant_text);
    if let Some(plan_id) = reply.plan_id {
        out.push_str(&format!("Plan: {plan_id}\n"));
    }
    if let Some(plan_json) = &reply.plan_json {
        out.push_str(&format!("\n{}", PlanDocument::from_value(plan_json).render()));
    }
    if let Some(defects) = &reply.defects {
        out.push_str("\nDefects:\n");
        for defect in defects {
            out.push_str(&format!("  - {defect}\n"));
        }
    }
    out
}

fn format_history(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "No messages.\n".to_owned();
    }
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!(
            "[{}] {:<9} {}\n",
            m.created_at.format("%Y-%m-%d %H:%M:%S"),
            m.role.to_string(),
            m.content
        ));
        match &m.metadata {
            TurnMetadata::AssistantSuccess { plan_id } => {
                out.push_str(&format!("{:32}plan {plan_id}\n", ""));
            }
            TurnMetadata::AssistantDegraded { defects } => {
                for defect in defects {
                    out.push_str(&format!("{:32}- {defect}\n", ""));
                }
            }
            TurnMetadata::AssistantFailure { error } => {
                out.push_str(&format!("{:32}error: {error}\n", ""));
            }
            TurnMetadata::User { .. } | TurnMetadata::Empty => {}
        }
    }
    out
}

fn format_plan_list(plans: &[Plan]) -> String {
    if plans.is_empty() {
        return "No plans.\n".to_owned();
    }
    let mut out = format!("{:<38} {:<20} {:<10} {}\n", "ID", "CREATED", "TYPE", "REQUEST");
    for plan in plans {
        let doc = PlanDocument::from_value(&plan.plan_json);
        let plan_type = doc
            .plan
            .and_then(|p| p.plan_type)
            .unwrap_or_else(|| "-".to_owned());
        out.push_str(&format!(
            "{:<38} {:<20} {:<10} {}\n",
            plan.id,
            plan.created_at.format("%Y-%m-%d %H:%M"),
            plan_type,
            truncate(&plan.prompt_snapshot, 50)
        ));
    }
    out
}

fn format_plan(plan: &Plan) -> String {
    let mut out = String::new();
    out.push_str(&format!("Plan {} ({})\n", plan.id, plan.source));
    out.push_str(&format!("Created: {}\n", plan.created_at.format("%Y-%m-%d %H:%M:%S UTC")));
    out.push_str(&format!("Request: {}\n", plan.prompt_snapshot));
    out.push('\n');
    out.push_str(&PlanDocument::from_value(&plan.plan_json).render());
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_owned();
    }
    let mut cut: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}
